//! Test utilities for the upload janitor.
//!
//! This module provides reusable test utilities for creating test
//! configurations. Catalog seeding helpers live on
//! [`FileCache`](crate::filecache::FileCache) under the same feature gate.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```

mod config_builder;

pub use config_builder::TestConfigBuilder;
