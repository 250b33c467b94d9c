//! Cleanup of abandoned chunked uploads.
//!
//! Chunked uploads are staged in the file catalog below an `uploads` root,
//! one batch directory per upload, with each chunk stored as an object in
//! S3. Uploads that never complete leave both behind. This crate finds the
//! chunks of batches older than a grace period, deletes their objects and
//! catalog rows, and finally removes the emptied batch entries.
//!
//! ```no_run
//! use janitor::{JanitorConfig, Reconciler};
//! use common::FileCache;
//! use std::sync::Arc;
//!
//! # async fn run(
//! #     object_store: Arc<dyn object_store::ObjectStore>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Arc::new(FileCache::new_in_memory().await?);
//! let reconciler = Reconciler::new(JanitorConfig::default(), catalog, object_store);
//! let report = reconciler.run().await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod bytes;
pub mod config;
pub mod error;
pub mod key;
pub mod locator;
pub mod reconciler;
pub mod report;

pub use bytes::readable_bytes;
pub use config::JanitorConfig;
pub use error::ReconcileError;
pub use key::StorageKeyPattern;
pub use locator::LeftoverLocator;
pub use reconciler::Reconciler;
pub use report::{
    ConsoleReporter, EntryFailure, ProgressEvent, ProgressReporter, ReconcileReport,
    SilentReporter,
};
