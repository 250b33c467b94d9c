//! Cleanup settings resolved from the service configuration.

use crate::error::ReconcileError;
use crate::key::StorageKeyPattern;
use common::config::{FailurePolicy, ReconcileConfig};
use std::time::Duration;

/// Settings of a cleanup run, with the key pattern already parsed.
///
/// Built from [`ReconcileConfig`] once at startup so a malformed pattern is
/// reported before anything is deleted.
#[derive(Clone, Debug)]
pub struct JanitorConfig {
    /// Minimum age of an upload batch before its chunks are removed.
    pub grace_period: Duration,

    /// Maps file ids to object keys.
    pub key_pattern: StorageKeyPattern,

    /// Path of the catalog entry rooting the upload staging area.
    pub uploads_path: String,

    /// Log and count instead of deleting.
    pub dry_run: bool,

    pub on_error: FailurePolicy,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(24 * 60 * 60),
            key_pattern: StorageKeyPattern::default(),
            uploads_path: "uploads".to_string(),
            dry_run: false,
            on_error: FailurePolicy::Abort,
        }
    }
}

impl TryFrom<&ReconcileConfig> for JanitorConfig {
    type Error = ReconcileError;

    fn try_from(config: &ReconcileConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            grace_period: config.grace_period(),
            key_pattern: StorageKeyPattern::parse(&config.storage_key_pattern)?,
            uploads_path: config.uploads_path.clone(),
            dry_run: config.dry_run,
            on_error: config.on_error,
        })
    }
}
