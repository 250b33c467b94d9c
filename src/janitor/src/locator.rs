//! Finding leftover upload chunks in the catalog.
//!
//! Chunked uploads are staged as `uploads/<batch>/<chunk>`. A batch that has
//! not been touched for longer than the grace period was abandoned, and its
//! chunks are the candidates. The batch entries themselves are removed later
//! as parents of those candidates.

use chrono::{DateTime, Utc};
use common::filecache::{CatalogEntry, UploadCatalog};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ReconcileError;

pub struct LeftoverLocator {
    catalog: Arc<dyn UploadCatalog>,
    uploads_path: String,
    grace_period: Duration,
}

impl LeftoverLocator {
    pub fn new(
        catalog: Arc<dyn UploadCatalog>,
        uploads_path: impl Into<String>,
        grace_period: Duration,
    ) -> Self {
        Self {
            catalog,
            uploads_path: uploads_path.into(),
            grace_period,
        }
    }

    /// Leftover chunks as of now.
    pub async fn locate(&self) -> Result<Vec<CatalogEntry>, ReconcileError> {
        self.locate_at(Utc::now()).await
    }

    /// Leftover chunks as of `now`: children of batches last modified before
    /// `now - grace_period`, on available storages only.
    pub async fn locate_at(&self, now: DateTime<Utc>) -> Result<Vec<CatalogEntry>, ReconcileError> {
        let cutoff = self.cutoff(now);

        tracing::debug!(
            uploads_path = %self.uploads_path,
            grace_period_secs = self.grace_period.as_secs(),
            cutoff,
            "Querying leftover uploads"
        );

        let candidates = self
            .catalog
            .leftover_uploads(&self.uploads_path, cutoff)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to query leftover uploads");
                ReconcileError::CatalogQuery(e)
            })?;

        tracing::info!(
            candidates = candidates.len(),
            uploads_path = %self.uploads_path,
            "Located leftover uploads"
        );

        Ok(candidates)
    }

    /// Unix timestamp a batch must be older than.
    fn cutoff(&self, now: DateTime<Utc>) -> i64 {
        let grace = i64::try_from(self.grace_period.as_secs()).unwrap_or(i64::MAX);
        now.timestamp().saturating_sub(grace)
    }
}
