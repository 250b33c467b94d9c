//! Removal of leftover uploads from object storage and the catalog.
//!
//! A run works through the located chunks one at a time:
//!
//! 1. derive the object key from the file id,
//! 2. delete the object,
//! 3. delete the catalog row.
//!
//! Once every chunk has been handled, the batch entries that held them are
//! deleted, each exactly once. The object is always deleted before its row;
//! there is no transaction spanning both backends, so an aborted run leaves
//! everything after the failing chunk untouched for the next run.

use chrono::{DateTime, Utc};
use common::config::FailurePolicy;
use common::filecache::{CatalogEntry, UploadCatalog};
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::JanitorConfig;
use crate::error::ReconcileError;
use crate::locator::LeftoverLocator;
use crate::report::{
    ConsoleReporter, EntryFailure, ProgressEvent, ProgressReporter, ReconcileReport,
};

pub struct Reconciler {
    config: JanitorConfig,
    catalog: Arc<dyn UploadCatalog>,
    object_store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn ProgressReporter>,
}

impl Reconciler {
    /// Create a reconciler printing its progress to stdout.
    pub fn new(
        config: JanitorConfig,
        catalog: Arc<dyn UploadCatalog>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            catalog,
            object_store,
            reporter: Arc::new(ConsoleReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn locator(&self) -> LeftoverLocator {
        LeftoverLocator::new(
            self.catalog.clone(),
            self.config.uploads_path.clone(),
            self.config.grace_period,
        )
    }

    /// Locate leftover uploads and remove them.
    ///
    /// # Errors
    ///
    /// Fails without deleting anything if the catalog cannot be queried. With
    /// [`FailurePolicy::Abort`] the first failed delete ends the run with that
    /// error; with [`FailurePolicy::Continue`] failures are collected in the
    /// report instead.
    pub async fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        self.run_at(Utc::now()).await
    }

    /// Like [`run`](Self::run), with the grace period measured from `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, ReconcileError> {
        let candidates = self.locator().locate_at(now).await?;
        self.reconcile(candidates).await
    }

    /// Remove the given candidates and then their parents.
    pub async fn reconcile(
        &self,
        candidates: Vec<CatalogEntry>,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.reporter.report(&ProgressEvent::Found {
            count: candidates.len(),
        });

        tracing::info!(
            candidates = candidates.len(),
            key_pattern = %self.config.key_pattern,
            dry_run = self.config.dry_run,
            on_error = ?self.config.on_error,
            "Starting cleanup of leftover uploads"
        );

        let mut report = ReconcileReport {
            candidates: candidates.len(),
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        let mut parents = Vec::new();
        let mut seen_parents = HashSet::new();
        let mut kept_parents = HashSet::new();

        for entry in &candidates {
            let key = self.storage_key(entry);

            self.reporter.report(&ProgressEvent::Deleting {
                key: key.clone(),
                path: entry.path.clone(),
                storage_id: entry.storage_id.clone(),
                size: entry.size,
                dry_run: self.config.dry_run,
            });

            if seen_parents.insert(entry.parent_id) {
                parents.push(entry.parent_id);
            }

            match self.remove_candidate(entry, &key).await {
                Ok(()) => {
                    report.deleted_entries += 1;
                    report.reclaimed_bytes = report.reclaimed_bytes.saturating_add(entry.size);
                }
                Err(e) => {
                    self.handle_failure(entry.file_id, e, &mut report)?;
                    // A batch still holding chunks must stay, or those rows
                    // would point at a missing parent.
                    kept_parents.insert(entry.parent_id);
                }
            }
        }

        self.delete_parents(&parents, &kept_parents, &mut report)
            .await?;

        self.reporter.report(&ProgressEvent::Recovered {
            bytes: report.reclaimed_bytes,
            dry_run: self.config.dry_run,
        });

        tracing::info!(
            candidates = report.candidates,
            deleted = report.deleted_entries,
            deleted_parents = report.deleted_parents,
            failed = report.failures.len(),
            bytes_freed = report.reclaimed_bytes,
            dry_run = self.config.dry_run,
            "Cleanup of leftover uploads complete"
        );

        Ok(report)
    }

    /// Object key for a catalog entry.
    pub fn storage_key(&self, entry: &CatalogEntry) -> String {
        self.config.key_pattern.format(entry.file_id)
    }

    async fn remove_candidate(&self, entry: &CatalogEntry, key: &str) -> Result<(), ReconcileError> {
        if self.config.dry_run {
            tracing::info!(
                key = %key,
                path = %entry.path,
                size_bytes = entry.size,
                storage = %entry.storage_id,
                "[DRY-RUN] Would delete leftover upload"
            );
            return Ok(());
        }

        self.delete_remote(key).await?;
        self.delete_entry(entry.file_id).await?;

        tracing::debug!(
            key = %key,
            path = %entry.path,
            size_bytes = entry.size,
            storage = %entry.storage_id,
            "Deleted leftover upload"
        );
        Ok(())
    }

    /// Delete the object stored under exactly `key`.
    async fn delete_remote(&self, key: &str) -> Result<(), ReconcileError> {
        let remote_error = |source: object_store::Error| ReconcileError::RemoteDelete {
            key: key.to_string(),
            source,
        };

        // Not `ObjectPath::from`, which percent-encodes `%` and drops empty segments
        let location = ObjectPath::parse(key).map_err(|e| remote_error(e.into()))?;
        self.object_store
            .delete(&location)
            .await
            .map_err(remote_error)
    }

    /// Delete the catalog row of `file_id`.
    async fn delete_entry(&self, file_id: i64) -> Result<(), ReconcileError> {
        self.catalog
            .delete_entry(file_id)
            .await
            .map(|_| ())
            .map_err(|source| ReconcileError::CatalogDelete { file_id, source })
    }

    async fn delete_parents(
        &self,
        parents: &[i64],
        kept_parents: &HashSet<i64>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        for &parent in parents {
            if kept_parents.contains(&parent) {
                tracing::warn!(
                    file_id = parent,
                    "Keeping upload batch with chunks that could not be deleted"
                );
                continue;
            }

            if self.config.dry_run {
                tracing::info!(file_id = parent, "[DRY-RUN] Would delete upload batch");
                report.deleted_parents += 1;
                continue;
            }

            match self.delete_entry(parent).await {
                Ok(()) => {
                    tracing::debug!(file_id = parent, "Deleted upload batch");
                    report.deleted_parents += 1;
                }
                Err(e) => self.handle_failure(parent, e, report)?,
            }
        }

        Ok(())
    }

    fn handle_failure(
        &self,
        file_id: i64,
        error: ReconcileError,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        tracing::error!(file_id, error = %error, "Failed to remove leftover upload");

        match self.config.on_error {
            FailurePolicy::Abort => Err(error),
            FailurePolicy::Continue => {
                report.failures.push(EntryFailure {
                    file_id,
                    error: error.to_string(),
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::StorageKeyPattern;
    use crate::report::SilentReporter;
    use async_trait::async_trait;
    use object_store::memory::InMemory;
    use std::sync::Mutex;

    /// Catalog double that records deletes and fails for selected ids.
    #[derive(Default)]
    struct FakeCatalog {
        deleted: Mutex<Vec<i64>>,
        failing: HashSet<i64>,
    }

    #[async_trait]
    impl UploadCatalog for FakeCatalog {
        async fn leftover_uploads(
            &self,
            _uploads_path: &str,
            _modified_before: i64,
        ) -> Result<Vec<CatalogEntry>, sqlx::Error> {
            Ok(Vec::new())
        }

        async fn delete_entry(&self, file_id: i64) -> Result<u64, sqlx::Error> {
            if self.failing.contains(&file_id) {
                return Err(sqlx::Error::RowNotFound);
            }
            self.deleted.lock().unwrap().push(file_id);
            Ok(1)
        }
    }

    fn entry(file_id: i64, parent_id: i64, size: u64) -> CatalogEntry {
        CatalogEntry {
            file_id,
            path: format!("uploads/{parent_id}/{file_id}"),
            parent_id,
            storage_id: "object::store:amazon::nextcloud".to_string(),
            size,
        }
    }

    fn reconciler(config: JanitorConfig, catalog: Arc<FakeCatalog>) -> Reconciler {
        Reconciler::new(config, catalog, Arc::new(InMemory::new()))
            .with_reporter(Arc::new(SilentReporter))
    }

    #[test]
    fn test_storage_key_uses_pattern() {
        let config = JanitorConfig {
            key_pattern: StorageKeyPattern::parse("chunks/%d.bin").unwrap(),
            ..Default::default()
        };
        let reconciler = reconciler(config, Arc::new(FakeCatalog::default()));

        assert_eq!(reconciler.storage_key(&entry(9, 1, 0)), "chunks/9.bin");
    }

    #[tokio::test]
    async fn test_parents_deleted_once_after_children() {
        let catalog = Arc::new(FakeCatalog::default());
        let reconciler = reconciler(JanitorConfig::default(), catalog.clone());

        let report = reconciler
            .reconcile(vec![entry(100, 10, 1), entry(101, 10, 2), entry(200, 20, 4)])
            .await
            .unwrap();

        assert_eq!(*catalog.deleted.lock().unwrap(), vec![100, 101, 200, 10, 20]);
        assert_eq!(report.deleted_entries, 3);
        assert_eq!(report.deleted_parents, 2);
        assert_eq!(report.reclaimed_bytes, 7);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let catalog = Arc::new(FakeCatalog::default());
        let reconciler = reconciler(JanitorConfig::default(), catalog.clone());

        let report = reconciler.reconcile(Vec::new()).await.unwrap();

        assert_eq!(report, ReconcileReport::default());
        assert!(catalog.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let catalog = Arc::new(FakeCatalog::default());
        let config = JanitorConfig {
            dry_run: true,
            ..Default::default()
        };
        let reconciler = reconciler(config, catalog.clone());

        let report = reconciler
            .reconcile(vec![entry(100, 10, 1024), entry(101, 10, 1024)])
            .await
            .unwrap();

        assert!(catalog.deleted.lock().unwrap().is_empty());
        assert_eq!(report.deleted_entries, 2);
        assert_eq!(report.deleted_parents, 1);
        assert_eq!(report.summary(), "Would recover 2.00 KB from S3 storage.");
    }

    #[tokio::test]
    async fn test_catalog_delete_failure_aborts() {
        let catalog = Arc::new(FakeCatalog {
            failing: HashSet::from([101]),
            ..Default::default()
        });
        let reconciler = reconciler(JanitorConfig::default(), catalog.clone());

        let err = reconciler
            .reconcile(vec![entry(100, 10, 1), entry(101, 10, 1), entry(102, 10, 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::CatalogDelete { file_id: 101, .. }));
        // Nothing after the failing chunk, and no parent cleanup
        assert_eq!(*catalog.deleted.lock().unwrap(), vec![100]);
    }

    #[tokio::test]
    async fn test_catalog_delete_failure_continues_and_keeps_parent() {
        let catalog = Arc::new(FakeCatalog {
            failing: HashSet::from([101]),
            ..Default::default()
        });
        let config = JanitorConfig {
            on_error: FailurePolicy::Continue,
            ..Default::default()
        };
        let reconciler = reconciler(config, catalog.clone());

        let report = reconciler
            .reconcile(vec![entry(100, 10, 1), entry(101, 10, 2), entry(200, 20, 4)])
            .await
            .unwrap();

        assert_eq!(*catalog.deleted.lock().unwrap(), vec![100, 200, 20]);
        assert_eq!(report.deleted_entries, 2);
        assert_eq!(report.deleted_parents, 1);
        assert_eq!(report.reclaimed_bytes, 5);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file_id, 101);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_parent_delete_failure_is_recorded() {
        let catalog = Arc::new(FakeCatalog {
            failing: HashSet::from([10]),
            ..Default::default()
        });
        let config = JanitorConfig {
            on_error: FailurePolicy::Continue,
            ..Default::default()
        };
        let reconciler = reconciler(config, catalog.clone());

        let report = reconciler
            .reconcile(vec![entry(100, 10, 1), entry(200, 20, 1)])
            .await
            .unwrap();

        assert_eq!(*catalog.deleted.lock().unwrap(), vec![100, 200, 20]);
        assert_eq!(report.deleted_parents, 1);
        assert_eq!(report.failures[0].file_id, 10);
    }
}
