/// Errors raised while reconciling leftover uploads.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Failed to query leftover uploads: {0}")]
    CatalogQuery(#[source] sqlx::Error),

    #[error("Failed to delete object '{key}': {source}")]
    RemoteDelete {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Failed to delete catalog entry {file_id}: {source}")]
    CatalogDelete {
        file_id: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid storage key pattern '{pattern}': {reason}")]
    InvalidKeyPattern { pattern: String, reason: String },
}
