//! Test configuration builder for creating test setups quickly.

use crate::config::{Configuration, DatabaseConfig, FailurePolicy, StorageConfig};

/// Builder for creating test configurations.
///
/// The result always passes [`Configuration::validate`], so tests only spell
/// out the settings they care about.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .with_grace_period_secs(3600)
///     .dry_run()
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Create a new test configuration builder.
    ///
    /// The default configuration uses:
    /// - In-memory SQLite database (`sqlite::memory:`)
    /// - Placeholder S3 credentials for a `test-bucket` bucket
    /// - The production reconcile defaults
    pub fn new() -> Self {
        Self {
            config: Configuration {
                database: DatabaseConfig::in_memory(),
                storage: StorageConfig {
                    region: "us-east-1".to_string(),
                    endpoint: Some("http://localhost:9000".to_string()),
                    access_key_id: "test".to_string(),
                    secret_access_key: "test".to_string(),
                    bucket: "test-bucket".to_string(),
                    virtual_hosted_style: false,
                },
                reconcile: Default::default(),
            },
        }
    }

    /// Set the grace period in seconds.
    pub fn with_grace_period_secs(mut self, secs: u64) -> Self {
        self.config.reconcile.grace_period_secs = secs;
        self
    }

    /// Set the storage key pattern.
    pub fn with_storage_key_pattern(mut self, pattern: &str) -> Self {
        self.config.reconcile.storage_key_pattern = pattern.to_string();
        self
    }

    /// Set the path of the uploads root entry.
    pub fn with_uploads_path(mut self, path: &str) -> Self {
        self.config.reconcile.uploads_path = path.to_string();
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self) -> Self {
        self.config.reconcile.dry_run = true;
        self
    }

    /// Keep going after failed deletes.
    pub fn continue_on_error(mut self) -> Self {
        self.config.reconcile.on_error = FailurePolicy::Continue;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Configuration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_produces_valid_config() {
        let config = TestConfigBuilder::new().build();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconcile.grace_period_secs, 86400);
    }

    #[test]
    fn test_builder_overrides() {
        let config = TestConfigBuilder::new()
            .with_grace_period_secs(60)
            .with_storage_key_pattern("chunks/%d")
            .with_uploads_path("staging")
            .dry_run()
            .continue_on_error()
            .build();

        assert_eq!(config.reconcile.grace_period_secs, 60);
        assert_eq!(config.reconcile.storage_key_pattern, "chunks/%d");
        assert_eq!(config.reconcile.uploads_path, "staging");
        assert!(config.reconcile.dry_run);
        assert_eq!(config.reconcile.on_error, FailurePolicy::Continue);
    }
}
