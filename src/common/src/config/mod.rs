use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use url::Url;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "janitor.toml";

/// Prefix for nested environment overrides, e.g. `JANITOR__RECONCILE__DRY_RUN`.
pub const ENV_PREFIX: &str = "JANITOR__";

/// Flat environment variables understood for compatibility with existing
/// deployments of the cleanup job, mapped onto their configuration keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("DELETION_GRACE_PERIOD", "reconcile.grace_period_secs"),
    ("NEXTCLOUD_FILENAME_PATTERN", "reconcile.storage_key_pattern"),
    ("AWS_DEFAULT_REGION", "storage.region"),
    ("AWS_ENDPOINT", "storage.endpoint"),
    ("AWS_ACCESS_KEY_ID", "storage.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "storage.secret_access_key"),
    ("AWS_BUCKET", "storage.bucket"),
    ("DATABASE_HOST", "database.host"),
    ("DATABASE_PORT", "database.port"),
    ("DATABASE_USER", "database.user"),
    ("DATABASE_PASSWORD", "database.password"),
    ("DATABASE_NAME", "database.name"),
];

const REDACTED: &str = "********";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Mysql,
    Postgres,
    Sqlite,
}

impl DatabaseDriver {
    pub fn scheme(&self) -> &'static str {
        match self {
            DatabaseDriver::Mysql => "mysql",
            DatabaseDriver::Postgres => "postgres",
            DatabaseDriver::Sqlite => "sqlite",
        }
    }
}

/// Connection settings for the file metadata catalog.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    /// Full connection string. When set, the individual fields below are ignored.
    pub dsn: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub host: String,
    pub port: Option<u16>,
    #[serde(deserialize_with = "lenient_string")]
    pub user: String,
    #[serde(deserialize_with = "lenient_string")]
    pub password: String,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    /// Prefix prepended to the `filecache` and `storages` table names (e.g. `oc_`).
    #[serde(deserialize_with = "lenient_string")]
    pub table_prefix: String,
}

impl DatabaseConfig {
    /// In-memory SQLite catalog, used by tests and local experiments.
    pub fn in_memory() -> Self {
        Self {
            driver: DatabaseDriver::Sqlite,
            dsn: Some(String::from("sqlite::memory:")),
            ..Default::default()
        }
    }

    /// Build the connection URL handed to sqlx.
    ///
    /// Credentials are percent-encoded, so passwords containing `@` or `/`
    /// survive the round trip.
    pub fn connection_url(&self) -> anyhow::Result<String> {
        if let Some(dsn) = self.dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
            return Ok(dsn.to_string());
        }

        if self.driver == DatabaseDriver::Sqlite {
            return Ok(format!("sqlite://{}", self.name));
        }

        let mut url = Url::parse(&format!("{}://localhost", self.driver.scheme()))?;
        url.set_host(Some(&self.host))
            .map_err(|e| anyhow::anyhow!("Invalid database host '{}': {e}", self.host))?;
        url.set_port(self.port)
            .map_err(|_| anyhow::anyhow!("Invalid database port {:?}", self.port))?;
        url.set_username(&self.user)
            .map_err(|_| anyhow::anyhow!("Invalid database user '{}'", self.user))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| anyhow::anyhow!("Invalid database password"))?;
        }
        url.set_path(&self.name);

        Ok(url.to_string())
    }
}

/// Object storage (S3 or S3-compatible) the uploads live in.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(deserialize_with = "lenient_string")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub access_key_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub secret_access_key: String,
    #[serde(deserialize_with = "lenient_string")]
    pub bucket: String,
    /// Address buckets as `bucket.host` instead of `host/bucket`.
    pub virtual_hosted_style: bool,
}

/// What to do when deleting a single upload fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run at the first failed delete.
    #[default]
    Abort,
    /// Record the failure, keep the affected rows and move on.
    Continue,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Minimum age in seconds of an upload batch before its files are removed.
    ///
    /// Env: DELETION_GRACE_PERIOD or JANITOR__RECONCILE__GRACE_PERIOD_SECS
    pub grace_period_secs: u64,

    /// Pattern deriving the object key from a file id. Must contain one `%d`.
    ///
    /// Env: NEXTCLOUD_FILENAME_PATTERN or JANITOR__RECONCILE__STORAGE_KEY_PATTERN
    #[serde(deserialize_with = "lenient_string")]
    pub storage_key_pattern: String,

    /// Path of the catalog entry that roots the upload staging area.
    #[serde(deserialize_with = "lenient_string")]
    pub uploads_path: String,

    /// Report what would be deleted without touching storage or the catalog.
    pub dry_run: bool,

    pub on_error: FailurePolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 24 * 60 * 60,
            storage_key_pattern: String::from("urn:oid:%d"),
            uploads_path: String::from("uploads"),
            dry_run: false,
            on_error: FailurePolicy::Abort,
        }
    }
}

impl ReconcileConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// File metadata catalog
    pub database: DatabaseConfig,
    /// Object storage holding the uploaded chunks
    pub storage: StorageConfig,
    /// Cleanup behaviour
    pub reconcile: ReconcileConfig,
}

impl Configuration {
    /// Load from `janitor.toml` (if present) and the environment.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Path::new(DEFAULT_CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    /// Load from the given TOML file and the environment.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    /// Provider chain: defaults, TOML file, legacy flat env vars, prefixed env vars.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(legacy_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check that everything needed to reach both backends is present.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut missing = Vec::new();

        let storage = &self.storage;
        for (key, value) in [
            ("storage.region", &storage.region),
            ("storage.access_key_id", &storage.access_key_id),
            ("storage.secret_access_key", &storage.secret_access_key),
            ("storage.bucket", &storage.bucket),
        ] {
            if value.is_empty() {
                missing.push(key);
            }
        }

        let database = &self.database;
        let has_dsn = database.dsn.as_deref().is_some_and(|dsn| !dsn.is_empty());
        if !has_dsn {
            if database.driver != DatabaseDriver::Sqlite {
                if database.host.is_empty() {
                    missing.push("database.host");
                }
                if database.user.is_empty() {
                    missing.push("database.user");
                }
            }
            if database.name.is_empty() {
                missing.push("database.name");
            }
        }

        if !missing.is_empty() {
            anyhow::bail!("Missing required configuration: {}", missing.join(", "));
        }

        if self.reconcile.uploads_path.is_empty() {
            anyhow::bail!("reconcile.uploads_path cannot be empty");
        }

        Ok(())
    }

    /// Copy of the configuration with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.database.password.is_empty() {
            config.database.password = REDACTED.to_string();
        }
        if let Some(dsn) = config.database.dsn.as_mut() {
            if let Ok(mut url) = Url::parse(dsn) {
                if url.password().is_some() && url.set_password(Some(REDACTED)).is_ok() {
                    *dsn = url.to_string();
                }
            }
        }
        if !config.storage.secret_access_key.is_empty() {
            config.storage.secret_access_key = REDACTED.to_string();
        }
        config
    }
}

fn legacy_env() -> Env {
    Env::raw().filter_map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| (*path).into())
    })
}

/// Environment values are parsed into numbers and booleans where possible, so
/// a numeric password or bucket name would otherwise fail to deserialize.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(value) => value,
        Scalar::Signed(value) => value.to_string(),
        Scalar::Unsigned(value) => value.to_string(),
        Scalar::Float(value) => value.to_string(),
        Scalar::Bool(value) => value.to_string(),
    })
}
