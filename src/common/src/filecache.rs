use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, MySqlPool, PgPool, SqlitePool, query, query_as};

use crate::config::{DatabaseConfig, DatabaseDriver};

/// A row of the file metadata catalog selected for cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub file_id: i64,
    pub path: String,
    pub parent_id: i64,
    /// String id of the storage backend (`storages.id`).
    pub storage_id: String,
    pub size: u64,
}

#[derive(FromRow)]
struct LeftoverRow {
    fileid: i64,
    path: String,
    parent: i64,
    storage: Option<String>,
    size: i64,
}

impl From<LeftoverRow> for CatalogEntry {
    fn from(row: LeftoverRow) -> Self {
        Self {
            file_id: row.fileid,
            path: row.path,
            parent_id: row.parent,
            storage_id: row.storage.unwrap_or_default(),
            // Directories whose size is unknown carry -1
            size: u64::try_from(row.size).unwrap_or(0),
        }
    }
}

/// Read and delete access to the catalog, as needed by the cleanup job.
#[async_trait]
pub trait UploadCatalog: Send + Sync {
    /// Entries whose parent is an upload batch directly below `uploads_path`
    /// that was last modified before `modified_before` (unix seconds), limited
    /// to storages flagged as available.
    async fn leftover_uploads(
        &self,
        uploads_path: &str,
        modified_before: i64,
    ) -> Result<Vec<CatalogEntry>, sqlx::Error>;

    /// Delete a single entry by id, returning the number of rows removed.
    async fn delete_entry(&self, file_id: i64) -> Result<u64, sqlx::Error>;
}

/// Connection to the file metadata catalog (MySQL, PostgreSQL or SQLite).
#[derive(Clone)]
pub struct FileCache {
    pool: Pool,
    tables: Tables,
}

#[derive(Clone)]
enum Pool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Pool {
    fn driver(&self) -> DatabaseDriver {
        match self {
            Pool::MySql(_) => DatabaseDriver::Mysql,
            Pool::Postgres(_) => DatabaseDriver::Postgres,
            Pool::Sqlite(_) => DatabaseDriver::Sqlite,
        }
    }
}

#[derive(Clone, Debug)]
struct Tables {
    filecache: String,
    storages: String,
}

impl Tables {
    fn new(prefix: &str) -> Self {
        Self {
            filecache: format!("{prefix}filecache"),
            storages: format!("{prefix}storages"),
        }
    }

    fn leftover_uploads_sql(&self, driver: DatabaseDriver) -> String {
        let (root_path, cutoff) = match driver {
            DatabaseDriver::Postgres => ("$1", "$2"),
            DatabaseDriver::Mysql | DatabaseDriver::Sqlite => ("?", "?"),
        };

        // Each user home has its own uploads directory, so the root lookup
        // may yield several rows.
        format!(
            r#"
            SELECT f.fileid, f.path, f.parent, s.id AS storage, f.size
            FROM {filecache} f
            INNER JOIN {storages} s ON s.numeric_id = f.storage
            WHERE f.parent IN (
                SELECT b.fileid
                FROM {filecache} b
                WHERE b.parent IN (
                    SELECT r.fileid FROM {filecache} r WHERE r.path = {root_path}
                )
                AND b.storage_mtime < {cutoff}
            )
            AND s.available = 1
            "#,
            filecache = self.filecache,
            storages = self.storages,
        )
    }

    fn delete_entry_sql(&self, driver: DatabaseDriver) -> String {
        let placeholder = match driver {
            DatabaseDriver::Postgres => "$1",
            DatabaseDriver::Mysql | DatabaseDriver::Sqlite => "?",
        };
        format!("DELETE FROM {} WHERE fileid = {placeholder}", self.filecache)
    }
}

impl FileCache {
    /// Connect using the database section of the configuration.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let url = config.connection_url()?;
        let file_cache = Self::new(config.driver, &url, &config.table_prefix).await?;
        Ok(file_cache)
    }

    /// Connect to an existing catalog. The schema is owned by the application
    /// that fills the catalog and is never created here.
    pub async fn new(
        driver: DatabaseDriver,
        dsn: &str,
        table_prefix: &str,
    ) -> Result<Self, sqlx::Error> {
        log::info!("Connecting to {} catalog database", driver.scheme());

        let pool = match driver {
            DatabaseDriver::Mysql => Pool::MySql(MySqlPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to MySQL catalog: {e}");
                e
            })?),
            DatabaseDriver::Postgres => Pool::Postgres(PgPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to PostgreSQL catalog: {e}");
                e
            })?),
            DatabaseDriver::Sqlite => {
                Pool::Sqlite(SqlitePool::connect(dsn).await.map_err(|e| {
                    log::error!("Failed to connect to SQLite catalog with DSN '{dsn}': {e}");
                    e
                })?)
            }
        };

        log::info!("Database connection established successfully");
        Ok(Self {
            pool,
            tables: Tables::new(table_prefix),
        })
    }

    /// Fresh in-memory SQLite catalog with the `filecache` and `storages`
    /// tables created.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        // A single connection that never expires, otherwise each pooled
        // connection would see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;

        let file_cache = Self {
            pool: Pool::Sqlite(pool),
            tables: Tables::new(""),
        };
        file_cache.create_schema().await?;
        Ok(file_cache)
    }

    /// Create the subset of the catalog schema this job reads.
    pub async fn create_schema(&self) -> Result<(), sqlx::Error> {
        let Pool::Sqlite(pool) = &self.pool else {
            return Err(sqlx::Error::Configuration(
                "schema creation is only supported for SQLite catalogs".into(),
            ));
        };

        let create_storages = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                numeric_id INTEGER PRIMARY KEY,
                id TEXT,
                available INTEGER NOT NULL DEFAULT 1,
                last_checked INTEGER
            )"#,
            self.tables.storages
        );
        query(&create_storages).execute(pool).await?;

        let create_filecache = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                fileid INTEGER PRIMARY KEY,
                storage INTEGER NOT NULL,
                path TEXT NOT NULL,
                parent INTEGER NOT NULL,
                name TEXT,
                size INTEGER NOT NULL DEFAULT 0,
                mtime INTEGER NOT NULL DEFAULT 0,
                storage_mtime INTEGER NOT NULL DEFAULT 0
            )"#,
            self.tables.filecache
        );
        query(&create_filecache).execute(pool).await?;

        Ok(())
    }
}

#[async_trait]
impl UploadCatalog for FileCache {
    async fn leftover_uploads(
        &self,
        uploads_path: &str,
        modified_before: i64,
    ) -> Result<Vec<CatalogEntry>, sqlx::Error> {
        let sql = self.tables.leftover_uploads_sql(self.pool.driver());

        let rows: Vec<LeftoverRow> = match &self.pool {
            Pool::MySql(pool) => {
                query_as(&sql)
                    .bind(uploads_path)
                    .bind(modified_before)
                    .fetch_all(pool)
                    .await?
            }
            Pool::Postgres(pool) => {
                query_as(&sql)
                    .bind(uploads_path)
                    .bind(modified_before)
                    .fetch_all(pool)
                    .await?
            }
            Pool::Sqlite(pool) => {
                query_as(&sql)
                    .bind(uploads_path)
                    .bind(modified_before)
                    .fetch_all(pool)
                    .await?
            }
        };

        Ok(rows.into_iter().map(CatalogEntry::from).collect())
    }

    async fn delete_entry(&self, file_id: i64) -> Result<u64, sqlx::Error> {
        let sql = self.tables.delete_entry_sql(self.pool.driver());

        let result = match &self.pool {
            Pool::MySql(pool) => query(&sql).bind(file_id).execute(pool).await?.rows_affected(),
            Pool::Postgres(pool) => query(&sql).bind(file_id).execute(pool).await?.rows_affected(),
            Pool::Sqlite(pool) => query(&sql).bind(file_id).execute(pool).await?.rows_affected(),
        };

        if result == 0 {
            log::debug!("Catalog entry {file_id} was already gone");
        }

        Ok(result)
    }
}

/// Seeding and inspection helpers for SQLite-backed tests.
#[cfg(any(test, feature = "testing"))]
impl FileCache {
    pub async fn insert_storage(
        &self,
        numeric_id: i64,
        id: &str,
        available: bool,
    ) -> Result<(), sqlx::Error> {
        let pool = self.sqlite_pool()?;
        let stmt = format!(
            "INSERT INTO {} (numeric_id, id, available) VALUES (?, ?, ?)",
            self.tables.storages
        );
        query(&stmt)
            .bind(numeric_id)
            .bind(id)
            .bind(i64::from(available))
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn insert_entry(
        &self,
        file_id: i64,
        storage: i64,
        path: &str,
        parent: i64,
        size: i64,
        storage_mtime: i64,
    ) -> Result<(), sqlx::Error> {
        let pool = self.sqlite_pool()?;
        let name = path.rsplit('/').next().unwrap_or(path);
        let stmt = format!(
            r#"
            INSERT INTO {} (fileid, storage, path, parent, name, size, mtime, storage_mtime)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            self.tables.filecache
        );
        query(&stmt)
            .bind(file_id)
            .bind(storage)
            .bind(path)
            .bind(parent)
            .bind(name)
            .bind(size)
            .bind(storage_mtime)
            .bind(storage_mtime)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn entry_exists(&self, file_id: i64) -> Result<bool, sqlx::Error> {
        let pool = self.sqlite_pool()?;
        let stmt = format!(
            "SELECT COUNT(*) FROM {} WHERE fileid = ?",
            self.tables.filecache
        );
        let (count,): (i64,) = query_as(&stmt).bind(file_id).fetch_one(pool).await?;
        Ok(count > 0)
    }

    pub async fn count_entries(&self) -> Result<i64, sqlx::Error> {
        let pool = self.sqlite_pool()?;
        let stmt = format!("SELECT COUNT(*) FROM {}", self.tables.filecache);
        let (count,): (i64,) = query_as(&stmt).fetch_one(pool).await?;
        Ok(count)
    }

    fn sqlite_pool(&self) -> Result<&SqlitePool, sqlx::Error> {
        match &self.pool {
            Pool::Sqlite(pool) => Ok(pool),
            _ => Err(sqlx::Error::Configuration(
                "test helpers require a SQLite catalog".into(),
            )),
        }
    }
}
