//! SQLite pool for the picker cache.
//!
//! File databases run in WAL mode. In-memory databases are pinned to a single
//! connection because every `:memory:` connection opens a separate database.
//! Migrations under `migrations/` are applied before the pool is returned.

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the cache lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: CacheLocation,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Connections idle longer than this are recycled; file databases only
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            location: CacheLocation::File(database_path.into()),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(300)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: CacheLocation::Memory,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: None,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.location == CacheLocation::Memory
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            CacheLocation::File(path) => Some(path),
            CacheLocation::Memory => None,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        if !self.is_in_memory() {
            self.max_connections = max.max(1);
        }
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = match &self.location {
            CacheLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            CacheLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(LibraryError::Database)?
                .journal_mode(SqliteJournalMode::Memory),
        };
        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the cache database and bring its schema up to date.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        path = ?config.path(),
        max_connections = config.max_connections,
        "Opening picker cache"
    );

    // A recycled in-memory connection would take the whole cache with it.
    let (min_connections, max_lifetime) = if config.is_in_memory() {
        (1, None)
    } else {
        (0, Some(Duration::from_secs(1800)))
    };

    let pool = SqlitePoolOptions::new()
        .min_connections(min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(config.connect_options()?)
        .await
        .map_err(|e| {
            warn!(error = %e, "Could not open picker cache");
            LibraryError::Database(e)
        })?;

    migrate(&pool).await?;
    debug!(connections = pool.size(), "Picker cache ready");
    Ok(pool)
}

/// In-memory pool with migrations applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn migrate(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Cache schema migration failed");
        LibraryError::Migration(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await.unwrap();
        let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn test_in_memory_pool_shares_one_database() {
        let pool = create_test_pool().await.unwrap();
        sqlx::query("CREATE TABLE probe (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    sqlx::query("SELECT COUNT(*) FROM probe")
                        .fetch_one(&pool)
                        .await
                        .is_ok()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();
        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(result.0, 1, "Foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = create_test_pool().await.unwrap();
        for table in [
            "media",
            "media_set",
            "media_in_media_set",
            "search_request",
            "search_request_resume_key",
            "search_result_media",
            "search_history",
            "search_suggestion",
        ] {
            let result: (i32,) =
                sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(result.0, 1, "{table} table should exist");
        }
    }

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new("/tmp/picker.db")
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5));
        assert_eq!(config.path(), Some(Path::new("/tmp/picker.db")));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));

        let memory = DatabaseConfig::in_memory().max_connections(8);
        assert!(memory.is_in_memory());
        assert_eq!(memory.max_connections, 1);
    }
}
