//! LocalCacheStore: the picker cache behind one connection pool

use crate::db::{create_pool, DatabaseConfig};
use crate::error::Result;
use crate::repositories::query::REVEAL_UNSHADOWED_CLOUD_MEDIA;
use crate::repositories::{
    MediaRepository, MediaSetRepository, SearchRepository, SqliteMediaRepository,
    SqliteMediaSetRepository, SqliteSearchRepository, SqliteSuggestionRepository,
    SuggestionRepository,
};
use bridge_traits::Clock;
use sqlx::{query, SqlitePool};
use std::sync::Arc;
use tracing::{info, instrument};

/// Owns the cache database and hands out its repositories.
///
/// # Example
///
/// ```ignore
/// use core_library::{db::DatabaseConfig, LocalCacheStore};
///
/// let store = LocalCacheStore::open(DatabaseConfig::in_memory(), "local", clock).await?;
/// let id = store.search().save_search_request(&request).await?;
/// ```
#[derive(Clone)]
pub struct LocalCacheStore {
    pool: SqlitePool,
    media: Arc<dyn MediaRepository>,
    search: Arc<dyn SearchRepository>,
    media_sets: Arc<dyn MediaSetRepository>,
    suggestions: Arc<dyn SuggestionRepository>,
}

impl std::fmt::Debug for LocalCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCacheStore")
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl LocalCacheStore {
    /// Open (and migrate) the database described by `config`.
    pub async fn open(
        config: DatabaseConfig,
        local_authority: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool, local_authority, clock))
    }

    /// Build on an already migrated pool.
    pub fn new(pool: SqlitePool, local_authority: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            media: Arc::new(SqliteMediaRepository::new(pool.clone(), local_authority)),
            search: Arc::new(SqliteSearchRepository::new(
                pool.clone(),
                local_authority,
                Arc::clone(&clock),
            )),
            media_sets: Arc::new(SqliteMediaSetRepository::new(pool.clone(), local_authority)),
            suggestions: Arc::new(SqliteSuggestionRepository::new(pool.clone(), clock)),
            pool,
        }
    }

    pub fn media(&self) -> &dyn MediaRepository {
        self.media.as_ref()
    }

    pub fn search(&self) -> &dyn SearchRepository {
        self.search.as_ref()
    }

    pub fn media_sets(&self) -> &dyn MediaSetRepository {
        self.media_sets.as_ref()
    }

    pub fn suggestions(&self) -> &dyn SuggestionRepository {
        self.suggestions.as_ref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Remove every cached row tied to `authority` in one transaction.
    ///
    /// Used when a provider's collection changes; search requests themselves
    /// survive so recorded ids stay valid.
    ///
    /// # Returns
    /// Total number of rows removed
    #[instrument(skip(self))]
    pub async fn clear_provider_data(&self, authority: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;

        for sql in [
            "DELETE FROM search_result_media WHERE authority = ?",
            "DELETE FROM search_request_resume_key WHERE authority = ?",
            "DELETE FROM media_in_media_set WHERE authority = ?",
            "DELETE FROM media_set WHERE authority = ?",
            "DELETE FROM search_suggestion WHERE authority = ?",
            "DELETE FROM media WHERE authority = ?",
        ] {
            removed += query(sql)
                .bind(authority)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        query(REVEAL_UNSHADOWED_CLOUD_MEDIA).execute(&mut *tx).await?;

        tx.commit().await?;
        info!(authority, removed, "Cleared provider data");
        Ok(removed)
    }

    /// Drop cached search requests, results and resume keys.
    pub async fn clear_search_cache(&self) -> Result<u64> {
        self.search.clear_search_cache().await
    }
}
