//! Cached provider search suggestions

use crate::error::Result;
use crate::models::SuggestionRecord;
use crate::repositories::query::like_prefix;
use async_trait::async_trait;
use bridge_traits::Clock;
use core_provider::SearchSuggestion;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait SuggestionRepository: Send + Sync {
    /// Replace the cached suggestions of `authority`.
    ///
    /// Suggestions without a media set id cannot be opened later and are
    /// skipped.
    async fn cache_search_suggestions(
        &self,
        authority: &str,
        suggestions: &[SearchSuggestion],
    ) -> Result<u64>;

    /// Cached suggestions whose text starts with `prefix`, newest first
    async fn get_cached_suggestions(&self, prefix: &str, limit: usize)
        -> Result<Vec<SearchSuggestion>>;

    /// Delete suggestions cached before `cutoff_ms`
    async fn clear_expired_suggestions(&self, cutoff_ms: i64) -> Result<u64>;
}

/// SQLite implementation of SuggestionRepository
pub struct SqliteSuggestionRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteSuggestionRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl SuggestionRepository for SqliteSuggestionRepository {
    async fn cache_search_suggestions(
        &self,
        authority: &str,
        suggestions: &[SearchSuggestion],
    ) -> Result<u64> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM search_suggestion WHERE authority = ?")
            .bind(authority)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        for suggestion in suggestions {
            let Some(media_set_id) = suggestion.media_set_id.as_deref() else {
                warn!(authority, "Skipping suggestion without media set id");
                continue;
            };
            inserted += query(
                r#"
                INSERT OR IGNORE INTO search_suggestion (
                    authority, media_set_id, search_text, suggestion_type, cover_media_id, created_at_ms
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(authority)
            .bind(media_set_id)
            .bind(&suggestion.search_text)
            .bind(suggestion.suggestion_type.as_str())
            .bind(&suggestion.cover_media_id)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!(authority, inserted, "Cached search suggestions");
        Ok(inserted)
    }

    async fn get_cached_suggestions(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<SearchSuggestion>> {
        let records = query_as::<_, SuggestionRecord>(
            r#"
            SELECT _id, authority, media_set_id, search_text, suggestion_type, cover_media_id
            FROM search_suggestion
            WHERE COALESCE(search_text, '') LIKE ? ESCAPE '\'
            ORDER BY created_at_ms DESC, _id ASC
            LIMIT ?
            "#,
        )
        .bind(like_prefix(prefix))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(SearchSuggestion::try_from)
            .collect()
    }

    async fn clear_expired_suggestions(&self, cutoff_ms: i64) -> Result<u64> {
        let deleted = query("DELETE FROM search_suggestion WHERE created_at_ms < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use bridge_local::ManualClock;
    use core_provider::SuggestionType;

    fn suggestion(text: &str, media_set_id: Option<&str>) -> SearchSuggestion {
        SearchSuggestion {
            search_text: Some(text.to_string()),
            media_set_id: media_set_id.map(str::to_string),
            authority: Some("cloud.a".to_string()),
            suggestion_type: SuggestionType::Location,
            cover_media_id: None,
        }
    }

    #[tokio::test]
    async fn test_cache_replaces_provider_suggestions() {
        let clock = Arc::new(ManualClock::at_millis(1_000));
        let repo = SqliteSuggestionRepository::new(create_test_pool().await.unwrap(), clock.clone());

        let inserted = repo
            .cache_search_suggestions(
                "cloud.a",
                &[suggestion("Paris", Some("loc/1")), suggestion("Nowhere", None)],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        repo.cache_search_suggestions("cloud.a", &[suggestion("Pisa", Some("loc/2"))])
            .await
            .unwrap();
        let cached = repo.get_cached_suggestions("P", 10).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].search_text.as_deref(), Some("Pisa"));
        assert_eq!(cached[0].authority.as_deref(), Some("cloud.a"));
    }

    #[tokio::test]
    async fn test_clear_expired() {
        let clock = Arc::new(ManualClock::at_millis(1_000));
        let repo = SqliteSuggestionRepository::new(create_test_pool().await.unwrap(), clock.clone());
        repo.cache_search_suggestions("cloud.a", &[suggestion("Paris", Some("loc/1"))])
            .await
            .unwrap();

        clock.advance(chrono::Duration::milliseconds(4_000));
        repo.cache_search_suggestions("cloud.b", &[suggestion("Rome", Some("loc/9"))])
            .await
            .unwrap();

        assert_eq!(repo.clear_expired_suggestions(2_000).await.unwrap(), 1);
        let remaining = repo.get_cached_suggestions("", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].search_text.as_deref(), Some("Rome"));
    }
}
