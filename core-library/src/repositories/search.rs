//! Search request, cached result and history repository

use crate::error::Result;
use crate::models::{
    MediaFilter, MediaRecord, SearchHistoryEntry, SearchHistoryRecord, SearchRequestKey,
    SearchRequestRecord,
};
use crate::repositories::media::media_page;
use crate::repositories::query::{
    already_referenced, like_prefix, push_keyset_page, push_media_filter, resolve_reference,
    ReferenceScope, MEDIA_COLUMNS, RESOLVED_MEDIA_JOIN,
};
use async_trait::async_trait;
use bridge_traits::Clock;
use core_provider::{Media, Page, PageRequest, SearchRequest, SyncedMedia};
use sqlx::{query, query_as, QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;
use tracing::{debug, instrument};

#[async_trait]
pub trait SearchRepository: Send + Sync {
    /// Record a search request.
    ///
    /// # Returns
    /// - The new row id
    /// - `-1` if an equal request (same text, media set, authority and
    ///   normalized mime types) is already recorded
    async fn save_search_request(&self, request: &SearchRequest) -> Result<i64>;

    /// Id of the recorded request equal to `request`
    async fn get_search_request_id(&self, request: &SearchRequest) -> Result<Option<i64>>;

    async fn get_search_request(&self, id: i64) -> Result<Option<SearchRequest>>;

    /// Cache result references for `search_request_id`.
    ///
    /// # Returns
    /// Number of new references; items already cached for the request under
    /// the same resolved identity are ignored
    async fn cache_search_results(
        &self,
        search_request_id: i64,
        authority: &str,
        items: &[SyncedMedia],
    ) -> Result<u64>;

    /// One page of cached results joined against live media, newest first
    async fn query_search_media(
        &self,
        search_request_id: i64,
        filter: &MediaFilter,
        request: PageRequest,
    ) -> Result<Page<Media>>;

    /// Store the provider's resume key; `None` clears it
    async fn update_search_request_resume_key(
        &self,
        search_request_id: i64,
        authority: &str,
        resume_key: Option<&str>,
    ) -> Result<()>;

    /// `None` when never set
    async fn get_search_request_resume_key(
        &self,
        search_request_id: i64,
        authority: &str,
    ) -> Result<Option<String>>;

    /// Add `request` to history, or bump it to the top if already present
    async fn save_search_history(
        &self,
        request: &SearchRequest,
        cover_media_id: Option<&str>,
    ) -> Result<()>;

    /// History entries whose text starts with `prefix`, newest first
    async fn get_search_history(&self, prefix: &str, limit: usize)
        -> Result<Vec<SearchHistoryEntry>>;

    /// Drop every request, cached result and resume key. History is kept.
    async fn clear_search_cache(&self) -> Result<u64>;
}

/// SQLite implementation of SearchRepository
pub struct SqliteSearchRepository {
    pool: SqlitePool,
    local_authority: String,
    clock: Arc<dyn Clock>,
}

impl SqliteSearchRepository {
    pub fn new(pool: SqlitePool, local_authority: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            local_authority: local_authority.into(),
            clock,
        }
    }
}

#[async_trait]
impl SearchRepository for SqliteSearchRepository {
    #[instrument(skip(self, request))]
    async fn save_search_request(&self, request: &SearchRequest) -> Result<i64> {
        let key = SearchRequestKey::from(request);
        let result = query(
            r#"
            INSERT OR IGNORE INTO search_request (
                search_text, media_set_id, authority, suggestion_type, mime_types, created_at_ms
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key.search_text)
        .bind(&key.media_set_id)
        .bind(&key.authority)
        .bind(&key.suggestion_type)
        .bind(&key.mime_types)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("Search request already recorded");
            return Ok(-1);
        }
        Ok(result.last_insert_rowid())
    }

    async fn get_search_request_id(&self, request: &SearchRequest) -> Result<Option<i64>> {
        let key = SearchRequestKey::from(request);
        let id: Option<(i64,)> = query_as(
            r#"
            SELECT _id FROM search_request
            WHERE search_text = ? AND media_set_id = ? AND authority = ?
              AND suggestion_type = ? AND mime_types = ?
            "#,
        )
        .bind(&key.search_text)
        .bind(&key.media_set_id)
        .bind(&key.authority)
        .bind(&key.suggestion_type)
        .bind(&key.mime_types)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(|(id,)| id))
    }

    async fn get_search_request(&self, id: i64) -> Result<Option<SearchRequest>> {
        query_as::<_, SearchRequestRecord>(
            r#"
            SELECT _id, search_text, media_set_id, authority, suggestion_type, mime_types
            FROM search_request WHERE _id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(SearchRequest::try_from)
        .transpose()
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn cache_search_results(
        &self,
        search_request_id: i64,
        authority: &str,
        items: &[SyncedMedia],
    ) -> Result<u64> {
        let scope = ReferenceScope::SearchRequest(search_request_id);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for item in items {
            let identity = resolve_reference(&mut *tx, &self.local_authority, item).await?;
            if already_referenced(&mut *tx, scope, &identity).await? {
                continue;
            }
            inserted += query(
                r#"
                INSERT OR IGNORE INTO search_result_media (
                    search_request_id, media_identity, local_id, cloud_id, authority
                )
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(search_request_id)
            .bind(&identity.key)
            .bind(&identity.local_id)
            .bind(&identity.cloud_id)
            .bind(authority)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!(inserted, "Cached search results");
        Ok(inserted)
    }

    async fn query_search_media(
        &self,
        search_request_id: i64,
        filter: &MediaFilter,
        request: PageRequest,
    ) -> Result<Page<Media>> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT DISTINCT {MEDIA_COLUMNS} FROM search_result_media r{RESOLVED_MEDIA_JOIN} WHERE r.search_request_id = "
        ));
        builder.push_bind(search_request_id);
        push_media_filter(&mut builder, filter);
        push_keyset_page(&mut builder, &request);

        let records = builder
            .build_query_as::<MediaRecord>()
            .fetch_all(&self.pool)
            .await?;
        media_page(records, &request)
    }

    async fn update_search_request_resume_key(
        &self,
        search_request_id: i64,
        authority: &str,
        resume_key: Option<&str>,
    ) -> Result<()> {
        match resume_key {
            Some(resume_key) => {
                query(
                    r#"
                    INSERT INTO search_request_resume_key (search_request_id, authority, resume_key)
                    VALUES (?, ?, ?)
                    ON CONFLICT(search_request_id, authority) DO UPDATE SET resume_key = excluded.resume_key
                    "#,
                )
                .bind(search_request_id)
                .bind(authority)
                .bind(resume_key)
                .execute(&self.pool)
                .await?;
            }
            None => {
                query("DELETE FROM search_request_resume_key WHERE search_request_id = ? AND authority = ?")
                    .bind(search_request_id)
                    .bind(authority)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn get_search_request_resume_key(
        &self,
        search_request_id: i64,
        authority: &str,
    ) -> Result<Option<String>> {
        let key: Option<(String,)> = query_as(
            "SELECT resume_key FROM search_request_resume_key WHERE search_request_id = ? AND authority = ?",
        )
        .bind(search_request_id)
        .bind(authority)
        .fetch_optional(&self.pool)
        .await?;
        Ok(key.map(|(k,)| k))
    }

    async fn save_search_history(
        &self,
        request: &SearchRequest,
        cover_media_id: Option<&str>,
    ) -> Result<()> {
        let key = SearchRequestKey::from(request);
        query(
            r#"
            INSERT INTO search_history (search_text, media_set_id, authority, cover_media_id, created_at_ms)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(search_text, media_set_id, authority) DO UPDATE SET
                cover_media_id = COALESCE(excluded.cover_media_id, search_history.cover_media_id),
                created_at_ms = excluded.created_at_ms
            "#,
        )
        .bind(&key.search_text)
        .bind(&key.media_set_id)
        .bind(&key.authority)
        .bind(cover_media_id)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_search_history(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<SearchHistoryEntry>> {
        let records = query_as::<_, SearchHistoryRecord>(
            r#"
            SELECT _id, search_text, media_set_id, authority, cover_media_id, created_at_ms
            FROM search_history
            WHERE search_text LIKE ? ESCAPE '\'
            ORDER BY created_at_ms DESC, _id DESC
            LIMIT ?
            "#,
        )
        .bind(like_prefix(prefix))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(SearchHistoryEntry::from).collect())
    }

    #[instrument(skip(self))]
    async fn clear_search_cache(&self) -> Result<u64> {
        // Results and resume keys cascade.
        let deleted = query("DELETE FROM search_request")
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
    use crate::repositories::media::tests::{cloud_copy, synced, LOCAL};
    use crate::repositories::{MediaRepository, SqliteMediaRepository};
    use bridge_traits::SystemClock;
    use core_provider::{MimeTypeFilter, SuggestionType};

    async fn repos() -> (SqliteMediaRepository, SqliteSearchRepository) {
        let pool = create_test_pool().await.unwrap();
        (
            SqliteMediaRepository::new(pool.clone(), LOCAL),
            SqliteSearchRepository::new(pool, LOCAL, Arc::new(SystemClock)),
        )
    }

    fn beach(mime_types: &[&str]) -> SearchRequest {
        SearchRequest::text("beach", MimeTypeFilter::new(mime_types.iter().copied()))
    }

    #[tokio::test]
    async fn test_reordered_mime_filter_is_same_request() {
        let (_, repo) = repos().await;
        let id = repo
            .save_search_request(&beach(&["image/*", "video/*"]))
            .await
            .unwrap();
        assert!(id > 0);

        let again = repo
            .save_search_request(&beach(&["video/*", "image/*"]))
            .await
            .unwrap();
        assert_eq!(again, -1);
        assert_eq!(
            repo.get_search_request_id(&beach(&["video/*", "IMAGE/*"])).await.unwrap(),
            Some(id)
        );
    }

    #[tokio::test]
    async fn test_search_text_case_is_significant() {
        let (_, repo) = repos().await;
        let lower = repo.save_search_request(&beach(&[])).await.unwrap();
        let upper = repo
            .save_search_request(&SearchRequest::text("Beach", MimeTypeFilter::any()))
            .await
            .unwrap();
        assert!(lower > 0 && upper > 0 && lower != upper);
    }

    #[tokio::test]
    async fn test_suggestion_request_round_trip() {
        let (_, repo) = repos().await;
        let request = SearchRequest::Suggestion {
            search_text: None,
            media_set_id: "people/7".into(),
            authority: "cloud.a".into(),
            suggestion_type: SuggestionType::Face,
            mime_types: MimeTypeFilter::any(),
            resume_key: None,
        };
        let id = repo.save_search_request(&request).await.unwrap();
        assert_eq!(repo.get_search_request(id).await.unwrap(), Some(request));
        assert_eq!(repo.get_search_request(id + 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_search_results_is_idempotent() {
        let (media, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        let items = vec![
            synced("1", LOCAL, 100, "image/jpeg"),
            synced("2", LOCAL, 200, "image/jpeg"),
        ];
        media.upsert_media(&items).await.unwrap();

        assert_eq!(repo.cache_search_results(id, LOCAL, &items).await.unwrap(), 2);
        assert_eq!(repo.cache_search_results(id, LOCAL, &items).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cloud_result_resolves_to_local_row() {
        let (media, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        media
            .upsert_media(&[synced("1", LOCAL, 100, "image/jpeg")])
            .await
            .unwrap();

        let local = synced("1", LOCAL, 100, "image/jpeg");
        let copy = cloud_copy("c1", "1", 100);
        assert_eq!(repo.cache_search_results(id, LOCAL, &[local]).await.unwrap(), 1);
        assert_eq!(
            repo.cache_search_results(id, "cloud.a", &[copy]).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_query_search_media_pages_and_filters() {
        let (media, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        let items = vec![
            synced("1", LOCAL, 100, "image/jpeg"),
            synced("2", LOCAL, 300, "image/jpeg"),
            synced("3", "cloud.a", 200, "video/mp4"),
        ];
        media.upsert_media(&items).await.unwrap();
        repo.cache_search_results(id, LOCAL, &items).await.unwrap();
        media
            .upsert_media(&[synced("9", LOCAL, 999, "image/jpeg")])
            .await
            .unwrap();

        let page = repo
            .query_search_media(id, &MediaFilter::all(), PageRequest::first(2))
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|m| m.item().media_id.clone()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(page.has_next());

        let local_only = repo
            .query_search_media(
                id,
                &MediaFilter::new([LOCAL], MimeTypeFilter::any()),
                PageRequest::first(10),
            )
            .await
            .unwrap();
        assert_eq!(local_only.items.len(), 2);
    }

    #[tokio::test]
    async fn test_cached_cloud_reference_follows_late_local_row() {
        let (media, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        let copy = cloud_copy("c1", "1", 100);
        media.upsert_media(&[copy.clone()]).await.unwrap();
        repo.cache_search_results(id, "cloud.a", &[copy]).await.unwrap();

        media
            .upsert_media(&[synced("1", LOCAL, 100, "image/jpeg")])
            .await
            .unwrap();
        let page = repo
            .query_search_media(id, &MediaFilter::all(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].item().authority, LOCAL);
    }

    #[tokio::test]
    async fn test_local_result_after_cloud_copy_is_a_no_op() {
        let (media, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        let copy = cloud_copy("c1", "1", 100);
        media.upsert_media(&[copy.clone()]).await.unwrap();
        assert_eq!(repo.cache_search_results(id, "cloud.a", &[copy]).await.unwrap(), 1);

        let local = synced("1", LOCAL, 100, "image/jpeg");
        media.upsert_media(&[local.clone()]).await.unwrap();
        assert_eq!(repo.cache_search_results(id, LOCAL, &[local]).await.unwrap(), 0);

        let (rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM search_result_media WHERE search_request_id = ?")
                .bind(id)
                .fetch_one(&repo.pool)
                .await
                .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_equal_dates_order_by_picker_id_descending() {
        let (media, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        let items = vec![
            synced("a", LOCAL, 500, "image/jpeg"),
            synced("b", LOCAL, 500, "image/jpeg"),
            synced("c", LOCAL, 500, "image/jpeg"),
        ];
        media.upsert_media(&items).await.unwrap();
        repo.cache_search_results(id, LOCAL, &items).await.unwrap();

        let first = repo
            .query_search_media(id, &MediaFilter::all(), PageRequest::first(2))
            .await
            .unwrap();
        let ids: Vec<_> = first.items.iter().map(|m| m.item().media_id.clone()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert!(first.items[0].picker_id() > first.items[1].picker_id());

        let rest = repo
            .query_search_media(
                id,
                &MediaFilter::all(),
                PageRequest::after(first.next.unwrap(), 2),
            )
            .await
            .unwrap();
        let ids: Vec<_> = rest.items.iter().map(|m| m.item().media_id.clone()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_resume_keys_are_per_authority() {
        let (_, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        assert_eq!(repo.get_search_request_resume_key(id, LOCAL).await.unwrap(), None);

        repo.update_search_request_resume_key(id, LOCAL, Some("p2"))
            .await
            .unwrap();
        repo.update_search_request_resume_key(id, LOCAL, Some("p3"))
            .await
            .unwrap();
        assert_eq!(
            repo.get_search_request_resume_key(id, LOCAL).await.unwrap().as_deref(),
            Some("p3")
        );
        assert_eq!(repo.get_search_request_resume_key(id, "cloud.a").await.unwrap(), None);

        repo.update_search_request_resume_key(id, LOCAL, None).await.unwrap();
        assert_eq!(repo.get_search_request_resume_key(id, LOCAL).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_history_prefix_and_bump() {
        let (_, repo) = repos().await;
        repo.save_search_history(&beach(&[]), None).await.unwrap();
        repo.save_search_history(&SearchRequest::text("bears", MimeTypeFilter::any()), None)
            .await
            .unwrap();
        repo.save_search_history(&SearchRequest::text("cats", MimeTypeFilter::any()), None)
            .await
            .unwrap();
        repo.save_search_history(&beach(&["image/*"]), Some("cover"))
            .await
            .unwrap();

        let history = repo.get_search_history("be", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        let beach_entry = history
            .iter()
            .find(|h| h.search_text.as_deref() == Some("beach"))
            .unwrap();
        assert_eq!(beach_entry.cover_media_id.as_deref(), Some("cover"));

        assert_eq!(repo.get_search_history("", 1).await.unwrap().len(), 1);
        assert!(repo.get_search_history("%", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_search_cache_cascades() {
        let (media, repo) = repos().await;
        let id = repo.save_search_request(&beach(&[])).await.unwrap();
        let items = vec![synced("1", LOCAL, 100, "image/jpeg")];
        media.upsert_media(&items).await.unwrap();
        repo.cache_search_results(id, LOCAL, &items).await.unwrap();
        repo.update_search_request_resume_key(id, LOCAL, Some("k"))
            .await
            .unwrap();

        assert_eq!(repo.clear_search_cache().await.unwrap(), 1);
        assert_eq!(repo.get_search_request_resume_key(id, LOCAL).await.unwrap(), None);
        let page = repo
            .query_search_media(id, &MediaFilter::all(), PageRequest::first(10))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(media.count().await.unwrap(), 1);
    }
}
