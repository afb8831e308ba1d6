//! Media set repository

use crate::error::Result;
use crate::models::{MediaFilter, MediaRecord, MediaSetRecord};
use crate::repositories::media::media_page;
use crate::repositories::query::{
    already_referenced, push_keyset_page, push_media_filter, resolve_reference, ReferenceScope,
    MEDIA_COLUMNS, RESOLVED_MEDIA_JOIN,
};
use async_trait::async_trait;
use core_provider::{Media, MediaSet, MimeTypeFilter, Page, PageRequest, RemoteMediaSet, SyncedMedia};
use sqlx::{query, query_as, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};

#[async_trait]
pub trait MediaSetRepository: Send + Sync {
    /// Cache media sets of `category_id` reported by `authority`.
    ///
    /// Rows without a media set id are skipped. A set already cached for the
    /// same category, authority and normalized mime filter is left alone.
    ///
    /// # Returns
    /// Number of new media sets
    async fn cache_media_sets(
        &self,
        category_id: &str,
        authority: &str,
        mime_types: &MimeTypeFilter,
        sets: &[RemoteMediaSet],
    ) -> Result<u64>;

    async fn get_media_set(&self, picker_id: i64) -> Result<Option<MediaSet>>;

    /// Cached media sets in insertion order
    async fn query_media_sets(
        &self,
        category_id: &str,
        authority: &str,
        mime_types: &MimeTypeFilter,
    ) -> Result<Vec<MediaSet>>;

    /// Cache content references of a media set.
    ///
    /// # Returns
    /// Number of new references
    async fn cache_media_of_media_set(
        &self,
        media_set_picker_id: i64,
        items: &[SyncedMedia],
    ) -> Result<u64>;

    /// One page of a media set's content joined against live media
    async fn query_media_in_media_set(
        &self,
        media_set_picker_id: i64,
        filter: &MediaFilter,
        request: PageRequest,
    ) -> Result<Page<Media>>;

    async fn update_media_in_media_set_resume_key(
        &self,
        media_set_picker_id: i64,
        resume_key: Option<&str>,
    ) -> Result<()>;

    /// `None` when never set
    async fn get_media_in_media_set_resume_key(
        &self,
        media_set_picker_id: i64,
    ) -> Result<Option<String>>;
}

/// SQLite implementation of MediaSetRepository
pub struct SqliteMediaSetRepository {
    pool: SqlitePool,
    local_authority: String,
}

impl SqliteMediaSetRepository {
    pub fn new(pool: SqlitePool, local_authority: impl Into<String>) -> Self {
        Self {
            pool,
            local_authority: local_authority.into(),
        }
    }
}

const MEDIA_SET_COLUMNS: &str =
    "_id, category_id, media_set_id, authority, display_name, cover_id, mime_type_filter";

#[async_trait]
impl MediaSetRepository for SqliteMediaSetRepository {
    #[instrument(skip(self, mime_types, sets), fields(count = sets.len()))]
    async fn cache_media_sets(
        &self,
        category_id: &str,
        authority: &str,
        mime_types: &MimeTypeFilter,
        sets: &[RemoteMediaSet],
    ) -> Result<u64> {
        let filter = mime_types.normalized();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for set in sets {
            let Some(media_set_id) = set.media_set_id.as_deref() else {
                warn!(category_id, authority, "Skipping media set without id");
                continue;
            };
            inserted += query(
                r#"
                INSERT OR IGNORE INTO media_set (
                    category_id, media_set_id, authority, display_name, cover_id, mime_type_filter
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(category_id)
            .bind(media_set_id)
            .bind(authority)
            .bind(&set.display_name)
            .bind(&set.cover_id)
            .bind(&filter)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!(inserted, "Cached media sets");
        Ok(inserted)
    }

    async fn get_media_set(&self, picker_id: i64) -> Result<Option<MediaSet>> {
        let sql = format!("SELECT {MEDIA_SET_COLUMNS} FROM media_set WHERE _id = ?");
        let record = query_as::<_, MediaSetRecord>(&sql)
            .bind(picker_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(MediaSet::from))
    }

    async fn query_media_sets(
        &self,
        category_id: &str,
        authority: &str,
        mime_types: &MimeTypeFilter,
    ) -> Result<Vec<MediaSet>> {
        let sql = format!(
            "SELECT {MEDIA_SET_COLUMNS} FROM media_set \
             WHERE category_id = ? AND authority = ? AND mime_type_filter = ? ORDER BY _id"
        );
        let records = query_as::<_, MediaSetRecord>(&sql)
            .bind(category_id)
            .bind(authority)
            .bind(mime_types.normalized())
            .fetch_all(&self.pool)
            .await?;
        Ok(records.into_iter().map(MediaSet::from).collect())
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn cache_media_of_media_set(
        &self,
        media_set_picker_id: i64,
        items: &[SyncedMedia],
    ) -> Result<u64> {
        let scope = ReferenceScope::MediaSet(media_set_picker_id);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for item in items {
            let identity = resolve_reference(&mut *tx, &self.local_authority, item).await?;
            if already_referenced(&mut *tx, scope, &identity).await? {
                continue;
            }
            inserted += query(
                r#"
                INSERT OR IGNORE INTO media_in_media_set (
                    media_set_picker_id, media_identity, local_id, cloud_id, authority
                )
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(media_set_picker_id)
            .bind(&identity.key)
            .bind(&identity.local_id)
            .bind(&identity.cloud_id)
            .bind(&item.authority)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn query_media_in_media_set(
        &self,
        media_set_picker_id: i64,
        filter: &MediaFilter,
        request: PageRequest,
    ) -> Result<Page<Media>> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT DISTINCT {MEDIA_COLUMNS} FROM media_in_media_set r{RESOLVED_MEDIA_JOIN} WHERE r.media_set_picker_id = "
        ));
        builder.push_bind(media_set_picker_id);
        push_media_filter(&mut builder, filter);
        push_keyset_page(&mut builder, &request);

        let records = builder
            .build_query_as::<MediaRecord>()
            .fetch_all(&self.pool)
            .await?;
        media_page(records, &request)
    }

    async fn update_media_in_media_set_resume_key(
        &self,
        media_set_picker_id: i64,
        resume_key: Option<&str>,
    ) -> Result<()> {
        query("UPDATE media_set SET media_in_media_set_resume_key = ? WHERE _id = ?")
            .bind(resume_key)
            .bind(media_set_picker_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_media_in_media_set_resume_key(
        &self,
        media_set_picker_id: i64,
    ) -> Result<Option<String>> {
        let key: Option<(Option<String>,)> =
            query_as("SELECT media_in_media_set_resume_key FROM media_set WHERE _id = ?")
                .bind(media_set_picker_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(key.and_then(|(k,)| k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::repositories::media::tests::{cloud_copy, synced, LOCAL};
    use crate::repositories::{MediaRepository, SqliteMediaRepository};

    async fn repos() -> (SqliteMediaRepository, SqliteMediaSetRepository) {
        let pool = create_test_pool().await.unwrap();
        (
            SqliteMediaRepository::new(pool.clone(), LOCAL),
            SqliteMediaSetRepository::new(pool, LOCAL),
        )
    }

    fn remote_set(id: Option<&str>) -> RemoteMediaSet {
        RemoteMediaSet {
            media_set_id: id.map(str::to_string),
            display_name: id.map(|i| format!("Set {i}")),
            cover_id: None,
        }
    }

    #[tokio::test]
    async fn test_cache_media_sets_skips_missing_ids() {
        let (_, repo) = repos().await;
        let filter = MimeTypeFilter::new(["image/*"]);
        let inserted = repo
            .cache_media_sets(
                "people",
                "cloud.a",
                &filter,
                &[remote_set(Some("p1")), remote_set(None), remote_set(Some("p2"))],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let sets = repo.query_media_sets("people", "cloud.a", &filter).await.unwrap();
        let ids: Vec<_> = sets.iter().map(|s| s.media_set_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(sets[0].display_name.as_deref(), Some("Set p1"));
    }

    #[tokio::test]
    async fn test_reordered_filter_is_a_no_op() {
        let (_, repo) = repos().await;
        let sets = [remote_set(Some("p1"))];
        repo.cache_media_sets("people", "cloud.a", &MimeTypeFilter::new(["image/*", "video/*"]), &sets)
            .await
            .unwrap();

        let again = repo
            .cache_media_sets("people", "cloud.a", &MimeTypeFilter::new(["video/*", "image/*"]), &sets)
            .await
            .unwrap();
        assert_eq!(again, 0);

        let other_filter = repo
            .cache_media_sets("people", "cloud.a", &MimeTypeFilter::new(["image/*"]), &sets)
            .await
            .unwrap();
        assert_eq!(other_filter, 1);
    }

    #[tokio::test]
    async fn test_media_in_media_set_and_resume_key() {
        let (media, repo) = repos().await;
        repo.cache_media_sets("albums", LOCAL, &MimeTypeFilter::any(), &[remote_set(Some("a1"))])
            .await
            .unwrap();
        let set = repo
            .query_media_sets("albums", LOCAL, &MimeTypeFilter::any())
            .await
            .unwrap()
            .remove(0);
        assert_eq!(repo.get_media_set(set.picker_id).await.unwrap(), Some(set.clone()));
        assert_eq!(
            repo.get_media_in_media_set_resume_key(set.picker_id).await.unwrap(),
            None
        );

        let items = vec![
            synced("1", LOCAL, 100, "image/jpeg"),
            synced("2", LOCAL, 200, "image/jpeg"),
        ];
        media.upsert_media(&items).await.unwrap();
        assert_eq!(repo.cache_media_of_media_set(set.picker_id, &items).await.unwrap(), 2);
        assert_eq!(
            repo.cache_media_of_media_set(set.picker_id, &[cloud_copy("c2", "2", 200)])
                .await
                .unwrap(),
            0
        );

        let page = repo
            .query_media_in_media_set(set.picker_id, &MediaFilter::all(), PageRequest::first(1))
            .await
            .unwrap();
        assert_eq!(page.items[0].item().media_id, "2");
        assert!(page.has_next());

        repo.update_media_in_media_set_resume_key(set.picker_id, Some("next"))
            .await
            .unwrap();
        assert_eq!(
            repo.get_media_in_media_set_resume_key(set.picker_id)
                .await
                .unwrap()
                .as_deref(),
            Some("next")
        );
    }

    async fn cached_set(repo: &SqliteMediaSetRepository, id: &str) -> MediaSet {
        repo.cache_media_sets("albums", LOCAL, &MimeTypeFilter::any(), &[remote_set(Some(id))])
            .await
            .unwrap();
        repo.query_media_sets("albums", LOCAL, &MimeTypeFilter::any())
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.media_set_id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_page_of_two_over_three_items_is_newest_first() {
        let (media, repo) = repos().await;
        let set = cached_set(&repo, "a1").await;
        let items = vec![
            synced("1", LOCAL, 100, "image/jpeg"),
            synced("2", LOCAL, 300, "image/jpeg"),
            synced("3", LOCAL, 200, "image/jpeg"),
        ];
        media.upsert_media(&items).await.unwrap();
        assert_eq!(repo.cache_media_of_media_set(set.picker_id, &items).await.unwrap(), 3);

        let page = repo
            .query_media_in_media_set(set.picker_id, &MediaFilter::all(), PageRequest::first(2))
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|m| m.item().media_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert!(page.has_next());
    }

    #[tokio::test]
    async fn test_equal_dates_order_by_picker_id_descending() {
        let (media, repo) = repos().await;
        let set = cached_set(&repo, "a1").await;
        let items = vec![
            synced("x", LOCAL, 700, "image/jpeg"),
            synced("y", LOCAL, 700, "image/jpeg"),
            synced("z", LOCAL, 700, "image/jpeg"),
        ];
        media.upsert_media(&items).await.unwrap();
        repo.cache_media_of_media_set(set.picker_id, &items).await.unwrap();

        let page = repo
            .query_media_in_media_set(set.picker_id, &MediaFilter::all(), PageRequest::first(3))
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|m| m.item().media_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "y", "x"]);
    }

    #[tokio::test]
    async fn test_local_item_after_cloud_copy_is_a_no_op() {
        let (media, repo) = repos().await;
        let set = cached_set(&repo, "a1").await;
        let copy = cloud_copy("c1", "1", 100);
        media.upsert_media(&[copy.clone()]).await.unwrap();
        assert_eq!(repo.cache_media_of_media_set(set.picker_id, &[copy]).await.unwrap(), 1);

        let local = synced("1", LOCAL, 100, "image/jpeg");
        media.upsert_media(&[local.clone()]).await.unwrap();
        assert_eq!(repo.cache_media_of_media_set(set.picker_id, &[local]).await.unwrap(), 0);

        let (rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM media_in_media_set WHERE media_set_picker_id = ?")
                .bind(set.picker_id)
                .fetch_one(&repo.pool)
                .await
                .unwrap();
        assert_eq!(rows, 1);

        let page = repo
            .query_media_in_media_set(set.picker_id, &MediaFilter::all(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].item().authority, LOCAL);
    }
}
