//! Live media repository

use crate::error::Result;
use crate::models::{MediaFilter, MediaIdentity, MediaRecord};
use crate::repositories::query::{
    push_keyset_page, push_media_filter, shadowed_by_local, MEDIA_COLUMNS,
    REVEAL_UNSHADOWED_CLOUD_MEDIA,
};
use async_trait::async_trait;
use core_provider::{Media, Page, PageCursor, PageRequest, SyncedMedia};
use sqlx::{query, query_as, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

/// Media rows merged from every provider.
///
/// A cloud row whose local back-reference names an existing local row is
/// kept but hidden; the local row is what queries return.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Insert or refresh `items`.
    ///
    /// # Returns
    /// Number of rows inserted or updated
    async fn upsert_media(&self, items: &[SyncedMedia]) -> Result<u64>;

    /// Remove every row owned by `authority`.
    ///
    /// Cloud rows hidden behind a removed local row become visible again.
    async fn delete_media_for_authority(&self, authority: &str) -> Result<u64>;

    /// Find a visible row by its picker id
    async fn find_by_picker_id(&self, picker_id: i64) -> Result<Option<Media>>;

    /// One page of visible media, newest first
    async fn query_media(&self, filter: &MediaFilter, request: PageRequest) -> Result<Page<Media>>;

    /// Count visible rows
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of MediaRepository
pub struct SqliteMediaRepository {
    pool: SqlitePool,
    local_authority: String,
}

impl SqliteMediaRepository {
    pub fn new(pool: SqlitePool, local_authority: impl Into<String>) -> Self {
        Self {
            pool,
            local_authority: local_authority.into(),
        }
    }
}

pub(crate) fn media_page(records: Vec<MediaRecord>, request: &PageRequest) -> Result<Page<Media>> {
    let items = records
        .into_iter()
        .map(Media::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(Page::from_items(items, request.page_size, |m: &Media| {
        PageCursor::new(m.date_taken_ms(), m.picker_id())
    }))
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn upsert_media(&self, items: &[SyncedMedia]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for item in items {
            let identity = MediaIdentity::of(item, &self.local_authority);
            let visible = !shadowed_by_local(&mut *tx, &identity).await?;

            let result = query(
                r#"
                INSERT INTO media (
                    media_identity, local_id, cloud_id, authority, media_source, is_visible,
                    date_taken_ms, size_bytes, mime_type, standard_mime_type_extension,
                    duration_ms, is_pre_granted, media_uri, loadable_uri
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(media_identity) DO UPDATE SET
                    local_id = excluded.local_id,
                    is_visible = excluded.is_visible,
                    date_taken_ms = excluded.date_taken_ms,
                    size_bytes = excluded.size_bytes,
                    mime_type = excluded.mime_type,
                    standard_mime_type_extension = excluded.standard_mime_type_extension,
                    duration_ms = excluded.duration_ms,
                    is_pre_granted = excluded.is_pre_granted,
                    media_uri = excluded.media_uri,
                    loadable_uri = excluded.loadable_uri
                "#,
            )
            .bind(&identity.key)
            .bind(&identity.local_id)
            .bind(&identity.cloud_id)
            .bind(&item.authority)
            .bind(if identity.is_local() { "LOCAL" } else { "REMOTE" })
            .bind(visible)
            .bind(item.date_taken_ms)
            .bind(item.size_bytes)
            .bind(&item.mime_type)
            .bind(item.standard_mime_type_extension)
            .bind(item.duration_ms)
            .bind(item.is_pre_granted)
            .bind(&item.media_uri)
            .bind(&item.loadable_uri)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();

            if identity.is_local() {
                query("UPDATE media SET is_visible = 0 WHERE cloud_id IS NOT NULL AND local_id = ? AND media_identity != ?")
                    .bind(&identity.local_id)
                    .bind(&identity.key)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        debug!(written, "Upserted media");
        Ok(written)
    }

    #[instrument(skip(self))]
    async fn delete_media_for_authority(&self, authority: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = query("DELETE FROM media WHERE authority = ?")
            .bind(authority)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        query(REVEAL_UNSHADOWED_CLOUD_MEDIA).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(deleted)
    }

    async fn find_by_picker_id(&self, picker_id: i64) -> Result<Option<Media>> {
        let sql = format!("SELECT {MEDIA_COLUMNS} FROM media m WHERE m._id = ? AND m.is_visible = 1");
        query_as::<_, MediaRecord>(&sql)
            .bind(picker_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Media::try_from)
            .transpose()
    }

    async fn query_media(&self, filter: &MediaFilter, request: PageRequest) -> Result<Page<Media>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {MEDIA_COLUMNS} FROM media m WHERE 1 = 1"));
        push_media_filter(&mut builder, filter);
        push_keyset_page(&mut builder, &request);

        let records = builder
            .build_query_as::<MediaRecord>()
            .fetch_all(&self.pool)
            .await?;
        media_page(records, &request)
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = query_as("SELECT COUNT(*) FROM media WHERE is_visible = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
