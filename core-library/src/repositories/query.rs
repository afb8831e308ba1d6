//! SQL fragments shared by the cached-media queries

use crate::error::Result;
use crate::models::{MediaFilter, MediaIdentity};
use core_provider::{PageRequest, SyncedMedia};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

/// Columns selected for a [`crate::models::MediaRecord`], from alias `m`.
pub(crate) const MEDIA_COLUMNS: &str = "m._id, m.local_id, m.cloud_id, m.authority, \
     m.media_source, m.date_taken_ms, m.size_bytes, m.mime_type, \
     m.standard_mime_type_extension, m.duration_ms, m.is_pre_granted, \
     m.media_uri, m.loadable_uri";

/// Join a cached reference `r` onto the live media row it resolves to.
///
/// A reference carrying a local id resolves to the local row whenever one
/// exists, even if the reference was cached under a cloud identity.
pub(crate) const RESOLVED_MEDIA_JOIN: &str = " JOIN media m ON m.media_identity = CASE \
     WHEN r.local_id IS NOT NULL \
      AND EXISTS (SELECT 1 FROM media l WHERE l.media_identity = 'l:' || r.local_id) \
     THEN 'l:' || r.local_id \
     ELSE r.media_identity END";

/// Make hidden cloud rows visible again once their local row is gone.
pub(crate) const REVEAL_UNSHADOWED_CLOUD_MEDIA: &str = "UPDATE media SET is_visible = 1 \
     WHERE is_visible = 0 AND cloud_id IS NOT NULL \
       AND NOT EXISTS (SELECT 1 FROM media l WHERE l.media_identity = 'l:' || media.local_id)";

/// Append authority and mime type conditions on `m`.
///
/// Expects a preceding `WHERE` clause.
pub(crate) fn push_media_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &MediaFilter) {
    builder.push(" AND m.is_visible = 1");

    if !filter.authorities.is_empty() {
        builder.push(" AND m.authority IN (");
        let mut authorities = builder.separated(", ");
        for authority in &filter.authorities {
            authorities.push_bind(authority.clone());
        }
        authorities.push_unseparated(")");
    }

    let patterns = filter.mime_types.patterns();
    if patterns.is_empty() || patterns.iter().any(|p| p == "*/*") {
        return;
    }
    builder.push(" AND (");
    for (i, pattern) in patterns.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        match pattern.strip_suffix("/*") {
            Some(major) => {
                builder
                    .push("lower(m.mime_type) LIKE ")
                    .push_bind(format!("{major}/%"));
            }
            None => {
                builder
                    .push("lower(m.mime_type) = ")
                    .push_bind(pattern.clone());
            }
        }
    }
    builder.push(")");
}

/// Append the keyset condition, newest-first ordering and limit.
pub(crate) fn push_keyset_page(builder: &mut QueryBuilder<'_, Sqlite>, request: &PageRequest) {
    if let Some(cursor) = request.cursor {
        builder
            .push(" AND (m.date_taken_ms < ")
            .push_bind(cursor.date_taken_ms)
            .push(" OR (m.date_taken_ms = ")
            .push_bind(cursor.date_taken_ms)
            .push(" AND m._id < ")
            .push_bind(cursor.picker_id)
            .push("))");
    }
    builder
        .push(" ORDER BY m.date_taken_ms DESC, m._id DESC LIMIT ")
        .push_bind(request.limit());
}

async fn local_row_exists(conn: &mut SqliteConnection, local_id: &str) -> Result<bool> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT _id FROM media WHERE media_identity = ?")
        .bind(format!("l:{local_id}"))
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

/// Identity a cached reference to `item` is stored under.
///
/// Local rows, and cloud rows whose local back-reference names a known local
/// row, resolve to the local identity; everything else keeps its cloud id.
pub(crate) async fn resolve_reference(
    conn: &mut SqliteConnection,
    local_authority: &str,
    item: &SyncedMedia,
) -> Result<MediaIdentity> {
    let own = MediaIdentity::of(item, local_authority);
    if own.is_local() {
        return Ok(own);
    }
    if let Some(local_id) = item.local_id.as_deref() {
        if local_row_exists(conn, local_id).await? {
            return Ok(MediaIdentity::resolved_local(local_id, &item.media_id));
        }
    }
    Ok(own)
}

/// Container a cached media reference belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ReferenceScope {
    SearchRequest(i64),
    MediaSet(i64),
}

impl ReferenceScope {
    fn lookup_sql(self) -> &'static str {
        match self {
            ReferenceScope::SearchRequest(_) => {
                "SELECT 1 FROM search_result_media WHERE search_request_id = ? \
                 AND (media_identity = ? OR (? IS NOT NULL AND local_id = ?)) LIMIT 1"
            }
            ReferenceScope::MediaSet(_) => {
                "SELECT 1 FROM media_in_media_set WHERE media_set_picker_id = ? \
                 AND (media_identity = ? OR (? IS NOT NULL AND local_id = ?)) LIMIT 1"
            }
        }
    }

    fn id(self) -> i64 {
        match self {
            ReferenceScope::SearchRequest(id) | ReferenceScope::MediaSet(id) => id,
        }
    }
}

/// Whether `scope` already references the logical item behind `identity`.
///
/// A local row and a cloud copy carrying its local id are one item, so a
/// shared local id counts as a match whichever of the two was cached first.
pub(crate) async fn already_referenced(
    conn: &mut SqliteConnection,
    scope: ReferenceScope,
    identity: &MediaIdentity,
) -> Result<bool> {
    let found: Option<(i64,)> = sqlx::query_as(scope.lookup_sql())
        .bind(scope.id())
        .bind(&identity.key)
        .bind(&identity.local_id)
        .bind(&identity.local_id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

/// Whether a cloud row should be hidden behind an existing local row.
pub(crate) async fn shadowed_by_local(
    conn: &mut SqliteConnection,
    identity: &MediaIdentity,
) -> Result<bool> {
    match identity.local_id.as_deref() {
        Some(local_id) if !identity.is_local() => local_row_exists(conn, local_id).await,
        _ => Ok(false),
    }
}

/// `LIKE` pattern matching values that start with `prefix`; use with
/// `ESCAPE '\'`.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("be"), "be%");
        assert_eq!(like_prefix("50%_off"), "50\\%\\_off%");
    }
}
