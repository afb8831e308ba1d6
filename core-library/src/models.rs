//! Cache records and their conversion into provider types

use core_provider::{
    Media, MediaItem, MediaSet, MediaSource, MimeTypeFilter, ProviderError, SearchRequest,
    SearchSuggestion, SuggestionType, SyncedMedia,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{LibraryError, Result};

/// Resume key stored once a provider reported that no more data follows.
pub const SYNC_COMPLETE_RESUME_KEY: &str = "DONE";

/// Identity a media row is stored and referenced under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaIdentity {
    pub key: String,
    pub local_id: Option<String>,
    pub cloud_id: Option<String>,
}

impl MediaIdentity {
    pub fn local(local_id: &str) -> Self {
        Self {
            key: format!("l:{local_id}"),
            local_id: Some(local_id.to_string()),
            cloud_id: None,
        }
    }

    pub fn cloud(authority: &str, cloud_id: &str, local_ref: Option<&str>) -> Self {
        Self {
            key: format!("c:{authority}:{cloud_id}"),
            local_id: local_ref.map(str::to_string),
            cloud_id: Some(cloud_id.to_string()),
        }
    }

    /// A cloud item that resolves to an existing local row.
    pub fn resolved_local(local_id: &str, cloud_id: &str) -> Self {
        Self {
            cloud_id: Some(cloud_id.to_string()),
            ..Self::local(local_id)
        }
    }

    /// The row's own identity, before any local/cloud resolution.
    pub fn of(item: &SyncedMedia, local_authority: &str) -> Self {
        if item.media_source == MediaSource::Local || item.authority == local_authority {
            Self::local(&item.media_id)
        } else {
            Self::cloud(&item.authority, &item.media_id, item.local_id.as_deref())
        }
    }

    pub fn is_local(&self) -> bool {
        self.key.starts_with("l:")
    }
}

/// Which cached media a query returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaFilter {
    /// Empty means every authority
    pub authorities: Vec<String>,
    pub mime_types: MimeTypeFilter,
}

impl MediaFilter {
    pub fn new<I, S>(authorities: I, mime_types: MimeTypeFilter) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authorities: authorities.into_iter().map(Into::into).collect(),
            mime_types,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }
}

fn empty_to_none(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct MediaRecord {
    #[sqlx(rename = "_id")]
    pub picker_id: i64,
    pub local_id: Option<String>,
    pub cloud_id: Option<String>,
    pub authority: String,
    pub media_source: String,
    pub date_taken_ms: i64,
    pub size_bytes: i64,
    pub mime_type: String,
    pub standard_mime_type_extension: i64,
    pub duration_ms: Option<i64>,
    pub is_pre_granted: bool,
    pub media_uri: String,
    pub loadable_uri: String,
}

impl TryFrom<MediaRecord> for Media {
    type Error = LibraryError;

    fn try_from(record: MediaRecord) -> Result<Self> {
        let corrupt = |source| LibraryError::CorruptRow {
            table: "media",
            id: record.picker_id,
            source,
        };
        let media_source: MediaSource = record.media_source.parse().map_err(corrupt)?;
        let media_id = match media_source {
            MediaSource::Local => record.local_id,
            MediaSource::Remote => record.cloud_id,
        }
        .ok_or_else(|| corrupt(ProviderError::malformed("media", "id")))?;

        let item = MediaItem {
            media_id,
            picker_id: record.picker_id,
            authority: record.authority,
            media_source,
            media_uri: record.media_uri,
            loadable_uri: record.loadable_uri,
            date_taken_ms: record.date_taken_ms,
            size_bytes: record.size_bytes,
            mime_type: record.mime_type,
            standard_mime_type_extension: i32::try_from(record.standard_mime_type_extension)
                .unwrap_or_default(),
            is_pre_granted: record.is_pre_granted,
        };
        Ok(Media::from_item(item, record.duration_ms))
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct MediaSetRecord {
    #[sqlx(rename = "_id")]
    pub picker_id: i64,
    pub category_id: String,
    pub media_set_id: String,
    pub authority: String,
    pub display_name: Option<String>,
    pub cover_id: Option<String>,
    pub mime_type_filter: String,
}

impl From<MediaSetRecord> for MediaSet {
    fn from(record: MediaSetRecord) -> Self {
        MediaSet {
            picker_id: record.picker_id,
            media_set_id: record.media_set_id,
            category_id: record.category_id,
            authority: record.authority,
            display_name: record.display_name,
            cover_id: record.cover_id,
            mime_type_filter: MimeTypeFilter::parse(&record.mime_type_filter),
        }
    }
}

/// Column values a search request is stored under.
///
/// Absent values become empty strings so the uniqueness constraint applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchRequestKey {
    pub search_text: String,
    pub media_set_id: String,
    pub authority: String,
    pub suggestion_type: String,
    pub mime_types: String,
}

impl From<&SearchRequest> for SearchRequestKey {
    fn from(request: &SearchRequest) -> Self {
        Self {
            search_text: request.search_text().unwrap_or_default().to_string(),
            media_set_id: request.media_set_id().unwrap_or_default().to_string(),
            authority: request.authority().unwrap_or_default().to_string(),
            suggestion_type: request
                .suggestion_type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            mime_types: request.mime_types().normalized(),
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SearchRequestRecord {
    #[sqlx(rename = "_id")]
    pub id: i64,
    pub search_text: String,
    pub media_set_id: String,
    pub authority: String,
    pub suggestion_type: String,
    pub mime_types: String,
}

impl TryFrom<SearchRequestRecord> for SearchRequest {
    type Error = LibraryError;

    fn try_from(record: SearchRequestRecord) -> Result<Self> {
        let mime_types = MimeTypeFilter::parse(&record.mime_types);
        if record.suggestion_type.is_empty() {
            return Ok(SearchRequest::Text {
                search_text: record.search_text,
                mime_types,
                resume_key: None,
            });
        }
        let suggestion_type: SuggestionType =
            record
                .suggestion_type
                .parse()
                .map_err(|source| LibraryError::CorruptRow {
                    table: "search_request",
                    id: record.id,
                    source,
                })?;
        Ok(SearchRequest::Suggestion {
            search_text: empty_to_none(record.search_text),
            media_set_id: record.media_set_id,
            authority: record.authority,
            suggestion_type,
            mime_types,
            resume_key: None,
        })
    }
}

/// A previously run search, newest first in history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub search_text: Option<String>,
    pub media_set_id: Option<String>,
    pub authority: Option<String>,
    pub cover_media_id: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Debug, FromRow)]
pub(crate) struct SearchHistoryRecord {
    #[sqlx(rename = "_id")]
    pub id: i64,
    pub search_text: String,
    pub media_set_id: String,
    pub authority: String,
    pub cover_media_id: Option<String>,
    pub created_at_ms: i64,
}

impl From<SearchHistoryRecord> for SearchHistoryEntry {
    fn from(record: SearchHistoryRecord) -> Self {
        Self {
            id: record.id,
            search_text: empty_to_none(record.search_text),
            media_set_id: empty_to_none(record.media_set_id),
            authority: empty_to_none(record.authority),
            cover_media_id: record.cover_media_id,
            created_at_ms: record.created_at_ms,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SuggestionRecord {
    #[sqlx(rename = "_id")]
    pub id: i64,
    pub authority: String,
    pub media_set_id: String,
    pub search_text: Option<String>,
    pub suggestion_type: String,
    pub cover_media_id: Option<String>,
}

impl TryFrom<SuggestionRecord> for SearchSuggestion {
    type Error = LibraryError;

    fn try_from(record: SuggestionRecord) -> Result<Self> {
        let suggestion_type =
            record
                .suggestion_type
                .parse()
                .map_err(|source| LibraryError::CorruptRow {
                    table: "search_suggestion",
                    id: record.id,
                    source,
                })?;
        Ok(SearchSuggestion {
            search_text: record.search_text,
            media_set_id: Some(record.media_set_id),
            authority: Some(record.authority),
            suggestion_type,
            cover_media_id: record.cover_media_id,
        })
    }
}
