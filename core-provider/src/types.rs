//! Typed records exchanged with media providers

use crate::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Where a provider's media lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaSource {
    Local,
    Remote,
}

impl MediaSource {
    /// Get the string representation used on the wire and in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::Local => "LOCAL",
            MediaSource::Remote => "REMOTE",
        }
    }
}

impl FromStr for MediaSource {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "LOCAL" => Ok(MediaSource::Local),
            "REMOTE" => Ok(MediaSource::Remote),
            _ => Err(ProviderError::InvalidValue {
                field: "media_source",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A media provider. Identity is the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provider {
    pub authority: String,
    pub media_source: MediaSource,
    pub uid: i32,
    pub display_name: String,
}

impl Provider {
    pub fn is_local(&self) -> bool {
        self.media_source == MediaSource::Local
    }
}

/// Identity of a provider's current dataset generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub authority: String,
    pub collection_id: Option<String>,
    pub account_name: Option<String>,
    /// Opaque handle the UI launches to configure the account
    pub account_configuration_intent: Option<String>,
}

impl CollectionInfo {
    /// Info for a provider that has not reported a collection yet.
    pub fn empty(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            collection_id: None,
            account_name: None,
            account_configuration_intent: None,
        }
    }

    /// Same authority, collection id and account.
    ///
    /// A provider whose info changes from one collection to another has
    /// reset its dataset.
    pub fn is_same_collection(&self, other: &CollectionInfo) -> bool {
        self.authority == other.authority
            && self.collection_id == other.collection_id
            && self.account_name == other.account_name
    }
}

/// Fields shared by every media variant.
///
/// `picker_id` is a volatile surrogate key. It is ignored by equality and
/// hashing, and `date_taken_ms` is left out of the hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub media_id: String,
    pub picker_id: i64,
    pub authority: String,
    pub media_source: MediaSource,
    pub media_uri: String,
    pub loadable_uri: String,
    pub date_taken_ms: i64,
    pub size_bytes: i64,
    pub mime_type: String,
    pub standard_mime_type_extension: i32,
    pub is_pre_granted: bool,
}

impl PartialEq for MediaItem {
    fn eq(&self, other: &Self) -> bool {
        self.media_id == other.media_id
            && self.authority == other.authority
            && self.media_source == other.media_source
            && self.media_uri == other.media_uri
            && self.loadable_uri == other.loadable_uri
            && self.date_taken_ms == other.date_taken_ms
            && self.size_bytes == other.size_bytes
            && self.mime_type == other.mime_type
            && self.standard_mime_type_extension == other.standard_mime_type_extension
            && self.is_pre_granted == other.is_pre_granted
    }
}

impl Eq for MediaItem {}

impl Hash for MediaItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.media_id.hash(state);
        self.authority.hash(state);
        self.media_uri.hash(state);
        self.mime_type.hash(state);
    }
}

/// A picker media item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Media {
    Image(MediaItem),
    Video { item: MediaItem, duration_ms: i64 },
}

impl Media {
    /// Pick the variant from the mime type.
    pub fn from_item(item: MediaItem, duration_ms: Option<i64>) -> Self {
        if item.mime_type.to_ascii_lowercase().starts_with("video/") {
            Media::Video {
                item,
                duration_ms: duration_ms.unwrap_or(0),
            }
        } else {
            Media::Image(item)
        }
    }

    pub fn item(&self) -> &MediaItem {
        match self {
            Media::Image(item) | Media::Video { item, .. } => item,
        }
    }

    pub fn picker_id(&self) -> i64 {
        self.item().picker_id
    }

    pub fn date_taken_ms(&self) -> i64 {
        self.item().date_taken_ms
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match self {
            Media::Video { duration_ms, .. } => Some(*duration_ms),
            Media::Image(_) => None,
        }
    }
}

/// An album exposed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub picker_id: i64,
    pub authority: String,
    pub date_taken_ms: i64,
    pub display_name: String,
    pub cover_uri: Option<String>,
    pub cover_media_source: MediaSource,
}

/// A set of mime type patterns whose order and case do not matter.
///
/// ```
/// use core_provider::types::MimeTypeFilter;
///
/// let a = MimeTypeFilter::new(["image/*", "Video/*"]);
/// let b = MimeTypeFilter::new(["video/*", "image/*", "IMAGE/*"]);
/// assert_eq!(a, b);
/// assert_eq!(a.normalized(), "image/*,video/*");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MimeTypeFilter(Vec<String>);

impl MimeTypeFilter {
    pub fn new<I, S>(mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<String> = mime_types
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        patterns.sort();
        patterns.dedup();
        Self(patterns)
    }

    /// No filtering.
    pub fn any() -> Self {
        Self::default()
    }

    /// Parse a value produced by [`normalized`](Self::normalized).
    pub fn parse(normalized: &str) -> Self {
        Self::new(normalized.split(','))
    }

    /// Canonical storage form: sorted, lower-case, comma separated.
    pub fn normalized(&self) -> String {
        self.0.join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    /// Whether `mime_type` is accepted. An empty filter accepts everything.
    pub fn matches(&self, mime_type: &str) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let mime_type = mime_type.to_lowercase();
        self.0.iter().any(|pattern| {
            if pattern == "*/*" {
                return true;
            }
            match pattern.strip_suffix("/*") {
                Some(prefix) => mime_type
                    .split_once('/')
                    .is_some_and(|(major, _)| major == prefix),
                None => *pattern == mime_type,
            }
        })
    }
}

/// A provider-defined collection of media within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSet {
    pub picker_id: i64,
    pub media_set_id: String,
    pub category_id: String,
    pub authority: String,
    pub display_name: Option<String>,
    pub cover_id: Option<String>,
    pub mime_type_filter: MimeTypeFilter,
}

/// Kind of a search suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionType {
    History,
    Album,
    Face,
    Location,
    Date,
    Text,
    Favorites,
    Videos,
    ScreenshotsAndRecordings,
}

impl SuggestionType {
    /// Get the string representation for the wire and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::History => "HISTORY",
            SuggestionType::Album => "ALBUM",
            SuggestionType::Face => "FACE",
            SuggestionType::Location => "LOCATION",
            SuggestionType::Date => "DATE",
            SuggestionType::Text => "TEXT",
            SuggestionType::Favorites => "FAVORITES",
            SuggestionType::Videos => "VIDEOS",
            SuggestionType::ScreenshotsAndRecordings => "SCREENSHOTS_AND_SCREEN_RECORDINGS",
        }
    }
}

impl FromStr for SuggestionType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "HISTORY" => Ok(SuggestionType::History),
            "ALBUM" => Ok(SuggestionType::Album),
            "FACE" => Ok(SuggestionType::Face),
            "LOCATION" => Ok(SuggestionType::Location),
            "DATE" => Ok(SuggestionType::Date),
            "TEXT" => Ok(SuggestionType::Text),
            "FAVORITES" => Ok(SuggestionType::Favorites),
            "VIDEOS" => Ok(SuggestionType::Videos),
            "SCREENSHOTS_AND_SCREEN_RECORDINGS" => Ok(SuggestionType::ScreenshotsAndRecordings),
            _ => Err(ProviderError::InvalidValue {
                field: "suggestion_type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A search issued by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchRequest {
    /// Free-text search
    Text {
        search_text: String,
        mime_types: MimeTypeFilter,
        resume_key: Option<String>,
    },
    /// A suggestion the user picked
    Suggestion {
        search_text: Option<String>,
        media_set_id: String,
        authority: String,
        suggestion_type: SuggestionType,
        mime_types: MimeTypeFilter,
        resume_key: Option<String>,
    },
}

impl SearchRequest {
    pub fn text(search_text: impl Into<String>, mime_types: MimeTypeFilter) -> Self {
        SearchRequest::Text {
            search_text: search_text.into(),
            mime_types,
            resume_key: None,
        }
    }

    pub fn search_text(&self) -> Option<&str> {
        match self {
            SearchRequest::Text { search_text, .. } => Some(search_text),
            SearchRequest::Suggestion { search_text, .. } => search_text.as_deref(),
        }
    }

    pub fn media_set_id(&self) -> Option<&str> {
        match self {
            SearchRequest::Text { .. } => None,
            SearchRequest::Suggestion { media_set_id, .. } => Some(media_set_id),
        }
    }

    pub fn authority(&self) -> Option<&str> {
        match self {
            SearchRequest::Text { .. } => None,
            SearchRequest::Suggestion { authority, .. } => Some(authority),
        }
    }

    pub fn suggestion_type(&self) -> Option<SuggestionType> {
        match self {
            SearchRequest::Text { .. } => None,
            SearchRequest::Suggestion {
                suggestion_type, ..
            } => Some(*suggestion_type),
        }
    }

    pub fn mime_types(&self) -> &MimeTypeFilter {
        match self {
            SearchRequest::Text { mime_types, .. }
            | SearchRequest::Suggestion { mime_types, .. } => mime_types,
        }
    }

    pub fn resume_key(&self) -> Option<&str> {
        match self {
            SearchRequest::Text { resume_key, .. }
            | SearchRequest::Suggestion { resume_key, .. } => resume_key.as_deref(),
        }
    }
}

/// A suggestion offered while the user types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSuggestion {
    pub search_text: Option<String>,
    pub media_set_id: Option<String>,
    pub authority: Option<String>,
    pub suggestion_type: SuggestionType,
    pub cover_media_id: Option<String>,
}

/// Current selection state shown by the preview grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSelection {
    pub selected: Vec<Media>,
    pub deselected: Vec<Media>,
}

impl PreviewSelection {
    pub fn new(selected: Vec<Media>, deselected: Vec<Media>) -> Self {
        Self {
            selected,
            deselected,
        }
    }
}

/// A media row delivered by a sync pass (search results, media set
/// content). Cloud rows may carry `local_id`, a back-reference to the
/// on-device copy of the same item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedMedia {
    pub media_id: String,
    pub local_id: Option<String>,
    pub authority: String,
    pub media_source: MediaSource,
    pub media_uri: String,
    pub loadable_uri: String,
    pub date_taken_ms: i64,
    pub size_bytes: i64,
    pub mime_type: String,
    pub standard_mime_type_extension: i32,
    pub duration_ms: Option<i64>,
    pub is_pre_granted: bool,
}

impl SyncedMedia {
    /// Id of the on-device copy, if known.
    pub fn local_id(&self) -> Option<&str> {
        match self.media_source {
            MediaSource::Local => Some(&self.media_id),
            MediaSource::Remote => self.local_id.as_deref(),
        }
    }

    /// Provider id of the cloud copy; `None` for local rows.
    pub fn cloud_id(&self) -> Option<&str> {
        match self.media_source {
            MediaSource::Local => None,
            MediaSource::Remote => Some(&self.media_id),
        }
    }
}

/// A media set row before it is stored. Rows without `media_set_id` are
/// dropped when cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMediaSet {
    pub media_set_id: Option<String>,
    pub display_name: Option<String>,
    pub cover_id: Option<String>,
}
