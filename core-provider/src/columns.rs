//! Topic URIs, call methods and column names of the picker provider contract.
//!
//! Notification topic strings must match the provider side byte for byte.

/// Base of every internal picker URI
pub const PICKER_INTERNAL_BASE: &str = "content://media/picker_internal/v2";

/// Change notification topics.
pub mod topics {
    pub const AVAILABLE_PROVIDERS_UPDATE: &str =
        "content://media/picker_internal/v2/available_providers/update";
    pub const MEDIA_UPDATE: &str = "content://media/picker_internal/v2/media/update";
    /// Observed recursively; album-specific notifications append
    /// `/<authority>/<album id>`.
    pub const ALBUM_UPDATE: &str = "content://media/picker_internal/v2/album/update";

    /// Notification URI for one album's content.
    pub fn album_media_update(authority: &str, album_id: &str) -> String {
        format!("{ALBUM_UPDATE}/{authority}/{album_id}")
    }

    /// Inverse of [`album_media_update`]. Returns `None` for the bare
    /// album topic or any URI outside it.
    pub fn parse_album_media_update(uri: &str) -> Option<(String, String)> {
        let rest = uri.trim_end_matches('/').strip_prefix(ALBUM_UPDATE)?;
        let mut segments = rest.strip_prefix('/')?.splitn(2, '/');
        let authority = segments.next().filter(|s| !s.is_empty())?;
        let album_id = segments.next().filter(|s| !s.is_empty())?;
        Some((authority.to_string(), album_id.to_string()))
    }
}

/// Query topics.
pub mod queries {
    pub const AVAILABLE_PROVIDERS: &str = "content://media/picker_internal/v2/available_providers";
    pub const COLLECTION_INFO: &str = "content://media/picker_internal/v2/collection_info";
    pub const MEDIA: &str = "content://media/picker_internal/v2/media";
    pub const ALBUM: &str = "content://media/picker_internal/v2/album";
    pub const PREVIEW: &str = "content://media/picker_internal/v2/media/preview";
    pub const MEDIA_FOR_URIS: &str = "content://media/picker_internal/v2/media/uris";
    pub const MEDIA_SETS: &str = "content://media/picker_internal/v2/media_sets";
    pub const MEDIA_SET_CONTENT: &str = "content://media/picker_internal/v2/media_set_content";
    pub const SEARCH_MEDIA: &str = "content://media/picker_internal/v2/search_media";
    pub const SEARCH_SUGGESTIONS: &str = "content://media/picker_internal/v2/search_suggestions";

    /// Media of one album.
    pub fn album_media(album_id: &str) -> String {
        format!("{ALBUM}/{album_id}")
    }
}

/// `call` method names.
pub mod methods {
    pub const MEDIA_INIT: &str = "picker_media_init";
    pub const ALBUM_MEDIA_INIT: &str = "picker_internal_album_media_init";
    pub const SEARCH_MEDIA_INIT: &str = "picker_internal_search_media_init";
    pub const ENSURE_PROVIDERS: &str = "ensure_providers_call";
    pub const PRE_GRANTED_COUNT: &str = "picker_internal_pre_granted_count";
}

/// Row column and argument names.
pub mod columns {
    // Provider rows
    pub const AUTHORITY: &str = "authority";
    pub const MEDIA_SOURCE: &str = "media_source";
    pub const UID: &str = "uid";
    pub const DISPLAY_NAME: &str = "display_name";

    // Collection info rows
    pub const COLLECTION_ID: &str = "collection_id";
    pub const ACCOUNT_NAME: &str = "account_name";
    pub const ACCOUNT_CONFIGURATION_INTENT: &str = "account_configuration_intent";

    // Media rows
    pub const MEDIA_ID: &str = "id";
    pub const LOCAL_ID: &str = "local_id";
    pub const PICKER_ID: &str = "picker_id";
    pub const MEDIA_URI: &str = "wrapped_uri";
    pub const LOADABLE_URI: &str = "unwrapped_uri";
    pub const DATE_TAKEN: &str = "date_taken_millis";
    pub const SIZE: &str = "size_bytes";
    pub const MIME_TYPE: &str = "mime_type";
    pub const STANDARD_MIME_TYPE_EXT: &str = "standard_mime_type_extension";
    pub const DURATION: &str = "duration_millis";
    pub const IS_PRE_GRANTED: &str = "is_pre_granted";

    // Album rows
    pub const ALBUM_ID: &str = "album_id";
    pub const COVER_URI: &str = "unwrapped_cover_uri";
    pub const COVER_MEDIA_SOURCE: &str = "cover_media_source";

    // Media set rows
    pub const MEDIA_SET_ID: &str = "media_set_id";
    pub const COVER_ID: &str = "cover_id";

    // Suggestion rows
    pub const SEARCH_TEXT: &str = "search_text";
    pub const SUGGESTION_TYPE: &str = "suggestion_type";
    pub const COVER_MEDIA_ID: &str = "cover_media_id";
}

/// Query/call argument keys.
pub mod args {
    pub const PAGE_SIZE: &str = "page_size";
    pub const PICKER_ID: &str = "picker_id";
    pub const DATE_TAKEN: &str = "date_taken_millis";
    pub const PROVIDERS: &str = "providers";
    pub const MIME_TYPES: &str = "mime_types";
    pub const ALBUM_ID: &str = "album_id";
    pub const ALBUM_AUTHORITY: &str = "album_authority";
    pub const CURRENT_SELECTION: &str = "current_selection";
    pub const CURRENT_DESELECTION: &str = "current_de_selection";
    pub const URIS: &str = "uris";
    pub const CATEGORY_ID: &str = "category_id";
    pub const MEDIA_SET_ID: &str = "media_set_id";
    pub const AUTHORITY: &str = "authority";
    pub const SEARCH_TEXT: &str = "search_text";
    pub const SUGGESTION_TYPE: &str = "suggestion_type";
    pub const SEARCH_REQUEST_ID: &str = "search_request_id";
    pub const PREFIX: &str = "prefix";
    pub const LIMIT: &str = "limit";
    pub const USER_ID: &str = "user_id";
    /// Cursor extra carrying the next resume key; absent when exhausted
    pub const RESUME_KEY: &str = "resume_page_token";
    /// Call result extra with the pre-granted item count
    pub const PRE_GRANTED_COUNT: &str = "pre_granted_count";
}
