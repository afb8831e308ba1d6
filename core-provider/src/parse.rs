//! Row → record conversion
//!
//! Each `TryFrom<&Row>` fails with [`ProviderError::MalformedRow`] naming the
//! first required column that is missing; optional columns fall back to
//! defaults.

use crate::columns::columns as col;
use crate::error::{ProviderError, Result};
use crate::types::{
    Album, CollectionInfo, Media, MediaItem, MediaSource, Provider, RemoteMediaSet,
    SearchSuggestion, SuggestionType, SyncedMedia,
};
use bridge_traits::row::{Row, RowExt};

fn required_text(row: &Row, kind: &'static str, column: &'static str) -> Result<String> {
    row.text(column)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::malformed(kind, column))
}

fn required_int(row: &Row, kind: &'static str, column: &'static str) -> Result<i64> {
    row.int(column)
        .ok_or_else(|| ProviderError::malformed(kind, column))
}

fn media_source(row: &Row, kind: &'static str, column: &'static str) -> Result<MediaSource> {
    required_text(row, kind, column)?
        .parse()
        .map_err(|_| ProviderError::malformed(kind, column))
}

impl TryFrom<&Row> for Provider {
    type Error = ProviderError;

    fn try_from(row: &Row) -> Result<Self> {
        const KIND: &str = "provider";
        let authority = required_text(row, KIND, col::AUTHORITY)?;
        let uid = i32::try_from(required_int(row, KIND, col::UID)?)
            .map_err(|_| ProviderError::malformed(KIND, col::UID))?;
        Ok(Provider {
            media_source: media_source(row, KIND, col::MEDIA_SOURCE)?,
            uid,
            display_name: row
                .text(col::DISPLAY_NAME)
                .unwrap_or_else(|| authority.clone()),
            authority,
        })
    }
}

impl TryFrom<&Row> for CollectionInfo {
    type Error = ProviderError;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(CollectionInfo {
            authority: required_text(row, "collection info", col::AUTHORITY)?,
            collection_id: row.text(col::COLLECTION_ID),
            account_name: row.text(col::ACCOUNT_NAME),
            account_configuration_intent: row.text(col::ACCOUNT_CONFIGURATION_INTENT),
        })
    }
}

impl TryFrom<&Row> for Media {
    type Error = ProviderError;

    fn try_from(row: &Row) -> Result<Self> {
        const KIND: &str = "media";
        let media_uri = required_text(row, KIND, col::MEDIA_URI)?;
        let item = MediaItem {
            media_id: required_text(row, KIND, col::MEDIA_ID)?,
            picker_id: required_int(row, KIND, col::PICKER_ID)?,
            authority: required_text(row, KIND, col::AUTHORITY)?,
            media_source: media_source(row, KIND, col::MEDIA_SOURCE)?,
            loadable_uri: row
                .text(col::LOADABLE_URI)
                .unwrap_or_else(|| media_uri.clone()),
            media_uri,
            date_taken_ms: required_int(row, KIND, col::DATE_TAKEN)?,
            size_bytes: row.int(col::SIZE).unwrap_or(0),
            mime_type: required_text(row, KIND, col::MIME_TYPE)?,
            standard_mime_type_extension: row
                .int(col::STANDARD_MIME_TYPE_EXT)
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(0),
            is_pre_granted: row.flag(col::IS_PRE_GRANTED).unwrap_or(false),
        };
        Ok(Media::from_item(item, row.int(col::DURATION)))
    }
}

impl TryFrom<&Row> for Album {
    type Error = ProviderError;

    fn try_from(row: &Row) -> Result<Self> {
        const KIND: &str = "album";
        let cover_media_source = match row.text(col::COVER_MEDIA_SOURCE) {
            Some(source) => source
                .parse()
                .map_err(|_| ProviderError::malformed(KIND, col::COVER_MEDIA_SOURCE))?,
            None => MediaSource::Local,
        };
        Ok(Album {
            id: required_text(row, KIND, col::ALBUM_ID)?,
            picker_id: row.int(col::PICKER_ID).unwrap_or(0),
            authority: required_text(row, KIND, col::AUTHORITY)?,
            date_taken_ms: row.int(col::DATE_TAKEN).unwrap_or(0),
            display_name: row.text(col::DISPLAY_NAME).unwrap_or_default(),
            cover_uri: row.text(col::COVER_URI),
            cover_media_source,
        })
    }
}

impl TryFrom<&Row> for SyncedMedia {
    type Error = ProviderError;

    fn try_from(row: &Row) -> Result<Self> {
        const KIND: &str = "synced media";
        let media_uri = required_text(row, KIND, col::MEDIA_URI)?;
        Ok(SyncedMedia {
            media_id: required_text(row, KIND, col::MEDIA_ID)?,
            local_id: row.text(col::LOCAL_ID).filter(|s| !s.is_empty()),
            authority: required_text(row, KIND, col::AUTHORITY)?,
            media_source: media_source(row, KIND, col::MEDIA_SOURCE)?,
            loadable_uri: row
                .text(col::LOADABLE_URI)
                .unwrap_or_else(|| media_uri.clone()),
            media_uri,
            date_taken_ms: required_int(row, KIND, col::DATE_TAKEN)?,
            size_bytes: row.int(col::SIZE).unwrap_or(0),
            mime_type: required_text(row, KIND, col::MIME_TYPE)?,
            standard_mime_type_extension: row
                .int(col::STANDARD_MIME_TYPE_EXT)
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(0),
            duration_ms: row.int(col::DURATION),
            is_pre_granted: row.flag(col::IS_PRE_GRANTED).unwrap_or(false),
        })
    }
}

impl From<&Row> for RemoteMediaSet {
    fn from(row: &Row) -> Self {
        RemoteMediaSet {
            media_set_id: row.text(col::MEDIA_SET_ID).filter(|s| !s.is_empty()),
            display_name: row.text(col::DISPLAY_NAME),
            cover_id: row.text(col::COVER_ID),
        }
    }
}

impl TryFrom<&Row> for SearchSuggestion {
    type Error = ProviderError;

    fn try_from(row: &Row) -> Result<Self> {
        const KIND: &str = "search suggestion";
        let suggestion_type: SuggestionType = required_text(row, KIND, col::SUGGESTION_TYPE)?
            .parse()
            .map_err(|_| ProviderError::malformed(KIND, col::SUGGESTION_TYPE))?;
        Ok(SearchSuggestion {
            search_text: row.text(col::SEARCH_TEXT),
            media_set_id: row.text(col::MEDIA_SET_ID),
            authority: row.text(col::AUTHORITY),
            suggestion_type,
            cover_media_id: row.text(col::COVER_MEDIA_ID),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bridge_traits::row::{row_of, RowValue};

    pub(crate) fn media_row(id: &str, picker_id: i64, date_taken_ms: i64, mime: &str) -> Row {
        row_of([
            (col::MEDIA_ID, RowValue::from(id)),
            (col::PICKER_ID, RowValue::Integer(picker_id)),
            (col::AUTHORITY, RowValue::from("local")),
            (col::MEDIA_SOURCE, RowValue::from("LOCAL")),
            (col::MEDIA_URI, RowValue::Text(format!("content://local/{id}"))),
            (col::DATE_TAKEN, RowValue::Integer(date_taken_ms)),
            (col::MIME_TYPE, RowValue::from(mime)),
            (col::DURATION, RowValue::Integer(1_500)),
            (col::IS_PRE_GRANTED, RowValue::Integer(1)),
        ])
    }

    #[test]
    fn test_provider_row() {
        let row = row_of([
            (col::AUTHORITY, RowValue::from("com.example.cloud")),
            (col::MEDIA_SOURCE, RowValue::from("REMOTE")),
            (col::UID, RowValue::Integer(10_123)),
        ]);
        let provider = Provider::try_from(&row).unwrap();
        assert_eq!(provider.media_source, MediaSource::Remote);
        assert_eq!(provider.display_name, "com.example.cloud");
    }

    #[test]
    fn test_provider_row_missing_uid() {
        let row = row_of([
            (col::AUTHORITY, RowValue::from("a")),
            (col::MEDIA_SOURCE, RowValue::from("LOCAL")),
        ]);
        match Provider::try_from(&row) {
            Err(ProviderError::MalformedRow { column, .. }) => assert_eq!(column, col::UID),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_media_row_video_and_defaults() {
        let media = Media::try_from(&media_row("7", 3, 100, "video/mp4")).unwrap();
        assert_eq!(media.duration_ms(), Some(1_500));
        let item = media.item();
        assert_eq!(item.loadable_uri, item.media_uri);
        assert!(item.is_pre_granted);
        assert_eq!(item.size_bytes, 0);
    }

    #[test]
    fn test_media_row_missing_picker_id() {
        let mut row = media_row("7", 3, 100, "image/png");
        row.insert(col::PICKER_ID.to_string(), RowValue::Null);
        assert!(Media::try_from(&row).is_err());
    }

    #[test]
    fn test_media_set_row_keeps_missing_id() {
        let row = row_of([(col::DISPLAY_NAME, RowValue::from("Trips"))]);
        let set = RemoteMediaSet::from(&row);
        assert_eq!(set.media_set_id, None);
        assert_eq!(set.display_name.as_deref(), Some("Trips"));
    }

    #[test]
    fn test_suggestion_row_unknown_type() {
        let row = row_of([(col::SUGGESTION_TYPE, RowValue::from("WEATHER"))]);
        assert!(SearchSuggestion::try_from(&row).is_err());
    }
}
