//! Typed access to a media provider transport.
//!
//! [`RemoteSourceClient`] turns the loosely typed query/call surface of a
//! [`MediaTransport`] into typed records. Malformed rows are skipped with a
//! warning; a batch is never failed because of one bad row.

use crate::columns::{args, methods, queries};
use crate::error::{ProviderError, Result};
use crate::pagination::{Page, PageCursor, PageRequest, SyncPage};
use crate::types::{
    Album, CollectionInfo, Media, MediaSet, MimeTypeFilter, PreviewSelection, Provider,
    RemoteMediaSet, SearchRequest, SearchSuggestion, SyncedMedia,
};
use bridge_traits::row::{Bundle, QueryResult, Row, RowExt, RowValue};
use bridge_traits::transport::{MediaTransport, TransportHandle, UserId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Issues queries and calls against one provider transport.
///
/// # Example
///
/// ```ignore
/// use core_provider::client::RemoteSourceClient;
/// use core_provider::pagination::PageRequest;
///
/// let client = RemoteSourceClient::new(transport);
/// let providers = client.fetch_available_providers().await?;
/// let first = client.fetch_media_page(&providers, PageRequest::first(50)).await?;
/// ```
#[derive(Clone)]
pub struct RemoteSourceClient {
    transport: Arc<dyn MediaTransport>,
}

impl fmt::Debug for RemoteSourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSourceClient")
            .field("handle", &self.transport.handle())
            .finish()
    }
}

fn authorities_arg(providers: &[Provider]) -> RowValue {
    RowValue::TextList(providers.iter().map(|p| p.authority.clone()).collect())
}

fn paging_args(bundle: &mut Bundle, request: &PageRequest) {
    bundle.insert(args::PAGE_SIZE.into(), RowValue::Integer(request.limit()));
    if let Some(cursor) = request.cursor {
        bundle.insert(args::DATE_TAKEN.into(), RowValue::Integer(cursor.date_taken_ms));
        bundle.insert(args::PICKER_ID.into(), RowValue::Integer(cursor.picker_id));
    }
}

/// Parse every row, dropping malformed ones. Returns the parsed records and
/// the number of skipped rows.
fn parse_rows<T>(kind: &'static str, rows: &[Row]) -> (Vec<T>, usize)
where
    T: for<'a> TryFrom<&'a Row, Error = ProviderError>,
{
    let mut skipped = 0;
    let items = rows
        .iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(item) => Some(item),
            Err(e) => {
                skipped += 1;
                warn!(kind, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect();
    (items, skipped)
}

/// A page is full, and so may have a successor, when the provider returned
/// `page_size` rows; skipped rows still count toward that.
fn keyset_page<T, F>(items: Vec<T>, raw_rows: usize, page_size: usize, cursor_of: F) -> Page<T>
where
    F: Fn(&T) -> PageCursor,
{
    let next = if page_size > 0 && raw_rows >= page_size {
        items.last().map(cursor_of)
    } else {
        None
    };
    Page { items, next }
}

fn media_cursor(media: &Media) -> PageCursor {
    PageCursor::new(media.date_taken_ms(), media.picker_id())
}

fn resume_key_of(result: &QueryResult) -> Option<String> {
    result.extras.text(args::RESUME_KEY).filter(|k| !k.is_empty())
}

impl RemoteSourceClient {
    pub fn new(transport: Arc<dyn MediaTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn MediaTransport> {
        &self.transport
    }

    pub fn handle(&self) -> TransportHandle {
        self.transport.handle()
    }

    pub fn user_id(&self) -> UserId {
        self.transport.user_id()
    }

    async fn query(&self, topic: &str, args: Bundle) -> Result<QueryResult> {
        self.transport
            .query(topic, &[], &args)
            .await
            .map_err(ProviderError::from)
    }

    async fn call(&self, method: &str, extras: Bundle) -> Result<Bundle> {
        self.transport
            .call(method, extras)
            .await
            .map_err(ProviderError::from)
    }

    async fn fetch_media_rows(
        &self,
        topic: &str,
        mut bundle: Bundle,
        request: PageRequest,
    ) -> Result<Page<Media>> {
        paging_args(&mut bundle, &request);
        let result = self.query(topic, bundle).await?;
        let (items, _) = parse_rows::<Media>("media", &result.rows);
        Ok(keyset_page(items, result.rows.len(), request.page_size, media_cursor))
    }

    /// Providers the transport currently reports, in transport order.
    #[instrument(skip(self), fields(transport = %self.handle()))]
    pub async fn fetch_available_providers(&self) -> Result<Vec<Provider>> {
        let result = self.query(queries::AVAILABLE_PROVIDERS, Bundle::new()).await?;
        let (providers, skipped) = parse_rows::<Provider>("provider", &result.rows);
        debug!(count = providers.len(), skipped, "Fetched available providers");
        Ok(providers)
    }

    /// Collection info for each of `providers` that reports one.
    #[instrument(skip(self, providers), fields(transport = %self.handle()))]
    pub async fn fetch_collection_info(
        &self,
        providers: &[Provider],
    ) -> Result<Vec<CollectionInfo>> {
        let mut bundle = Bundle::new();
        bundle.insert(args::PROVIDERS.into(), authorities_arg(providers));
        let result = self.query(queries::COLLECTION_INFO, bundle).await?;
        let (infos, _) = parse_rows::<CollectionInfo>("collection info", &result.rows);
        Ok(infos
            .into_iter()
            .filter(|info| providers.iter().any(|p| p.authority == info.authority))
            .collect())
    }

    /// Collection info of one provider; an empty info when it reports none.
    pub async fn fetch_collection_info_for(&self, provider: &Provider) -> Result<CollectionInfo> {
        let infos = self
            .fetch_collection_info(std::slice::from_ref(provider))
            .await?;
        Ok(infos
            .into_iter()
            .next()
            .unwrap_or_else(|| CollectionInfo::empty(provider.authority.clone())))
    }

    /// Ask the providers to bring their media index up to date.
    #[instrument(skip(self, providers), fields(transport = %self.handle()))]
    pub async fn refresh_media(&self, providers: &[Provider]) -> Result<()> {
        let mut extras = Bundle::new();
        extras.insert(args::PROVIDERS.into(), authorities_arg(providers));
        self.call(methods::MEDIA_INIT, extras).await?;
        Ok(())
    }

    /// Ask the album's provider to bring the album content up to date.
    #[instrument(skip(self, album, providers), fields(album = %album.id))]
    pub async fn refresh_album_media(&self, album: &Album, providers: &[Provider]) -> Result<()> {
        let mut extras = Bundle::new();
        extras.insert(args::PROVIDERS.into(), authorities_arg(providers));
        extras.insert(args::ALBUM_ID.into(), RowValue::from(album.id.as_str()));
        extras.insert(
            args::ALBUM_AUTHORITY.into(),
            RowValue::from(album.authority.as_str()),
        );
        self.call(methods::ALBUM_MEDIA_INIT, extras).await?;
        Ok(())
    }

    /// One page of the merged media grid.
    pub async fn fetch_media_page(
        &self,
        providers: &[Provider],
        request: PageRequest,
    ) -> Result<Page<Media>> {
        let mut bundle = Bundle::new();
        bundle.insert(args::PROVIDERS.into(), authorities_arg(providers));
        self.fetch_media_rows(queries::MEDIA, bundle, request).await
    }

    pub async fn fetch_album_page(
        &self,
        providers: &[Provider],
        request: PageRequest,
    ) -> Result<Page<Album>> {
        let mut bundle = Bundle::new();
        bundle.insert(args::PROVIDERS.into(), authorities_arg(providers));
        paging_args(&mut bundle, &request);
        let result = self.query(queries::ALBUM, bundle).await?;
        let (albums, _) = parse_rows::<Album>("album", &result.rows);
        Ok(keyset_page(
            albums,
            result.rows.len(),
            request.page_size,
            |album: &Album| PageCursor::new(album.date_taken_ms, album.picker_id),
        ))
    }

    pub async fn fetch_album_media_page(
        &self,
        album: &Album,
        providers: &[Provider],
        request: PageRequest,
    ) -> Result<Page<Media>> {
        let mut bundle = Bundle::new();
        bundle.insert(args::PROVIDERS.into(), authorities_arg(providers));
        bundle.insert(
            args::ALBUM_AUTHORITY.into(),
            RowValue::from(album.authority.as_str()),
        );
        self.fetch_media_rows(&queries::album_media(&album.id), bundle, request)
            .await
    }

    /// Items for the preview grid given the current selection.
    pub async fn fetch_preview_page(
        &self,
        selection: &PreviewSelection,
        providers: &[Provider],
        request: PageRequest,
    ) -> Result<Page<Media>> {
        let uris = |media: &[Media]| {
            RowValue::TextList(media.iter().map(|m| m.item().media_uri.clone()).collect())
        };
        let mut bundle = Bundle::new();
        bundle.insert(args::PROVIDERS.into(), authorities_arg(providers));
        bundle.insert(args::CURRENT_SELECTION.into(), uris(&selection.selected));
        bundle.insert(args::CURRENT_DESELECTION.into(), uris(&selection.deselected));
        self.fetch_media_rows(queries::PREVIEW, bundle, request).await
    }

    /// Resolve picker URIs back to media records. Unknown URIs are absent
    /// from the result.
    pub async fn fetch_media_for_uris(&self, uris: &[String]) -> Result<Vec<Media>> {
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        let mut bundle = Bundle::new();
        bundle.insert(args::URIS.into(), RowValue::TextList(uris.to_vec()));
        let result = self.query(queries::MEDIA_FOR_URIS, bundle).await?;
        Ok(parse_rows::<Media>("media", &result.rows).0)
    }

    /// Make sure the provider side has initialised its provider list.
    pub async fn ensure_providers(&self) -> Result<()> {
        let mut extras = Bundle::new();
        extras.insert(args::USER_ID.into(), RowValue::Integer(i64::from(self.user_id().0)));
        self.call(methods::ENSURE_PROVIDERS, extras).await?;
        Ok(())
    }

    /// Number of items the calling app already holds grants for.
    pub async fn fetch_pre_granted_count(&self, providers: &[Provider]) -> Result<i64> {
        let mut extras = Bundle::new();
        extras.insert(args::PROVIDERS.into(), authorities_arg(providers));
        let result = self.call(methods::PRE_GRANTED_COUNT, extras).await?;
        result
            .int(args::PRE_GRANTED_COUNT)
            .ok_or_else(|| ProviderError::malformed("pre-granted count", args::PRE_GRANTED_COUNT))
    }

    fn search_args(request: &SearchRequest, bundle: &mut Bundle) {
        if let Some(text) = request.search_text() {
            bundle.insert(args::SEARCH_TEXT.into(), RowValue::from(text));
        }
        if let Some(media_set_id) = request.media_set_id() {
            bundle.insert(args::MEDIA_SET_ID.into(), RowValue::from(media_set_id));
        }
        if let Some(suggestion_type) = request.suggestion_type() {
            bundle.insert(
                args::SUGGESTION_TYPE.into(),
                RowValue::from(suggestion_type.as_str()),
            );
        }
        if !request.mime_types().is_empty() {
            bundle.insert(
                args::MIME_TYPES.into(),
                RowValue::TextList(request.mime_types().patterns().to_vec()),
            );
        }
    }

    /// Tell the providers a search request was recorded under `search_request_id`.
    #[instrument(skip(self, request, providers))]
    pub async fn init_search(
        &self,
        search_request_id: i64,
        request: &SearchRequest,
        providers: &[Provider],
    ) -> Result<()> {
        let mut extras = Bundle::new();
        extras.insert(args::SEARCH_REQUEST_ID.into(), RowValue::Integer(search_request_id));
        extras.insert(args::PROVIDERS.into(), authorities_arg(providers));
        Self::search_args(request, &mut extras);
        self.call(methods::SEARCH_MEDIA_INIT, extras).await?;
        Ok(())
    }

    /// One incremental batch of search results from `authority`.
    #[instrument(skip(self, request))]
    pub async fn fetch_search_results(
        &self,
        request: &SearchRequest,
        search_request_id: i64,
        authority: &str,
        resume_key: Option<&str>,
        page_size: usize,
    ) -> Result<SyncPage<SyncedMedia>> {
        let mut bundle = Bundle::new();
        bundle.insert(args::SEARCH_REQUEST_ID.into(), RowValue::Integer(search_request_id));
        bundle.insert(args::AUTHORITY.into(), RowValue::from(authority));
        bundle.insert(args::PAGE_SIZE.into(), RowValue::Integer(page_size as i64));
        bundle.insert(args::RESUME_KEY.into(), RowValue::from(resume_key));
        Self::search_args(request, &mut bundle);

        let result = self.query(queries::SEARCH_MEDIA, bundle).await?;
        let (items, skipped) = parse_rows::<SyncedMedia>("search result", &result.rows);
        Ok(SyncPage {
            items,
            next_resume_key: resume_key_of(&result),
            skipped,
        })
    }

    /// One batch of media sets in `category_id`.
    #[instrument(skip(self, mime_types))]
    pub async fn fetch_media_sets(
        &self,
        category_id: &str,
        authority: &str,
        mime_types: &MimeTypeFilter,
        resume_key: Option<&str>,
    ) -> Result<SyncPage<RemoteMediaSet>> {
        let mut bundle = Bundle::new();
        bundle.insert(args::CATEGORY_ID.into(), RowValue::from(category_id));
        bundle.insert(args::AUTHORITY.into(), RowValue::from(authority));
        bundle.insert(
            args::MIME_TYPES.into(),
            RowValue::TextList(mime_types.patterns().to_vec()),
        );
        bundle.insert(args::RESUME_KEY.into(), RowValue::from(resume_key));

        let result = self.query(queries::MEDIA_SETS, bundle).await?;
        Ok(SyncPage {
            items: result.rows.iter().map(RemoteMediaSet::from).collect(),
            next_resume_key: resume_key_of(&result),
            skipped: 0,
        })
    }

    /// One batch of a media set's content.
    #[instrument(skip(self, media_set), fields(media_set = media_set.picker_id))]
    pub async fn fetch_media_set_content(
        &self,
        media_set: &MediaSet,
        resume_key: Option<&str>,
        page_size: usize,
    ) -> Result<SyncPage<SyncedMedia>> {
        let mut bundle = Bundle::new();
        bundle.insert(
            args::MEDIA_SET_ID.into(),
            RowValue::from(media_set.media_set_id.as_str()),
        );
        bundle.insert(
            args::AUTHORITY.into(),
            RowValue::from(media_set.authority.as_str()),
        );
        bundle.insert(
            args::MIME_TYPES.into(),
            RowValue::TextList(media_set.mime_type_filter.patterns().to_vec()),
        );
        bundle.insert(args::PAGE_SIZE.into(), RowValue::Integer(page_size as i64));
        bundle.insert(args::RESUME_KEY.into(), RowValue::from(resume_key));

        let result = self.query(queries::MEDIA_SET_CONTENT, bundle).await?;
        let (items, skipped) = parse_rows::<SyncedMedia>("media set content", &result.rows);
        Ok(SyncPage {
            items,
            next_resume_key: resume_key_of(&result),
            skipped,
        })
    }

    /// Suggestions matching `prefix` from the given providers.
    pub async fn fetch_search_suggestions(
        &self,
        prefix: &str,
        limit: usize,
        providers: &[Provider],
    ) -> Result<Vec<SearchSuggestion>> {
        let mut bundle = Bundle::new();
        bundle.insert(args::PREFIX.into(), RowValue::from(prefix));
        bundle.insert(args::LIMIT.into(), RowValue::Integer(limit as i64));
        bundle.insert(args::PROVIDERS.into(), authorities_arg(providers));
        let result = self.query(queries::SEARCH_SUGGESTIONS, bundle).await?;
        let (mut suggestions, _) =
            parse_rows::<SearchSuggestion>("search suggestion", &result.rows);
        suggestions.truncate(limit);
        Ok(suggestions)
    }
}
