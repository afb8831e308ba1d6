//! Paging source handles and their single-flight registry
//!
//! A [`PagingSource`] serves keyset pages for one query. Its lifecycle is
//! `Uninitialized -> Refreshing -> Valid -> Invalid`: the first load asks
//! the providers to refresh (at most once per handle), and any invalidation
//! is final. The [`PagingSourceRegistry`] hands out the same handle for a
//! key until that handle is invalidated, then builds a fresh one on the
//! next request.

use crate::error::{Result, SyncError};
use crate::keyed_lock::KeyedMutex;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use core_provider::{
    Album, Media, Page, PageRequest, PreviewSelection, Provider, RemoteSourceClient,
};
use core_runtime::events::{EventBus, PagingEvent, PickerEvent};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use core_async::sync::{CancellationToken, OnceCell};
use tracing::{debug, warn};

use crate::availability::ContentChange;

/// What a paging source lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PagingKey {
    Media,
    Albums,
    AlbumMedia { authority: String, album_id: String },
    Preview,
}

impl PagingKey {
    fn is_album_media(&self) -> bool {
        matches!(self, PagingKey::AlbumMedia { .. })
    }
}

impl fmt::Display for PagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PagingKey::Media => write!(f, "media"),
            PagingKey::Albums => write!(f, "albums"),
            PagingKey::AlbumMedia {
                authority,
                album_id,
            } => write!(f, "album_media/{authority}/{album_id}"),
            PagingKey::Preview => write!(f, "preview"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingState {
    Uninitialized,
    Refreshing,
    Valid,
    Invalid,
}

/// Outcome of [`PagingSource::load`]
#[derive(Debug)]
pub enum LoadResult<T> {
    Page(Page<T>),
    /// The handle was invalidated; request a new one from the registry
    Invalid,
    Error(SyncError),
}

impl<T> LoadResult<T> {
    pub fn into_page(self) -> Option<Page<T>> {
        match self {
            LoadResult::Page(page) => Some(page),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, LoadResult::Invalid)
    }
}

/// Fetches the data behind a paging source
#[async_trait]
pub trait PageLoader<T>: Send + Sync {
    /// Ask the providers to bring their data up to date
    async fn refresh(&self) -> Result<()>;

    async fn load(&self, request: PageRequest) -> Result<Page<T>>;
}

/// Transport and providers a generation of handles reads from.
#[derive(Debug, Clone, Default)]
pub struct PagingContext {
    pub client: Option<RemoteSourceClient>,
    pub providers: Vec<Provider>,
}

impl PagingContext {
    fn client(&self) -> Result<&RemoteSourceClient> {
        self.client.as_ref().ok_or(SyncError::NotFound {
            entity_type: "transport",
            id: "active".to_string(),
        })
    }
}

struct MediaLoader(Arc<PagingContext>);

#[async_trait]
impl PageLoader<Media> for MediaLoader {
    async fn refresh(&self) -> Result<()> {
        Ok(self.0.client()?.refresh_media(&self.0.providers).await?)
    }

    async fn load(&self, request: PageRequest) -> Result<Page<Media>> {
        Ok(self
            .0
            .client()?
            .fetch_media_page(&self.0.providers, request)
            .await?)
    }
}

struct AlbumLoader(Arc<PagingContext>);

#[async_trait]
impl PageLoader<Album> for AlbumLoader {
    async fn refresh(&self) -> Result<()> {
        Ok(self.0.client()?.refresh_media(&self.0.providers).await?)
    }

    async fn load(&self, request: PageRequest) -> Result<Page<Album>> {
        Ok(self
            .0
            .client()?
            .fetch_album_page(&self.0.providers, request)
            .await?)
    }
}

struct AlbumMediaLoader {
    context: Arc<PagingContext>,
    album: Album,
}

#[async_trait]
impl PageLoader<Media> for AlbumMediaLoader {
    async fn refresh(&self) -> Result<()> {
        let client = self.context.client()?;
        Ok(client
            .refresh_album_media(&self.album, &self.context.providers)
            .await?)
    }

    async fn load(&self, request: PageRequest) -> Result<Page<Media>> {
        let client = self.context.client()?;
        Ok(client
            .fetch_album_media_page(&self.album, &self.context.providers, request)
            .await?)
    }
}

struct PreviewLoader {
    context: Arc<PagingContext>,
    selection: PreviewSelection,
}

#[async_trait]
impl PageLoader<Media> for PreviewLoader {
    /// Preview only shows items that were already loaded
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self, request: PageRequest) -> Result<Page<Media>> {
        let client = self.context.client()?;
        Ok(client
            .fetch_preview_page(&self.selection, &self.context.providers, request)
            .await?)
    }
}

/// A single-use, invalidatable page source.
pub struct PagingSource<T> {
    id: u64,
    key: PagingKey,
    loader: Box<dyn PageLoader<T>>,
    state: Mutex<PagingState>,
    refreshed: OnceCell<()>,
    invalidated: CancellationToken,
    refresh_locks: Arc<KeyedMutex<PagingKey>>,
    refresh_timeout: Duration,
    events: EventBus,
}

impl<T> fmt::Debug for PagingSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagingSource")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

impl<T> PagingSource<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &PagingKey {
        &self.key
    }

    pub fn state(&self) -> PagingState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_invalid(&self) -> bool {
        self.state() == PagingState::Invalid
    }

    /// Move to `next` unless already invalid
    fn transition(&self, next: PagingState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == PagingState::Invalid {
            return false;
        }
        *state = next;
        true
    }

    /// Mark the handle invalid. Only the first call has an effect.
    pub fn invalidate(&self) -> bool {
        if !self.transition(PagingState::Invalid) {
            return false;
        }
        self.invalidated.cancel();
        debug!(key = %self.key, id = self.id, "Paging source invalidated");
        self.events
            .emit(PickerEvent::Paging(PagingEvent::Invalidated {
                key: self.key.to_string(),
                handle_id: self.id,
            }))
            .ok();
        true
    }

    /// Resolves once the handle is invalid
    pub async fn invalidated(&self) {
        self.invalidated.cancelled().await
    }

    async fn ensure_refreshed(&self) {
        self.refreshed
            .get_or_init(|| async {
                let _guard = self.refresh_locks.lock(self.key.clone()).await;
                if !self.transition(PagingState::Refreshing) {
                    return;
                }

                let outcome = core_async::timeout(self.refresh_timeout, self.loader.refresh())
                    .await
                    .unwrap_or_else(|_| {
                        Err(SyncError::Timeout(self.refresh_timeout.as_millis() as u64))
                    });
                if let Err(e) = outcome {
                    warn!(key = %self.key, error = %e, "Paging refresh failed; serving cached data");
                    self.events
                        .emit(PickerEvent::Paging(PagingEvent::RefreshFailed {
                            key: self.key.to_string(),
                            message: e.to_string(),
                        }))
                        .ok();
                }
                self.transition(PagingState::Valid);
            })
            .await;
    }

    /// Load one page, refreshing first if this is the handle's first load.
    pub async fn load(&self, request: PageRequest) -> LoadResult<T> {
        if self.is_invalid() {
            return LoadResult::Invalid;
        }
        self.ensure_refreshed().await;

        let result = self.loader.load(request).await;
        if self.is_invalid() {
            return LoadResult::Invalid;
        }
        match result {
            Ok(page) => LoadResult::Page(page),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Page load failed");
                LoadResult::Error(e)
            }
        }
    }
}

enum CachedSource {
    Media(Arc<PagingSource<Media>>),
    Albums(Arc<PagingSource<Album>>),
    Preview(Arc<PagingSource<Media>>, PreviewSelection),
}

impl CachedSource {
    fn invalidate(&self) -> bool {
        match self {
            CachedSource::Media(source) | CachedSource::Preview(source, _) => source.invalidate(),
            CachedSource::Albums(source) => source.invalidate(),
        }
    }
}

/// Hands out paging sources, one live handle per key.
pub struct PagingSourceRegistry {
    context: ArcSwap<PagingContext>,
    sources: Mutex<HashMap<PagingKey, CachedSource>>,
    refresh_locks: Arc<KeyedMutex<PagingKey>>,
    next_id: AtomicU64,
    refresh_timeout: Duration,
    events: EventBus,
}

impl fmt::Debug for PagingSourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagingSourceRegistry")
            .field("cached", &self.cached_count())
            .finish()
    }
}

impl PagingSourceRegistry {
    pub fn new(events: EventBus, refresh_timeout: Duration) -> Self {
        Self {
            context: ArcSwap::from_pointee(PagingContext::default()),
            sources: Mutex::new(HashMap::new()),
            refresh_locks: Arc::new(KeyedMutex::new()),
            next_id: AtomicU64::new(1),
            refresh_timeout,
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PagingKey, CachedSource>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build<T>(&self, key: PagingKey, loader: Box<dyn PageLoader<T>>) -> Arc<PagingSource<T>> {
        Arc::new(PagingSource {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            key,
            loader,
            state: Mutex::new(PagingState::Uninitialized),
            refreshed: OnceCell::new(),
            invalidated: CancellationToken::new(),
            refresh_locks: Arc::clone(&self.refresh_locks),
            refresh_timeout: self.refresh_timeout,
            events: self.events.clone(),
        })
    }

    /// Point future handles at a new transport and provider list, and
    /// invalidate every existing handle.
    pub fn set_context(&self, client: Option<RemoteSourceClient>, providers: Vec<Provider>) {
        self.context
            .store(Arc::new(PagingContext { client, providers }));
        self.invalidate_all();
    }

    pub fn context(&self) -> Arc<PagingContext> {
        self.context.load_full()
    }

    fn media_source<F>(&self, key: PagingKey, make: F) -> Arc<PagingSource<Media>>
    where
        F: FnOnce(Arc<PagingContext>) -> Box<dyn PageLoader<Media>>,
    {
        let mut sources = self.lock();
        if let Some(CachedSource::Media(source)) = sources.get(&key) {
            if !source.is_invalid() {
                return Arc::clone(source);
            }
        }
        let source = self.build(key.clone(), make(self.context.load_full()));
        sources.insert(key, CachedSource::Media(Arc::clone(&source)));
        source
    }

    /// The merged media grid
    pub fn media_paging_source(&self) -> Arc<PagingSource<Media>> {
        self.media_source(PagingKey::Media, |context| Box::new(MediaLoader(context)))
    }

    pub fn album_paging_source(&self) -> Arc<PagingSource<Album>> {
        let mut sources = self.lock();
        if let Some(CachedSource::Albums(source)) = sources.get(&PagingKey::Albums) {
            if !source.is_invalid() {
                return Arc::clone(source);
            }
        }
        let source = self.build(
            PagingKey::Albums,
            Box::new(AlbumLoader(self.context.load_full())),
        );
        sources.insert(PagingKey::Albums, CachedSource::Albums(Arc::clone(&source)));
        source
    }

    pub fn album_media_paging_source(&self, album: &Album) -> Arc<PagingSource<Media>> {
        let key = PagingKey::AlbumMedia {
            authority: album.authority.clone(),
            album_id: album.id.clone(),
        };
        let album = album.clone();
        self.media_source(key, move |context| {
            Box::new(AlbumMediaLoader { context, album })
        })
    }

    /// Preview grid for `selection`.
    ///
    /// One preview handle is live at a time; asking for a different
    /// selection invalidates the previous handle.
    pub fn preview_media_paging_source(
        &self,
        selection: PreviewSelection,
    ) -> Arc<PagingSource<Media>> {
        let mut sources = self.lock();
        if let Some(CachedSource::Preview(source, cached)) = sources.get(&PagingKey::Preview) {
            if !source.is_invalid() && *cached == selection {
                return Arc::clone(source);
            }
            source.invalidate();
        }
        let loader = PreviewLoader {
            context: self.context.load_full(),
            selection: selection.clone(),
        };
        let source = self.build(PagingKey::Preview, Box::new(loader));
        sources.insert(
            PagingKey::Preview,
            CachedSource::Preview(Arc::clone(&source), selection),
        );
        source
    }

    /// Invalidate and evict every handle whose key matches.
    fn invalidate_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&PagingKey) -> bool,
    {
        let mut invalidated = 0;
        self.lock().retain(|key, source| {
            if predicate(key) {
                if source.invalidate() {
                    invalidated += 1;
                }
                false
            } else {
                true
            }
        });
        invalidated
    }

    pub fn invalidate_all(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    /// Everything except per-album content
    pub fn on_media_update(&self) -> usize {
        self.invalidate_where(|key| !key.is_album_media())
    }

    /// The album list and every album's content
    pub fn on_albums_update(&self) -> usize {
        self.invalidate_where(|key| key.is_album_media() || *key == PagingKey::Albums)
    }

    pub fn on_album_media_update(&self, authority: &str, album_id: &str) -> usize {
        self.invalidate_where(|key| {
            matches!(key, PagingKey::AlbumMedia { authority: a, album_id: id }
                if a == authority && id == album_id)
        })
    }

    /// Route a content notification to the matching invalidation
    pub fn apply(&self, change: &ContentChange) -> usize {
        match change {
            ContentChange::Media => self.on_media_update(),
            ContentChange::Albums => self.on_albums_update(),
            ContentChange::AlbumMedia {
                authority,
                album_id,
            } => self.on_album_media_update(authority, album_id),
        }
    }

    /// Live handles currently cached
    pub fn cached_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_local::InProcessTransport;
    use bridge_traits::transport::UserId;
    use core_provider::columns::methods;
    use core_provider::MediaSource;

    fn album(id: &str) -> Album {
        Album {
            id: id.to_string(),
            picker_id: 1,
            authority: "cloud.a".to_string(),
            date_taken_ms: 0,
            display_name: id.to_string(),
            cover_uri: None,
            cover_media_source: MediaSource::Remote,
        }
    }

    fn registry() -> (Arc<InProcessTransport>, PagingSourceRegistry) {
        let transport = Arc::new(InProcessTransport::new(UserId(0)));
        let registry = PagingSourceRegistry::new(EventBus::new(16), Duration::from_secs(1));
        registry.set_context(Some(RemoteSourceClient::new(transport.clone())), Vec::new());
        (transport, registry)
    }

    #[tokio::test]
    async fn test_same_handle_until_invalidated() {
        let (_, registry) = registry();
        let first = registry.media_paging_source();
        let again = registry.media_paging_source();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.state(), PagingState::Uninitialized);

        assert!(first.invalidate());
        assert!(!first.invalidate());
        assert!(first.is_invalid());
        assert!(first.load(PageRequest::first(10)).await.is_invalid());

        let fresh = registry.media_paging_source();
        assert_ne!(fresh.id(), first.id());
        assert!(first.is_invalid());
    }

    #[tokio::test]
    async fn test_refresh_once_per_handle() {
        let (transport, registry) = registry();
        let source = registry.media_paging_source();

        let (a, b) = tokio::join!(
            source.load(PageRequest::first(10)),
            source.load(PageRequest::first(10))
        );
        assert!(a.into_page().is_some());
        assert!(b.into_page().is_some());
        assert_eq!(transport.call_count(methods::MEDIA_INIT), 1);
        assert_eq!(source.state(), PagingState::Valid);

        registry.invalidate_all();
        registry
            .media_paging_source()
            .load(PageRequest::first(10))
            .await;
        assert_eq!(transport.call_count(methods::MEDIA_INIT), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_serves_empty_page() {
        let (transport, registry) = registry();
        transport.set_unavailable(true);
        let source = registry.album_paging_source();

        // The refresh fails and is swallowed; the load then fails on its own
        let result = source.load(PageRequest::first(10)).await;
        assert!(matches!(result, LoadResult::Error(_)));
        assert_eq!(source.state(), PagingState::Valid);

        transport.set_unavailable(false);
        let page = source.load(PageRequest::first(10)).await.into_page().unwrap();
        assert!(page.items.is_empty());
        // No second refresh for the same handle
        assert_eq!(transport.call_count(methods::MEDIA_INIT), 1);
    }

    #[tokio::test]
    async fn test_album_update_only_hits_that_album() {
        let (_, registry) = registry();
        let media = registry.media_paging_source();
        let one = registry.album_media_paging_source(&album("1"));
        let two = registry.album_media_paging_source(&album("2"));

        assert_eq!(registry.on_album_media_update("cloud.a", "1"), 1);
        assert!(one.is_invalid());
        assert!(!two.is_invalid());
        assert!(!media.is_invalid());
    }

    #[tokio::test]
    async fn test_media_update_spares_album_content() {
        let (_, registry) = registry();
        let media = registry.media_paging_source();
        let albums = registry.album_paging_source();
        let content = registry.album_media_paging_source(&album("1"));

        registry.apply(&ContentChange::Media);
        assert!(media.is_invalid());
        assert!(albums.is_invalid());
        assert!(!content.is_invalid());
        assert_eq!(registry.cached_count(), 1);
    }

    #[tokio::test]
    async fn test_preview_follows_selection() {
        let (_, registry) = registry();
        let empty = registry.preview_media_paging_source(PreviewSelection::default());
        let same = registry.preview_media_paging_source(PreviewSelection::default());
        assert!(Arc::ptr_eq(&empty, &same));

        let deselected = Media::Image(core_provider::MediaItem {
            media_id: "1".to_string(),
            picker_id: 1,
            authority: "local".to_string(),
            media_source: MediaSource::Local,
            media_uri: "content://local/1".to_string(),
            loadable_uri: "content://local/1".to_string(),
            date_taken_ms: 0,
            size_bytes: 0,
            mime_type: "image/jpeg".to_string(),
            standard_mime_type_extension: 0,
            is_pre_granted: true,
        });
        let other = registry.preview_media_paging_source(PreviewSelection::new(
            Vec::new(),
            vec![deselected],
        ));
        assert!(empty.is_invalid());
        assert!(!other.is_invalid());
    }

    #[tokio::test]
    async fn test_invalidation_wakes_waiters() {
        let (_, registry) = registry();
        let source = registry.media_paging_source();
        let waiter = {
            let source = Arc::clone(&source);
            tokio::spawn(async move { source.invalidated().await })
        };
        registry.invalidate_all();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
