//! The picker data layer façade
//!
//! [`DataLayer`] owns every stateful component and keeps them consistent:
//! - provider list changes and transport switches re-point the paging
//!   registry and invalidate its handles
//! - each availability pass refreshes collection info; a provider whose
//!   collection changed has its cached rows dropped
//! - media and album notifications invalidate the matching paging handles

use crate::error::{CoreError, Result};
use bridge_traits::transport::{MediaTransport, UserId};
use bridge_traits::Clock;
use core_library::db::DatabaseConfig;
use core_library::LocalCacheStore;
use core_provider::{
    Album, CollectionInfo, Media, MimeTypeFilter, PreviewSelection, Provider, ProviderRegistry,
    RemoteSourceClient, SearchRequest, SearchSuggestion,
};
use core_runtime::config::{FeatureFlags, PickerConfig};
use core_runtime::events::{AvailabilityEvent, EventBus, EventStream, PickerEvent};
use core_runtime::logging::redact_media_uri;
use core_sync::{
    AvailabilityState, ChangeNotifier, CollectionInfoCache, ContentChange, PagingSource,
    PagingSourceRegistry, SearchSyncWorker, SignalReceiver, StateCell, SyncOutcome,
};
use std::sync::{Arc, Weak};
use core_async::sync::{broadcast, watch, CancellationToken};
use tracing::{debug, info, instrument, warn};

struct Shared {
    registry: ProviderRegistry,
    notifier: Arc<ChangeNotifier>,
    availability: AvailabilityState,
    collection_info: CollectionInfoCache,
    paging: PagingSourceRegistry,
    store: LocalCacheStore,
    search: SearchSyncWorker,
    pre_granted_count: StateCell<i64>,
    events: EventBus,
    features: FeatureFlags,
    suggestion_ttl_ms: i64,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Entry point for hosts. Cloning is cheap; clones share all state.
///
/// # Example
///
/// ```ignore
/// use core_runtime::config::PickerConfig;
/// use core_service::DataLayer;
///
/// let layer = DataLayer::new(config).await?;
/// layer.set_active_transport(transport);
///
/// let mut providers = layer.available_providers();
/// providers.changed().await?;
/// let page = layer.media_paging_source().load(PageRequest::first(100)).await;
/// ```
#[derive(Clone)]
pub struct DataLayer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DataLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("availability", &self.shared.availability)
            .field("paging", &self.shared.paging)
            .field("features", &self.shared.features)
            .finish_non_exhaustive()
    }
}

impl DataLayer {
    /// Open the cache and start background bookkeeping. Must be called
    /// within a Tokio runtime.
    #[instrument(skip(config), fields(local_authority = %config.local_authority))]
    pub async fn new(config: PickerConfig) -> Result<Self> {
        config.validate()?;

        let database = match &config.database_path {
            Some(path) => DatabaseConfig::new(path),
            None => DatabaseConfig::in_memory(),
        };
        let store = LocalCacheStore::open(
            database,
            &config.local_authority,
            Arc::clone(&config.clock),
        )
        .await?;

        let events = EventBus::new(config.event_buffer_size);
        let notifier = Arc::new(ChangeNotifier::new());
        let registry = ProviderRegistry::new(&config);
        let availability = AvailabilityState::new(
            registry.clone(),
            Arc::clone(&notifier),
            events.clone(),
            config.refresh_timeout,
        );

        let shared = Arc::new(Shared {
            paging: PagingSourceRegistry::new(events.clone(), config.refresh_timeout),
            search: SearchSyncWorker::new(store.clone(), events.clone(), config.page_size),
            collection_info: CollectionInfoCache::new(),
            pre_granted_count: StateCell::new(0),
            features: config.features,
            suggestion_ttl_ms: i64::try_from(config.suggestion_ttl.as_millis()).unwrap_or(i64::MAX),
            clock: Arc::clone(&config.clock),
            shutdown: CancellationToken::new(),
            registry,
            notifier,
            availability,
            store,
            events,
        });

        core_async::spawn(run_bookkeeping(
            Arc::downgrade(&shared),
            shared.availability.passes(),
            shared.availability.content_changes(),
            shared.shutdown.clone(),
        ));
        info!("Picker data layer started");
        Ok(Self { shared })
    }

    /// Bind every component to `transport`, typically after a profile
    /// switch.
    pub fn set_active_transport(&self, transport: Arc<dyn MediaTransport>) {
        let shared = &self.shared;
        shared.collection_info.clear();
        shared.availability.set_active_transport(transport);
        // Queries wait for the new transport's own provider list
        let (client, providers) = match shared.availability.client_with_providers() {
            Some((client, providers)) => (Some(client), providers),
            None => (None, Vec::new()),
        };
        shared.paging.set_context(client, providers);
    }

    /// Stop background bookkeeping. Reads keep working on the last state.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    fn client(&self) -> Result<RemoteSourceClient> {
        self.shared
            .availability
            .client()
            .ok_or(CoreError::NoActiveTransport)
    }

    fn require_search(&self) -> Result<()> {
        if self.shared.features.search_enabled {
            Ok(())
        } else {
            Err(CoreError::FeatureDisabled("search"))
        }
    }

    fn available_provider(&self, authority: &str) -> Result<Provider> {
        self.providers()
            .into_iter()
            .find(|p| p.authority == authority)
            .ok_or_else(|| CoreError::ProviderUnavailable(authority.to_string()))
    }

    // ------------------------------------------------------------------
    // Availability
    // ------------------------------------------------------------------

    /// Watch the available providers, local first.
    pub fn available_providers(&self) -> watch::Receiver<Vec<Provider>> {
        self.shared.availability.subscribe()
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.shared.availability.providers()
    }

    /// Fires when a previously available provider disappears.
    pub fn disruptive_data_updates(&self) -> SignalReceiver {
        self.shared.availability.disruptive_data_updates()
    }

    /// Ask for a provider list recomputation.
    pub fn refresh_available_providers(&self) {
        self.shared.availability.refresh();
    }

    /// Wait until every availability recomputation requested so far ran.
    pub async fn settled(&self) {
        self.shared.availability.settled().await;
    }

    /// Installed cloud providers for `user` that the allow-list admits.
    pub async fn get_all_allowed_providers(&self, user: UserId) -> Result<Vec<Provider>> {
        Ok(self.shared.registry.get_all_allowed_providers(user).await?)
    }

    /// Have the provider side initialise its provider list for the active
    /// user.
    pub async fn ensure_providers(&self) -> Result<()> {
        self.client()?.ensure_providers().await?;
        Ok(())
    }

    /// Collection info of `provider`, fetched once and then served from
    /// the cache.
    pub async fn get_collection_info(&self, provider: &Provider) -> Result<CollectionInfo> {
        let client = self.client()?;
        Ok(self
            .shared
            .collection_info
            .get_collection_info(&client, provider)
            .await?)
    }

    // ------------------------------------------------------------------
    // Paging
    // ------------------------------------------------------------------

    pub fn media_paging_source(&self) -> Arc<PagingSource<Media>> {
        self.shared.paging.media_paging_source()
    }

    pub fn album_paging_source(&self) -> Arc<PagingSource<Album>> {
        self.shared.paging.album_paging_source()
    }

    pub fn album_media_paging_source(&self, album: &Album) -> Arc<PagingSource<Media>> {
        self.shared.paging.album_media_paging_source(album)
    }

    pub fn preview_media_paging_source(
        &self,
        selection: PreviewSelection,
    ) -> Arc<PagingSource<Media>> {
        self.shared.paging.preview_media_paging_source(selection)
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    /// Re-read the pre-granted item count from the providers and publish it.
    pub async fn refresh_pre_granted_items_count(&self) -> Result<i64> {
        let count = self
            .client()?
            .fetch_pre_granted_count(&self.providers())
            .await?;
        self.shared.pre_granted_count.set(count);
        Ok(count)
    }

    /// Watch the last pre-granted item count read.
    pub fn pre_granted_items_count(&self) -> watch::Receiver<i64> {
        self.shared.pre_granted_count.subscribe()
    }

    /// Media records for picker URIs; unknown URIs are left out.
    pub async fn fetch_media_data_for_uris(&self, uris: &[String]) -> Result<Vec<Media>> {
        let media = self.client()?.fetch_media_for_uris(uris).await?;
        if media.len() < uris.len() {
            let first_missing = uris
                .iter()
                .find(|uri| !media.iter().any(|m| m.item().media_uri == **uri));
            debug!(
                requested = uris.len(),
                resolved = media.len(),
                first_missing = ?first_missing.map(|uri| redact_media_uri(uri)),
                "Some picker URIs did not resolve"
            );
        }
        Ok(media)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Record `request` with every available provider and return its id.
    pub async fn record_search_request(&self, request: &SearchRequest) -> Result<i64> {
        self.require_search()?;
        let client = self.client()?;
        Ok(self
            .shared
            .search
            .record_search_request(&client, request, &self.providers())
            .await?)
    }

    /// One sync pass of search results from each available provider, in
    /// provider order.
    pub async fn sync_search_results(
        &self,
        search_request_id: i64,
    ) -> Result<Vec<(String, SyncOutcome)>> {
        self.require_search()?;
        let client = self.client()?;
        let mut outcomes = Vec::new();
        for provider in self.providers() {
            let outcome = self
                .shared
                .search
                .sync_search_results(&client, search_request_id, &provider)
                .await?;
            outcomes.push((provider.authority, outcome));
        }
        Ok(outcomes)
    }

    pub async fn sync_media_sets(
        &self,
        category_id: &str,
        authority: &str,
        mime_types: &MimeTypeFilter,
    ) -> Result<u64> {
        self.require_search()?;
        let client = self.client()?;
        let provider = self.available_provider(authority)?;
        Ok(self
            .shared
            .search
            .sync_media_sets(&client, category_id, &provider, mime_types)
            .await?)
    }

    pub async fn sync_media_in_media_set(&self, media_set_picker_id: i64) -> Result<SyncOutcome> {
        self.require_search()?;
        let client = self.client()?;
        Ok(self
            .shared
            .search
            .sync_media_in_media_set(&client, media_set_picker_id)
            .await?)
    }

    /// Suggestions for `prefix`. Expired cached suggestions are pruned
    /// first.
    pub async fn search_suggestions(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<SearchSuggestion>> {
        self.require_search()?;
        let client = self.client()?;
        let cutoff = self
            .shared
            .clock
            .unix_timestamp_millis()
            .saturating_sub(self.shared.suggestion_ttl_ms);
        let pruned = self
            .shared
            .store
            .suggestions()
            .clear_expired_suggestions(cutoff)
            .await?;
        if pruned > 0 {
            debug!(pruned, "Pruned expired suggestions");
        }
        Ok(self
            .shared
            .search
            .search_suggestions(&client, prefix, limit, &self.providers())
            .await?)
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    pub fn cache_store(&self) -> &LocalCacheStore {
        &self.shared.store
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.shared.events.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.shared.events
    }

    /// Transport observers currently registered
    pub fn observer_count(&self) -> usize {
        self.shared.notifier.observer_count()
    }
}

impl Shared {
    /// Re-point paging when the transport or provider list moved, then
    /// reconcile collection info.
    async fn on_availability_pass(&self) {
        let Some((client, providers)) = self.availability.client_with_providers() else {
            return;
        };

        let context = self.paging.context();
        let same_transport = context
            .client
            .as_ref()
            .is_some_and(|c| c.handle() == client.handle());
        if !same_transport || context.providers != providers {
            debug!(providers = providers.len(), "Re-pointing paging sources");
            self.paging.set_context(Some(client.clone()), providers.clone());
        }

        if providers.is_empty() {
            return;
        }
        if let Err(e) = self.reconcile_collections(&client, &providers).await {
            warn!(error = %e, "Collection info refresh failed");
        }
    }

    async fn reconcile_collections(
        &self,
        client: &RemoteSourceClient,
        providers: &[Provider],
    ) -> Result<()> {
        let infos = client.fetch_collection_info(providers).await?;
        for reset in self.collection_info.update_collection_info(infos) {
            let removed = self.store.clear_provider_data(&reset.authority).await?;
            info!(authority = %reset.authority, removed, "Dropped cache of reset collection");
            self.paging.invalidate_all();
            self.events
                .emit(PickerEvent::Availability(AvailabilityEvent::CollectionReset {
                    authority: reset.authority,
                }))
                .ok();
        }
        Ok(())
    }
}

async fn run_bookkeeping(
    shared: Weak<Shared>,
    mut passes: watch::Receiver<u64>,
    mut changes: broadcast::Receiver<ContentChange>,
    shutdown: CancellationToken,
) {
    loop {
        core_async::select! {
            _ = shutdown.cancelled() => break,
            pass = passes.changed() => {
                if pass.is_err() {
                    break;
                }
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.on_availability_pass().await;
            }
            change = changes.recv() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                match change {
                    Ok(change) => {
                        let invalidated = shared.paging.apply(&change);
                        debug!(?change, invalidated, "Applied content change");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed content changes; invalidating all paging sources");
                        shared.paging.invalidate_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    debug!("Bookkeeping stopped");
}
