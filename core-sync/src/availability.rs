//! Reactive provider availability
//!
//! [`AvailabilityState`] publishes the ordered list of providers the picker
//! may show. A single worker task recomputes it whenever a trigger fires:
//! a transport switch, a notification on the available-providers topic or
//! an explicit [`AvailabilityState::refresh`]. Triggers that arrive while a
//! recomputation runs collapse into one follow-up pass.
//!
//! Switching transports cancels the running pass and bumps a generation
//! counter; a pass that completes for an older generation is dropped.

use crate::error::{Result, SyncError};
use crate::notifier::{ChangeCallback, ChangeNotifier, SubscriptionId};
use crate::state::{ConflatedSignal, SignalReceiver, StateCell};
use bridge_traits::transport::{MediaTransport, UserId};
use core_provider::columns::topics;
use core_provider::{Provider, ProviderRegistry, RemoteSourceClient};
use core_runtime::events::{AvailabilityEvent, EventBus, PickerEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use core_async::sync::{broadcast, watch, CancellationToken};
use core_async::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const CONTENT_CHANGE_BUFFER: usize = 64;

/// A content notification re-published for downstream invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentChange {
    /// Something in the merged media grid changed
    Media,
    /// The album list changed
    Albums,
    /// The content of one album changed
    AlbumMedia { authority: String, album_id: String },
}

impl ContentChange {
    /// Classify a URI delivered on the album topic.
    pub fn from_album_uri(uri: &str) -> Self {
        match topics::parse_album_media_update(uri) {
            Some((authority, album_id)) => ContentChange::AlbumMedia {
                authority,
                album_id,
            },
            None => ContentChange::Albums,
        }
    }
}

/// Transport everything is currently bound to
struct ActiveTransport {
    client: RemoteSourceClient,
    generation: u64,
    cancel: CancellationToken,
    subscriptions: Vec<SubscriptionId>,
    /// A pass for this transport has published its provider list
    published: bool,
}

struct Inner {
    registry: ProviderRegistry,
    notifier: Arc<ChangeNotifier>,
    events: EventBus,
    refresh_timeout: Duration,
    providers: StateCell<Vec<Provider>>,
    disruptive: ConflatedSignal,
    content_changes: broadcast::Sender<ContentChange>,
    active: Mutex<Option<ActiveTransport>>,
    generation: AtomicU64,
    /// Bumped per trigger; the worker coalesces pending bumps
    requested: watch::Sender<u64>,
    /// Last request value a finished pass covered
    completed: watch::Sender<u64>,
}

/// Observable list of available providers.
pub struct AvailabilityState {
    inner: Arc<Inner>,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for AvailabilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityState")
            .field("providers", &self.inner.providers.get().len())
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .finish()
    }
}

impl AvailabilityState {
    /// Start the recomputation worker. Must be called within a Tokio runtime.
    ///
    /// Nothing is published until a transport is set.
    pub fn new(
        registry: ProviderRegistry,
        notifier: Arc<ChangeNotifier>,
        events: EventBus,
        refresh_timeout: Duration,
    ) -> Self {
        let (requested, trigger) = watch::channel(0);
        let (completed, _) = watch::channel(0);
        let (content_changes, _) = broadcast::channel(CONTENT_CHANGE_BUFFER);

        let inner = Arc::new(Inner {
            registry,
            notifier,
            events,
            refresh_timeout,
            providers: StateCell::new(Vec::new()),
            disruptive: ConflatedSignal::new(),
            content_changes,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            requested,
            completed,
        });
        let worker = core_async::spawn(run_worker(Arc::downgrade(&inner), trigger));
        Self { inner, worker }
    }

    /// Current providers, local first
    pub fn providers(&self) -> Vec<Provider> {
        self.inner.providers.get()
    }

    /// Watch the provider list. Only real changes wake the receiver.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Provider>> {
        self.inner.providers.subscribe()
    }

    /// Fires once per recomputation that removed a provider. New receivers
    /// only see future fires.
    pub fn disruptive_data_updates(&self) -> SignalReceiver {
        self.inner.disruptive.subscribe()
    }

    /// Media and album notifications of the active transport
    pub fn content_changes(&self) -> broadcast::Receiver<ContentChange> {
        self.inner.content_changes.subscribe()
    }

    /// Client for the active transport
    pub fn client(&self) -> Option<RemoteSourceClient> {
        self.inner.lock_active().as_ref().map(|a| a.client.clone())
    }

    /// Active client paired with the provider list computed for it.
    ///
    /// Right after a transport switch the published list still belongs to
    /// the previous transport, so the list is empty until a pass for the
    /// new transport publishes.
    pub fn client_with_providers(&self) -> Option<(RemoteSourceClient, Vec<Provider>)> {
        let active = self.inner.lock_active();
        active.as_ref().map(|a| {
            let providers = if a.published {
                self.inner.providers.get()
            } else {
                Vec::new()
            };
            (a.client.clone(), providers)
        })
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Bind to `transport`, replacing any previous one.
    ///
    /// Observers on the old transport are released and the three picker
    /// topics are observed on the new one before the recomputation that
    /// this switch triggers starts. In-flight work for the old transport is
    /// cancelled.
    #[instrument(skip(self, transport), fields(handle = %transport.handle(), user = %transport.user_id()))]
    pub fn set_active_transport(&self, transport: Arc<dyn MediaTransport>) {
        let inner = &self.inner;
        let user = transport.user_id();
        {
            let mut active = inner.lock_active();
            if let Some(old) = active.take() {
                old.cancel.cancel();
                for id in old.subscriptions {
                    inner.notifier.unsubscribe(id);
                }
                debug!(old_generation = old.generation, "Released previous transport");
            }

            let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let subscriptions = self.observe_topics(&transport);
            *active = Some(ActiveTransport {
                client: RemoteSourceClient::new(transport),
                generation,
                cancel: CancellationToken::new(),
                subscriptions,
                published: false,
            });
            info!(generation, "Active transport changed");
        }

        inner
            .events
            .emit(PickerEvent::Availability(AvailabilityEvent::ProfileChanged {
                user_id: user.0,
            }))
            .ok();
        inner.trigger();
    }

    fn observe_topics(&self, transport: &Arc<dyn MediaTransport>) -> Vec<SubscriptionId> {
        let weak = Arc::downgrade(&self.inner);
        let on_providers: ChangeCallback = {
            let weak = weak.clone();
            Arc::new(move |_uri: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.trigger();
                }
            })
        };
        let on_media: ChangeCallback = {
            let weak = weak.clone();
            Arc::new(move |_uri: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.publish(ContentChange::Media);
                }
            })
        };
        let on_album: ChangeCallback = Arc::new(move |uri: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.publish(ContentChange::from_album_uri(uri));
            }
        });

        [
            (topics::AVAILABLE_PROVIDERS_UPDATE, false, on_providers),
            (topics::MEDIA_UPDATE, false, on_media),
            (topics::ALBUM_UPDATE, true, on_album),
        ]
        .into_iter()
        .filter_map(|(topic, recursive, callback)| {
            match self
                .inner
                .notifier
                .subscribe(transport, topic, recursive, callback)
            {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(topic, error = %e, "Failed to observe topic");
                    None
                }
            }
        })
        .collect()
    }

    /// Request a recomputation
    pub fn refresh(&self) {
        self.inner.trigger();
    }

    /// Wait until every trigger issued so far has been processed.
    pub async fn settled(&self) {
        let target = *self.inner.requested.borrow();
        let mut completed = self.inner.completed.subscribe();
        // Only fails if the worker's state is gone, which outlives `self`
        let _ = completed.wait_for(|done| *done >= target).await;
    }

    /// Wakes after every finished recomputation pass, failed ones included.
    pub fn passes(&self) -> watch::Receiver<u64> {
        self.inner.completed.subscribe()
    }

    /// Active user profile, if a transport is set
    pub fn user_id(&self) -> Option<UserId> {
        self.client().map(|c| c.user_id())
    }
}

impl Drop for AvailabilityState {
    fn drop(&mut self) {
        self.worker.abort();
        if let Some(active) = self.inner.lock_active().take() {
            active.cancel.cancel();
            for id in active.subscriptions {
                self.inner.notifier.unsubscribe(id);
            }
        }
    }
}

impl Inner {
    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveTransport>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trigger(&self) {
        self.requested.send_modify(|n| *n += 1);
    }

    fn publish(&self, change: ContentChange) {
        debug!(?change, "Content changed");
        // No receivers is fine
        let _ = self.content_changes.send(change);
    }

    fn snapshot(&self) -> Option<(RemoteSourceClient, u64, CancellationToken)> {
        self.lock_active()
            .as_ref()
            .map(|a| (a.client.clone(), a.generation, a.cancel.clone()))
    }

    async fn recompute(&self) -> Result<()> {
        let Some((client, generation, cancel)) = self.snapshot() else {
            return Ok(());
        };

        let fetched = core_async::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            fetched = core_async::timeout(self.refresh_timeout, client.fetch_available_providers()) => fetched,
        };
        let raw = fetched
            .map_err(|_| SyncError::Timeout(self.refresh_timeout.as_millis() as u64))??;

        if self.apply_if_current(generation, self.registry.filter_available(raw)) {
            Ok(())
        } else {
            Err(SyncError::Cancelled)
        }
    }

    /// Publish `providers` unless the transport of `generation` was replaced.
    ///
    /// The check and the publish happen under the `active` lock, which a
    /// transport switch also holds while it bumps the generation.
    fn apply_if_current(&self, generation: u64, providers: Vec<Provider>) -> bool {
        let mut active = self.lock_active();
        match active.as_mut() {
            Some(a) if a.generation == generation => a.published = true,
            _ => return false,
        }
        self.apply(providers);
        true
    }

    fn apply(&self, providers: Vec<Provider>) {
        let previous = self.providers.get();
        if !self.providers.set(providers.clone()) {
            debug!("Available providers unchanged");
            return;
        }

        let authorities: Vec<String> = providers.iter().map(|p| p.authority.clone()).collect();
        info!(?authorities, "Available providers changed");
        self.events
            .emit(PickerEvent::Availability(AvailabilityEvent::ProvidersChanged {
                authorities: authorities.clone(),
            }))
            .ok();

        let current: HashSet<&str> = authorities.iter().map(String::as_str).collect();
        let removed: Vec<String> = previous
            .into_iter()
            .map(|p| p.authority)
            .filter(|a| !current.contains(a.as_str()))
            .collect();
        if !removed.is_empty() {
            info!(?removed, "Disruptive data update");
            self.disruptive.fire();
            self.events
                .emit(PickerEvent::Availability(AvailabilityEvent::DisruptiveUpdate {
                    removed,
                }))
                .ok();
        }
    }
}

async fn run_worker(inner: Weak<Inner>, mut trigger: watch::Receiver<u64>) {
    while trigger.changed().await.is_ok() {
        let request = *trigger.borrow_and_update();
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match inner.recompute().await {
            Ok(()) => {}
            Err(SyncError::Cancelled) => debug!("Discarded recomputation for a replaced transport"),
            Err(e) => {
                warn!(error = %e, "Provider availability refresh failed; keeping previous list");
                inner
                    .events
                    .emit(PickerEvent::Availability(AvailabilityEvent::RefreshFailed {
                        message: e.to_string(),
                    }))
                    .ok();
            }
        }
        inner.completed.send_modify(|done| *done = (*done).max(request));
    }
}
