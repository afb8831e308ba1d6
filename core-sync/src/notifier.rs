//! Change notification fan-out
//!
//! Many subscribers may watch the same topic on the same transport. The
//! notifier registers one transport observer per `(handle, topic, recursive)`
//! key and fans its notifications out to every subscriber of that key from a
//! dedicated dispatcher task, so callbacks for one key run in arrival order
//! and never on the transport's own thread.

use crate::error::Result;
use bridge_traits::transport::{ChangeObserver, MediaTransport, ObserverId, TransportHandle};
use core_provider::ProviderError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use core_async::sync::mpsc;
use tracing::{debug, instrument, trace};

/// Invoked with the notified URI
pub type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Returned by [`ChangeNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ObserverKey {
    handle: TransportHandle,
    topic: String,
    recursive: bool,
}

type Subscribers = Arc<Mutex<Vec<(SubscriptionId, ChangeCallback)>>>;

struct Registration {
    transport: Arc<dyn MediaTransport>,
    observer_id: ObserverId,
    subscribers: Subscribers,
}

#[derive(Default)]
struct State {
    next_id: u64,
    registrations: HashMap<ObserverKey, Registration>,
    index: HashMap<SubscriptionId, ObserverKey>,
}

/// Forwards transport callbacks into the key's dispatcher queue
struct Forwarder {
    sender: mpsc::UnboundedSender<String>,
}

impl ChangeObserver for Forwarder {
    fn on_change(&self, uri: &str) {
        // The dispatcher is gone once the key is released
        let _ = self.sender.send(uri.to_string());
    }
}

/// Topic-keyed multimap of change callbacks scoped to transport handles.
#[derive(Default)]
pub struct ChangeNotifier {
    state: Mutex<State>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ChangeNotifier")
            .field("observers", &state.registrations.len())
            .field("subscriptions", &state.index.len())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call `callback` for every notification on `topic` from `transport`.
    ///
    /// Must be called within a Tokio runtime: the first subscriber of a key
    /// spawns its dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::TransportUnavailable`] (wrapped) when the
    /// transport refuses the observer.
    #[instrument(skip(self, transport, callback), fields(handle = %transport.handle()))]
    pub fn subscribe(
        &self,
        transport: &Arc<dyn MediaTransport>,
        topic: &str,
        recursive: bool,
        callback: ChangeCallback,
    ) -> Result<SubscriptionId> {
        let key = ObserverKey {
            handle: transport.handle(),
            topic: topic.to_string(),
            recursive,
        };
        let mut state = self.lock();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);

        if let Some(registration) = state.registrations.get(&key) {
            registration
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((id, callback));
        } else {
            let (sender, receiver) = mpsc::unbounded_channel();
            let observer_id = transport
                .register_change_observer(topic, recursive, Arc::new(Forwarder { sender }))
                .map_err(ProviderError::from)?;
            let subscribers: Subscribers = Arc::new(Mutex::new(vec![(id, callback)]));
            core_async::spawn(dispatch(receiver, Arc::clone(&subscribers)));
            debug!(topic, recursive, "Registered transport observer");

            state.registrations.insert(
                key.clone(),
                Registration {
                    transport: Arc::clone(transport),
                    observer_id,
                    subscribers,
                },
            );
        }

        state.index.insert(id, key);
        Ok(id)
    }

    /// Remove one subscription. Other subscribers of the topic are unaffected.
    ///
    /// Returns `false` for an unknown id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let Some(key) = state.index.remove(&id) else {
            return false;
        };
        let now_empty = state.registrations.get(&key).map_or(false, |registration| {
            let mut subscribers = registration
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|(sub, _)| *sub != id);
            subscribers.is_empty()
        });

        if now_empty {
            if let Some(registration) = state.registrations.remove(&key) {
                registration
                    .transport
                    .unregister_change_observer(registration.observer_id);
                debug!(topic = %key.topic, handle = %key.handle, "Released transport observer");
            }
        }
        true
    }

    /// Drop every subscription bound to `handle`.
    ///
    /// Returns the number of subscriptions removed.
    pub fn unsubscribe_transport(&self, handle: TransportHandle) -> usize {
        let ids: Vec<SubscriptionId> = self
            .lock()
            .index
            .iter()
            .filter(|(_, key)| key.handle == handle)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter().filter(|id| self.unsubscribe(*id)).count()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().index.len()
    }

    /// Transport observers currently registered
    pub fn observer_count(&self) -> usize {
        self.lock().registrations.len()
    }
}

async fn dispatch(mut receiver: mpsc::UnboundedReceiver<String>, subscribers: Subscribers) {
    while let Some(uri) = receiver.recv().await {
        let callbacks: Vec<ChangeCallback> = subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        trace!(uri = %uri, subscribers = callbacks.len(), "Dispatching change");
        for callback in callbacks {
            callback(&uri);
        }
    }
}
