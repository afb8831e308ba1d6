//! Scriptable in-process media transport

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    row::{Bundle, QueryResult, Row},
    transport::{
        topic_matches, ChangeObserver, MediaTransport, ObserverId, TransportHandle, UserId,
    },
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Computes the result of a query from its arguments
pub type QueryHandler = Arc<dyn Fn(&Bundle) -> Result<QueryResult> + Send + Sync>;

struct Registration {
    topic: String,
    recursive: bool,
    observer: Arc<dyn ChangeObserver>,
}

#[derive(Default)]
struct State {
    handlers: HashMap<String, QueryHandler>,
    call_results: HashMap<String, Bundle>,
    delays: HashMap<String, Duration>,
    unavailable: bool,
    observers: HashMap<u64, Registration>,
    next_observer: u64,
    queries: Vec<(String, Bundle)>,
    calls: Vec<(String, Bundle)>,
}

/// A [`MediaTransport`] whose data is scripted by the host.
///
/// Queries are answered by per-topic handlers; topics without one return an
/// empty result. Calls return the scripted bundle for the method, or an
/// empty bundle. [`InProcessTransport::notify_change`] fans a notification
/// out to every matching observer on the calling thread.
pub struct InProcessTransport {
    handle: TransportHandle,
    user: UserId,
    state: Mutex<State>,
}

impl InProcessTransport {
    pub fn new(user: UserId) -> Self {
        Self {
            handle: TransportHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
            user,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `topic` with a fixed set of rows.
    pub fn set_rows(&self, topic: &str, rows: Vec<Row>) {
        self.set_result(topic, QueryResult::from_rows(rows));
    }

    /// Answer `topic` with a fixed result.
    pub fn set_result(&self, topic: &str, result: QueryResult) {
        self.set_handler(topic, move |_| Ok(result.clone()));
    }

    /// Answer `topic` by running `handler` on the query arguments.
    pub fn set_handler<F>(&self, topic: &str, handler: F)
    where
        F: Fn(&Bundle) -> Result<QueryResult> + Send + Sync + 'static,
    {
        self.state()
            .handlers
            .insert(topic.to_string(), Arc::new(handler));
    }

    pub fn set_call_result(&self, method: &str, result: Bundle) {
        self.state()
            .call_results
            .insert(method.to_string(), result);
    }

    /// Delay every query on `topic` or call of `method` named `key`.
    pub fn set_delay(&self, key: &str, delay: Duration) {
        self.state().delays.insert(key.to_string(), delay);
    }

    /// While set, every query and call fails with [`BridgeError::NotAvailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Deliver a change notification for `uri` to every matching observer.
    ///
    /// Returns how many observers were notified.
    pub fn notify_change(&self, uri: &str) -> usize {
        let targets: Vec<Arc<dyn ChangeObserver>> = self
            .state()
            .observers
            .values()
            .filter(|r| topic_matches(&r.topic, uri, r.recursive))
            .map(|r| Arc::clone(&r.observer))
            .collect();
        debug!(transport = %self.handle, uri, observers = targets.len(), "Notifying change");
        for observer in &targets {
            observer.on_change(uri);
        }
        targets.len()
    }

    pub fn observer_count(&self) -> usize {
        self.state().observers.len()
    }

    /// Topics with at least one registered observer, sorted
    pub fn observed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .state()
            .observers
            .values()
            .map(|r| r.topic.clone())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    /// Arguments of every query issued on `topic`, oldest first
    pub fn queries(&self, topic: &str) -> Vec<Bundle> {
        self.state()
            .queries
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn query_count(&self, topic: &str) -> usize {
        self.state().queries.iter().filter(|(t, _)| t == topic).count()
    }

    /// Extras of every call of `method`, oldest first
    pub fn calls(&self, method: &str) -> Vec<Bundle> {
        self.state()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, extras)| extras.clone())
            .collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|(m, _)| m == method).count()
    }

    fn unavailable_error(&self) -> BridgeError {
        BridgeError::NotAvailable(format!("{} is not reachable", self.handle))
    }
}

#[async_trait]
impl MediaTransport for InProcessTransport {
    fn handle(&self) -> TransportHandle {
        self.handle
    }

    fn user_id(&self) -> UserId {
        self.user
    }

    async fn query(
        &self,
        topic: &str,
        _projection: &[&str],
        args: &Bundle,
    ) -> Result<QueryResult> {
        let delay = {
            let mut state = self.state();
            state.queries.push((topic.to_string(), args.clone()));
            state.delays.get(topic).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let handler = {
            let state = self.state();
            if state.unavailable {
                return Err(self.unavailable_error());
            }
            state.handlers.get(topic).cloned()
        };
        match handler {
            Some(handler) => handler(args),
            None => Ok(QueryResult::default()),
        }
    }

    async fn call(&self, method: &str, extras: Bundle) -> Result<Bundle> {
        let delay = {
            let mut state = self.state();
            state.calls.push((method.to_string(), extras));
            state.delays.get(method).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if state.unavailable {
            return Err(self.unavailable_error());
        }
        Ok(state.call_results.get(method).cloned().unwrap_or_default())
    }

    fn register_change_observer(
        &self,
        topic: &str,
        recursive: bool,
        observer: Arc<dyn ChangeObserver>,
    ) -> Result<ObserverId> {
        let mut state = self.state();
        if state.unavailable {
            return Err(self.unavailable_error());
        }
        state.next_observer += 1;
        let id = state.next_observer;
        state.observers.insert(
            id,
            Registration {
                topic: topic.to_string(),
                recursive,
                observer,
            },
        );
        Ok(ObserverId(id))
    }

    fn unregister_change_observer(&self, id: ObserverId) {
        self.state().observers.remove(&id.0);
    }
}
