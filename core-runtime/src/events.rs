//! # Event Bus System
//!
//! Typed, broadcast-based notifications from the picker data layer, built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`PickerEvent`] wraps one enum per domain
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! Events are diagnostics for the host (and for tests). Consumers that drive
//! UI state should observe the dedicated watch channels on the data layer
//! instead; the bus may drop events for slow subscribers.
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ AvailabilityState├────────>│           ├────────────>│ Host/tests │
//! └──────────────────┘         │ EventBus  │             └────────────┘
//! ┌──────────────────┐  emit   │           │
//! │ PagingSources    ├────────>│           │
//! └──────────────────┘         │           │
//! ┌──────────────────┐  emit   │           │
//! │ SearchSyncWorker ├────────>│           │
//! └──────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AvailabilityEvent, EventBus, PickerEvent};
//!
//! let event_bus = EventBus::new(16);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus
//!     .emit(PickerEvent::Availability(AvailabilityEvent::ProvidersChanged {
//!         authorities: vec!["local".to_string()],
//!     }))
//!     .ok();
//!
//! assert!(receiver.try_recv().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, SendError},
    Receiver,
};

/// Default event buffer size
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum PickerEvent {
    /// Provider availability and collection identity
    Availability(AvailabilityEvent),
    /// Paging source lifecycle
    Paging(PagingEvent),
    /// Search and media-set cache sync
    Sync(SyncEvent),
}

impl PickerEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PickerEvent::Availability(e) => e.description(),
            PickerEvent::Paging(e) => e.description(),
            PickerEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PickerEvent::Availability(AvailabilityEvent::RefreshFailed { .. })
            | PickerEvent::Paging(PagingEvent::RefreshFailed { .. })
            | PickerEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Warning,
            PickerEvent::Availability(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Availability Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AvailabilityEvent {
    /// The active user profile (and with it the transport) changed.
    ProfileChanged { user_id: i32 },
    /// A recomputation produced a different provider list.
    ProvidersChanged {
        /// Authorities in published order
        authorities: Vec<String>,
    },
    /// Previously available providers disappeared.
    DisruptiveUpdate { removed: Vec<String> },
    /// A provider's collection id or account changed.
    CollectionReset { authority: String },
    /// Recomputation failed; the previous list is still published.
    RefreshFailed { message: String },
}

impl AvailabilityEvent {
    fn description(&self) -> &str {
        match self {
            AvailabilityEvent::ProfileChanged { .. } => "Active profile changed",
            AvailabilityEvent::ProvidersChanged { .. } => "Available providers changed",
            AvailabilityEvent::DisruptiveUpdate { .. } => "Provider removed from availability",
            AvailabilityEvent::CollectionReset { .. } => "Provider collection reset",
            AvailabilityEvent::RefreshFailed { .. } => "Provider availability refresh failed",
        }
    }
}

// ============================================================================
// Paging Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PagingEvent {
    /// A paging source handle became invalid.
    Invalidated {
        /// Display form of the paging key
        key: String,
        handle_id: u64,
    },
    /// The pre-load provider refresh failed; stale data is served.
    RefreshFailed { key: String, message: String },
}

impl PagingEvent {
    fn description(&self) -> &str {
        match self {
            PagingEvent::Invalidated { .. } => "Paging source invalidated",
            PagingEvent::RefreshFailed { .. } => "Paging source refresh failed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// One page of search results was cached.
    SearchResultsSynced {
        search_request_id: i64,
        authority: String,
        inserted: u64,
        /// No further pages remain
        complete: bool,
    },
    /// One page of media sets was cached.
    MediaSetsSynced {
        category_id: String,
        authority: String,
        inserted: u64,
    },
    /// One page of a media set's content was cached.
    MediaSetMediaSynced {
        media_set_picker_id: i64,
        inserted: u64,
        complete: bool,
    },
    /// A sync pass failed; resume keys are unchanged.
    Failed { operation: String, message: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::SearchResultsSynced { .. } => "Search results cached",
            SyncEvent::MediaSetsSynced { .. } => "Media sets cached",
            SyncEvent::MediaSetMediaSynced { .. } => "Media set content cached",
            SyncEvent::Failed { .. } => "Sync pass failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for picker events.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PickerEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Events buffered per subscriber before it receives
    ///   `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if nobody is listening. Publishers in this workspace ignore
    /// that error.
    pub fn emit(&self, event: PickerEvent) -> Result<usize, SendError<PickerEvent>> {
        self.sender.send(event)
    }

    /// Each call creates an independent receiver. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<PickerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&PickerEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, PickerEvent};
///
/// let event_bus = EventBus::new(16);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, PickerEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<PickerEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<PickerEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PickerEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &PickerEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<PickerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<PickerEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Some(Err(RecvError::Closed))
                }
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers_changed(authorities: &[&str]) -> PickerEvent {
        PickerEvent::Availability(AvailabilityEvent::ProvidersChanged {
            authorities: authorities.iter().map(|a| a.to_string()).collect(),
        })
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(4);
        assert!(bus.emit(providers_changed(&["local"])).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_event() {
        let bus = EventBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let sent = bus.emit(providers_changed(&["local", "cloud"])).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(first.recv().await.unwrap(), providers_changed(&["local", "cloud"]));
        assert_eq!(second.recv().await.unwrap(), providers_changed(&["local", "cloud"]));
    }

    #[tokio::test]
    async fn test_stream_filter_skips_other_domains() {
        let bus = EventBus::new(8);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, PickerEvent::Sync(_)));

        bus.emit(providers_changed(&["local"])).unwrap();
        bus.emit(PickerEvent::Sync(SyncEvent::Failed {
            operation: "search".into(),
            message: "boom".into(),
        }))
        .unwrap();

        let event = stream.recv().await.unwrap();
        assert!(matches!(event, PickerEvent::Sync(SyncEvent::Failed { .. })));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());
        for _ in 0..5 {
            bus.emit(providers_changed(&["local"])).unwrap();
        }
        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(_)))));
    }

    #[test]
    fn test_severity() {
        let failed = PickerEvent::Paging(PagingEvent::RefreshFailed {
            key: "media".into(),
            message: "timeout".into(),
        });
        assert_eq!(failed.severity(), EventSeverity::Warning);
        assert_eq!(providers_changed(&[]).severity(), EventSeverity::Info);
        let invalidated = PickerEvent::Paging(PagingEvent::Invalidated {
            key: "media".into(),
            handle_id: 1,
        });
        assert_eq!(invalidated.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_value(providers_changed(&["local"])).unwrap();
        assert_eq!(json["type"], "Availability");
        assert_eq!(json["payload"]["event"], "ProvidersChanged");
        assert_eq!(json["payload"]["authorities"][0], "local");
    }
}
