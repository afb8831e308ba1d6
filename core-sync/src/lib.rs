//! # Availability & Sync Module
//!
//! The reactive half of the picker data layer.
//!
//! ## Components
//!
//! - **Change notifier** (`notifier`): fans transport notifications out to
//!   subscribers, one transport observer per topic
//! - **Availability state** (`availability`): publishes the provider list
//!   and detects disruptive updates
//! - **Collection info cache** (`collection_info`): per-provider collection
//!   identity, used to detect dataset resets
//! - **Paging sources** (`paging`): single-flight, invalidatable page
//!   handles for the media grid, albums, album content and preview
//! - **Search sync** (`search_sync`): resume-key driven caching of search
//!   results and media sets
//! - **Primitives** (`state`, `keyed_lock`): watch-based state cells and a
//!   per-key async mutex

pub mod availability;
pub mod collection_info;
pub mod error;
pub mod keyed_lock;
pub mod notifier;
pub mod paging;
pub mod search_sync;
pub mod state;

pub use availability::{AvailabilityState, ContentChange};
pub use collection_info::{CollectionInfoCache, CollectionReset};
pub use error::{Result, SyncError};
pub use keyed_lock::KeyedMutex;
pub use notifier::{ChangeCallback, ChangeNotifier, SubscriptionId};
pub use paging::{
    LoadResult, PageLoader, PagingContext, PagingKey, PagingSource, PagingSourceRegistry,
    PagingState,
};
pub use search_sync::{SearchSyncWorker, SyncOutcome};
pub use state::{ConflatedSignal, SignalReceiver, StateCell};
