//! # Host Bridge Traits
//!
//! Contracts between the picker data core and the host platform.
//!
//! ## Overview
//!
//! The core never talks to a provider process, the package manager or the
//! host logger directly. Each of those capabilities is expressed as a trait
//! here and injected at construction time, so the core can run against the
//! real platform, an in-process fake, or a mock.
//!
//! ## Traits
//!
//! ### Provider transport
//! - [`MediaTransport`](transport::MediaTransport) - Query/call/observe a media provider
//! - [`ChangeObserver`](transport::ChangeObserver) - Callback for change notifications
//!
//! ### Platform integration
//! - [`PackageResolver`](packages::PackageResolver) - Enumerates installed media providers
//!
//! ### Utilities
//! - [`Clock`](host::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](host::LoggerSink) - Forward structured logs to host logging
//!
//! ## Rows and Bundles
//!
//! Provider queries return loosely typed rows ([`Row`](row::Row)) keyed by
//! column name. RPC-style calls exchange [`Bundle`](row::Bundle)s of the same
//! shape. Typed parsing happens in `core-provider`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map platform failures (dead provider process, revoked permission)
//! onto `NotAvailable` / `PermissionDenied` so callers can apply the
//! keep-last-good-value policy.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::transport::{MediaTransport, ChangeObserver};
//! use std::sync::Arc;
//!
//! struct PrintObserver;
//!
//! impl ChangeObserver for PrintObserver {
//!     fn on_change(&self, uri: &str) {
//!         println!("changed: {uri}");
//!     }
//! }
//!
//! fn watch(transport: &dyn MediaTransport) {
//!     let id = transport
//!         .register_change_observer(
//!             "content://media/picker_internal/v2/media/update",
//!             true,
//!             Arc::new(PrintObserver),
//!         )
//!         .unwrap();
//!     transport.unregister_change_observer(id);
//! }
//! ```

pub mod error;
pub mod host;
pub mod packages;
pub mod row;
pub mod transport;

pub use error::BridgeError;

// Re-export commonly used types
pub use host::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
pub use packages::{PackageResolver, ProviderCandidate};
pub use row::{Bundle, QueryResult, Row, RowExt, RowValue};
pub use transport::{
    topic_matches, ChangeObserver, MediaTransport, ObserverId, TransportHandle, UserId,
};
