//! # In-Process Bridge Implementations
//!
//! Host-side implementations of the bridge traits that live entirely in the
//! current process:
//! - `InProcessTransport`: a scriptable [`MediaTransport`] with observer
//!   fan-out, used to embed the picker core against synthetic providers and
//!   to drive it from tests
//! - `StaticPackageResolver`: a [`PackageResolver`] over a fixed candidate list
//! - `ManualClock`: a [`Clock`] that only moves when told to
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_local::{InProcessTransport, StaticPackageResolver};
//! use bridge_traits::UserId;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(InProcessTransport::new(UserId(0)));
//! transport.set_rows(AVAILABLE_PROVIDERS, rows);
//! transport.notify_change(MEDIA_UPDATE);
//! ```
//!
//! [`MediaTransport`]: bridge_traits::MediaTransport
//! [`PackageResolver`]: bridge_traits::PackageResolver
//! [`Clock`]: bridge_traits::Clock

mod clock;
mod packages;
mod transport;

pub use clock::ManualClock;
pub use packages::StaticPackageResolver;
pub use transport::{InProcessTransport, QueryHandler};
