//! Workspace umbrella crate.
//!
//! Re-exports the host-facing [`DataLayer`] so applications can depend on a
//! single crate instead of wiring the workspace members individually.

pub use core_service::*;
