//! # Picker Data Layer
//!
//! Host-facing façade over the picker's data sync core.
//!
//! ## Overview
//!
//! [`DataLayer`] wires the pieces of the workspace together:
//! - `core-sync` availability, collection info and paging state
//! - `core-library` cache store for search and media-set results
//! - `core-provider` policy and remote access
//!
//! Hosts build a [`PickerConfig`], construct the layer once, and hand it a
//! transport whenever the active user profile changes. Logging is set up
//! separately with [`core_runtime::logging::init_logging`].

pub mod data_layer;
pub mod error;

pub use data_layer::DataLayer;
pub use error::{CoreError, Result};

pub use core_runtime::config::PickerConfig;
pub use core_sync::{LoadResult, PagingSource, SyncOutcome};
