//! # Picker Cache
//!
//! Owns the picker's relational cache and provides repository patterns for
//! data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - The live media table merged from local and cloud providers
//! - Cached search results and media-set content, de-duplicated by resolved
//!   media identity
//! - Resume keys for incremental provider sync
//! - Search history and provider suggestions

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::{LibraryError, Result};
pub use models::{MediaFilter, MediaIdentity, SearchHistoryEntry, SYNC_COMPLETE_RESUME_KEY};
pub use store::LocalCacheStore;
