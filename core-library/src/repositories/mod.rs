//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations for the picker cache.
//!
//! ## Architecture
//!
//! - Traits define the interface for each table group
//! - SQLite implementations use sqlx for async database access
//! - Bulk inserts run inside one transaction and use `INSERT OR IGNORE`, so
//!   the returned count is the number of rows actually added
//! - Cached media queries resolve references against the live `media` table
//!   and page with a `(date_taken_ms, _id)` keyset, newest first
//!
//! ## Available Repositories
//!
//! - `MediaRepository` - Live media rows merged from every provider
//! - `SearchRepository` - Search requests, cached results, resume keys, history
//! - `MediaSetRepository` - Media sets and their cached content
//! - `SuggestionRepository` - Provider search suggestions with expiry

pub mod media;
pub mod media_set;
pub(crate) mod query;
pub mod search;
pub mod suggestion;

pub use media::{MediaRepository, SqliteMediaRepository};
pub use media_set::{MediaSetRepository, SqliteMediaSetRepository};
pub use search::{SearchRepository, SqliteSearchRepository};
pub use suggestion::{SqliteSuggestionRepository, SuggestionRepository};
