//! # Provider Access
//!
//! Typed access to the media providers behind a [`MediaTransport`].
//!
//! ## Overview
//!
//! - [`client::RemoteSourceClient`] - queries, calls and paging against one transport
//! - [`registry::ProviderRegistry`] - installed-provider resolution and allow-list policy
//! - [`types`] - provider, media, album, media set and search value types
//! - [`columns`] - topic URIs, call methods and column names of the provider contract
//! - [`pagination`] - keyset cursors shared by the remote and cached paths
//!
//! Rows come back from the transport untyped; [`parse`] converts them and
//! the client drops rows that fail conversion.
//!
//! [`MediaTransport`]: bridge_traits::MediaTransport

pub mod client;
pub mod columns;
pub mod error;
pub mod pagination;
pub mod parse;
pub mod registry;
pub mod types;

pub use client::RemoteSourceClient;
pub use error::{ProviderError, Result};
pub use pagination::{Page, PageCursor, PageRequest, SyncPage};
pub use registry::ProviderRegistry;
pub use types::{
    Album, CollectionInfo, Media, MediaItem, MediaSet, MediaSource, MimeTypeFilter,
    PreviewSelection, Provider, RemoteMediaSet, SearchRequest, SearchSuggestion, SuggestionType,
    SyncedMedia,
};
