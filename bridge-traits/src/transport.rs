//! Media provider transport
//!
//! A transport is a queryable, observable connection to the media provider
//! of one user profile. Switching profiles means switching transports; each
//! transport is identified by a [`TransportHandle`] so observers registered
//! on an old handle can be told apart from fresh ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::row::{Bundle, QueryResult};

/// Identifier of a user profile on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

/// Identity of one transport instance.
///
/// Two transports for the same user still get different handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportHandle(pub u64);

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// Registration id returned by [`MediaTransport::register_change_observer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Receives change notifications from a transport.
///
/// Called on whatever thread the transport delivers notifications on. The
/// implementation must not block.
pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, uri: &str);
}

/// Queryable, observable remote data source.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transport::MediaTransport;
///
/// async fn count_providers(transport: &dyn MediaTransport) -> usize {
///     transport
///         .query("content://media/picker_internal/v2/available_providers", &[], &Default::default())
///         .await
///         .map(|result| result.rows.len())
///         .unwrap_or(0)
/// }
/// ```
#[async_trait::async_trait]
pub trait MediaTransport: Send + Sync {
    /// Identity of this transport instance
    fn handle(&self) -> TransportHandle;

    /// User profile this transport is bound to
    fn user_id(&self) -> UserId;

    /// Fetch rows for `topic`.
    ///
    /// An empty `projection` requests every column.
    async fn query(&self, topic: &str, projection: &[&str], args: &Bundle)
        -> Result<QueryResult>;

    /// RPC-style call into the provider
    async fn call(&self, method: &str, extras: Bundle) -> Result<Bundle>;

    /// Register `observer` for notifications on `topic`.
    ///
    /// With `recursive` set, notifications on any descendant path are
    /// delivered too (see [`topic_matches`]).
    fn register_change_observer(
        &self,
        topic: &str,
        recursive: bool,
        observer: Arc<dyn ChangeObserver>,
    ) -> Result<ObserverId>;

    /// Unregistering an unknown id is a no-op.
    fn unregister_change_observer(&self, id: ObserverId);
}

/// Whether a notification for `uri` should reach an observer of `topic`.
///
/// Exact matches always qualify. With `recursive`, `uri` may also be any
/// slash-delimited descendant of `topic`: `.../album/update` matches
/// `.../album/update/com.example/42` but not `.../album/updates`.
pub fn topic_matches(topic: &str, uri: &str, recursive: bool) -> bool {
    let topic = topic.trim_end_matches('/');
    let uri = uri.trim_end_matches('/');
    if topic == uri {
        return true;
    }
    recursive
        && uri
            .strip_prefix(topic)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALBUM: &str = "content://media/picker_internal/v2/album/update";

    #[test]
    fn test_exact_match() {
        assert!(topic_matches(ALBUM, ALBUM, false));
        assert!(topic_matches(ALBUM, &format!("{ALBUM}/"), false));
    }

    #[test]
    fn test_recursive_prefix_on_segment_boundary() {
        let child = format!("{ALBUM}/com.example.cloud/42");
        assert!(topic_matches(ALBUM, &child, true));
        assert!(!topic_matches(ALBUM, &child, false));
        assert!(!topic_matches(ALBUM, &format!("{ALBUM}s"), true));
    }

    #[test]
    fn test_display() {
        assert_eq!(UserId(10).to_string(), "user-10");
        assert_eq!(TransportHandle(3).to_string(), "transport-3");
    }
}
