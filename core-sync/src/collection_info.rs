//! Per-provider collection identity cache

use crate::error::Result;
use arc_swap::ArcSwap;
use core_provider::{CollectionInfo, Provider, RemoteSourceClient};
use core_runtime::logging::redact_account_name;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A provider whose backing dataset changed generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReset {
    pub authority: String,
    pub previous: CollectionInfo,
    pub current: CollectionInfo,
}

/// Collection info per authority.
///
/// Readers load an immutable snapshot; writers replace it whole, so a
/// reader never sees half an update.
#[derive(Debug, Default)]
pub struct CollectionInfoCache {
    infos: ArcSwap<HashMap<String, CollectionInfo>>,
}

impl CollectionInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached info for `provider`, fetched on first access.
    pub async fn get_collection_info(
        &self,
        client: &RemoteSourceClient,
        provider: &Provider,
    ) -> Result<CollectionInfo> {
        if let Some(info) = self.cached(&provider.authority) {
            return Ok(info);
        }

        let fetched = client.fetch_collection_info_for(provider).await?;
        debug!(
            authority = %provider.authority,
            account = %redact_account_name(fetched.account_name.as_deref()),
            "Fetched collection info"
        );
        // A concurrent update may have stored a newer value meanwhile
        self.infos.rcu(|infos| {
            let mut infos = HashMap::clone(infos);
            infos
                .entry(provider.authority.clone())
                .or_insert_with(|| fetched.clone());
            infos
        });
        Ok(self.cached(&provider.authority).unwrap_or(fetched))
    }

    pub fn cached(&self, authority: &str) -> Option<CollectionInfo> {
        self.infos.load().get(authority).cloned()
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, CollectionInfo>> {
        self.infos.load_full()
    }

    /// Replace the cache with `infos`.
    ///
    /// Authorities missing from `infos` are dropped. Returns the providers
    /// whose collection id or account changed from a previously known
    /// collection; a provider seen for the first time is not a reset.
    pub fn update_collection_info(&self, infos: Vec<CollectionInfo>) -> Vec<CollectionReset> {
        let previous = self.infos.load_full();
        let mut resets = Vec::new();
        let mut next = HashMap::with_capacity(infos.len());

        for info in infos {
            if let Some(old) = previous.get(&info.authority) {
                if old.collection_id.is_some() && !old.is_same_collection(&info) {
                    info!(
                        authority = %info.authority,
                        account = %redact_account_name(info.account_name.as_deref()),
                        "Provider collection reset"
                    );
                    resets.push(CollectionReset {
                        authority: info.authority.clone(),
                        previous: old.clone(),
                        current: info.clone(),
                    });
                }
            }
            next.insert(info.authority.clone(), info);
        }

        self.infos.store(Arc::new(next));
        resets
    }

    pub fn clear(&self) {
        self.infos.store(Arc::new(HashMap::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_local::InProcessTransport;
    use bridge_traits::row::{row_of, RowValue};
    use bridge_traits::transport::UserId;
    use core_provider::columns::{columns as col, queries};
    use core_provider::MediaSource;

    fn info(authority: &str, collection: &str, account: &str) -> CollectionInfo {
        CollectionInfo {
            authority: authority.to_string(),
            collection_id: Some(collection.to_string()),
            account_name: Some(account.to_string()),
            account_configuration_intent: None,
        }
    }

    fn provider(authority: &str) -> Provider {
        Provider {
            authority: authority.to_string(),
            media_source: MediaSource::Remote,
            uid: 1,
            display_name: authority.to_string(),
        }
    }

    #[tokio::test]
    async fn test_lazy_fetch_is_cached() {
        let transport = Arc::new(InProcessTransport::new(UserId(0)));
        transport.set_rows(
            queries::COLLECTION_INFO,
            vec![row_of([
                (col::AUTHORITY, RowValue::from("cloud.a")),
                (col::COLLECTION_ID, RowValue::from("v1")),
                (col::ACCOUNT_NAME, RowValue::from("me@example.com")),
            ])],
        );
        let client = RemoteSourceClient::new(transport.clone());
        let cache = CollectionInfoCache::new();

        let first = cache
            .get_collection_info(&client, &provider("cloud.a"))
            .await
            .unwrap();
        let second = cache
            .get_collection_info(&client, &provider("cloud.a"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.collection_id.as_deref(), Some("v1"));
        assert_eq!(transport.query_count(queries::COLLECTION_INFO), 1);
    }

    #[test]
    fn test_update_reports_resets_and_drops_missing() {
        let cache = CollectionInfoCache::new();
        assert!(cache
            .update_collection_info(vec![info("a", "v1", "x"), info("b", "v1", "y")])
            .is_empty());

        let resets = cache.update_collection_info(vec![info("a", "v2", "x")]);
        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].authority, "a");
        assert_eq!(resets[0].previous.collection_id.as_deref(), Some("v1"));
        assert!(cache.cached("b").is_none());
    }

    #[test]
    fn test_account_change_is_a_reset() {
        let cache = CollectionInfoCache::new();
        cache.update_collection_info(vec![info("a", "v1", "x")]);
        let resets = cache.update_collection_info(vec![info("a", "v1", "z")]);
        assert_eq!(resets.len(), 1);
    }

    #[test]
    fn test_first_collection_is_not_a_reset() {
        let cache = CollectionInfoCache::new();
        cache.update_collection_info(vec![CollectionInfo::empty("a")]);
        assert!(cache
            .update_collection_info(vec![info("a", "v1", "x")])
            .is_empty());

        cache.clear();
        assert!(cache.snapshot().is_empty());
    }
}
