//! Provider resolution and allow-list policy

use crate::error::{ProviderError, Result};
use crate::types::{MediaSource, Provider};
use bridge_traits::packages::{PackageResolver, ProviderCandidate};
use bridge_traits::transport::UserId;
use core_runtime::config::{FeatureFlags, PickerConfig};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Applies the provider policy of a [`PickerConfig`].
///
/// Two entry points:
/// - [`ProviderRegistry::get_all_allowed_providers`] lists installed cloud
///   providers the allow-list admits, independent of any transport
/// - [`ProviderRegistry::filter_available`] narrows a transport-reported
///   provider list to what the picker may show
#[derive(Clone)]
pub struct ProviderRegistry {
    resolver: Arc<dyn PackageResolver>,
    local_authority: String,
    allowed_cloud_providers: Vec<String>,
    features: FeatureFlags,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("local_authority", &self.local_authority)
            .field("allowed_cloud_providers", &self.allowed_cloud_providers)
            .field("features", &self.features)
            .finish()
    }
}

impl From<ProviderCandidate> for Provider {
    fn from(candidate: ProviderCandidate) -> Self {
        Provider {
            authority: candidate.authority,
            media_source: MediaSource::Remote,
            uid: candidate.uid,
            display_name: candidate.display_name,
        }
    }
}

impl ProviderRegistry {
    pub fn new(config: &PickerConfig) -> Self {
        Self {
            resolver: Arc::clone(&config.package_resolver),
            local_authority: config.local_authority.clone(),
            allowed_cloud_providers: config.allowed_cloud_providers.clone(),
            features: config.features,
        }
    }

    pub fn local_authority(&self) -> &str {
        &self.local_authority
    }

    fn admits(&self, authority: &str) -> bool {
        authority == self.local_authority
            || !self.features.enforce_allowlist
            || self.allowed_cloud_providers.iter().any(|a| a == authority)
    }

    /// Installed cloud providers for `user` that pass the allow-list, in
    /// resolution order.
    ///
    /// Allow-listed authorities that are not installed are simply absent.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn get_all_allowed_providers(&self, user: UserId) -> Result<Vec<Provider>> {
        let candidates = self
            .resolver
            .resolve_media_providers(user)
            .await
            .map_err(|e| ProviderError::Resolution(e.to_string()))?;
        let resolved = candidates.len();

        let allowed: Vec<Provider> = candidates
            .into_iter()
            .filter(|c| self.admits(&c.authority))
            .map(Provider::from)
            .collect();

        debug!(resolved, allowed = allowed.len(), "Resolved cloud providers");
        Ok(allowed)
    }

    /// Apply feature and allow-list policy to transport-reported providers.
    ///
    /// The local provider sorts first; everything else keeps its source order.
    pub fn filter_available(&self, providers: Vec<Provider>) -> Vec<Provider> {
        let (local, cloud): (Vec<Provider>, Vec<Provider>) = providers
            .into_iter()
            .filter(|p| self.features.cloud_media_enabled || p.media_source == MediaSource::Local)
            .filter(|p| p.media_source == MediaSource::Local || self.admits(&p.authority))
            .partition(Provider::is_local);
        local.into_iter().chain(cloud).collect()
    }
}
