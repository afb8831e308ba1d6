//! Fixed package resolution

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    packages::{PackageResolver, ProviderCandidate},
    transport::UserId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// Resolver answering from an in-memory candidate table.
///
/// Users without an explicit entry get the default candidate list.
#[derive(Debug, Default)]
pub struct StaticPackageResolver {
    default_candidates: RwLock<Vec<ProviderCandidate>>,
    per_user: RwLock<HashMap<UserId, Vec<ProviderCandidate>>>,
}

impl StaticPackageResolver {
    pub fn new(candidates: Vec<ProviderCandidate>) -> Self {
        Self {
            default_candidates: RwLock::new(candidates),
            per_user: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the default candidate list (simulates install/uninstall)
    pub fn set_candidates(&self, candidates: Vec<ProviderCandidate>) {
        *self
            .default_candidates
            .write()
            .unwrap_or_else(|e| e.into_inner()) = candidates;
    }

    pub fn set_candidates_for(&self, user: UserId, candidates: Vec<ProviderCandidate>) {
        self.per_user
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user, candidates);
    }
}

#[async_trait]
impl PackageResolver for StaticPackageResolver {
    async fn resolve_media_providers(&self, user: UserId) -> Result<Vec<ProviderCandidate>> {
        if let Some(candidates) = self
            .per_user
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user)
        {
            return Ok(candidates.clone());
        }
        Ok(self
            .default_candidates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(authority: &str) -> ProviderCandidate {
        ProviderCandidate {
            authority: authority.to_string(),
            package_name: format!("{authority}.pkg"),
            uid: 10_001,
            display_name: authority.to_string(),
        }
    }

    #[tokio::test]
    async fn test_per_user_override() {
        let resolver = StaticPackageResolver::new(vec![candidate("a")]);
        resolver.set_candidates_for(UserId(10), vec![candidate("b")]);

        let main = resolver.resolve_media_providers(UserId(0)).await.unwrap();
        let work = resolver.resolve_media_providers(UserId(10)).await.unwrap();
        assert_eq!(main[0].authority, "a");
        assert_eq!(work[0].authority, "b");
    }
}
