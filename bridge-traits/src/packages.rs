//! Platform package resolution
//!
//! Enumerates the cloud media provider packages installed for a user.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transport::UserId;

/// An installed package that implements the cloud media provider contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    /// Content authority the provider serves
    pub authority: String,
    /// Package that owns the authority
    pub package_name: String,
    /// Linux uid of the package for the queried user
    pub uid: i32,
    /// Human-readable label
    pub display_name: String,
}

/// Package/intent resolution for the media provider contract.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::packages::PackageResolver;
/// use bridge_traits::transport::UserId;
///
/// async fn list(resolver: &dyn PackageResolver) {
///     for candidate in resolver.resolve_media_providers(UserId(0)).await.unwrap_or_default() {
///         println!("{} ({})", candidate.display_name, candidate.authority);
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PackageResolver: Send + Sync {
    /// Candidates in platform resolution order
    async fn resolve_media_providers(&self, user: UserId) -> Result<Vec<ProviderCandidate>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_resolver_returns_candidates() {
        let mut resolver = MockPackageResolver::new();
        resolver
            .expect_resolve_media_providers()
            .withf(|user| *user == UserId(0))
            .returning(|_| {
                Ok(vec![ProviderCandidate {
                    authority: "com.example.cloud".into(),
                    package_name: "com.example".into(),
                    uid: 10_100,
                    display_name: "Example".into(),
                }])
            });

        let found = resolver.resolve_media_providers(UserId(0)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].authority, "com.example.cloud");
    }
}
