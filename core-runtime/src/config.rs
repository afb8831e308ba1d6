//! # Picker Configuration Module
//!
//! Configuration for the picker data layer.
//!
//! ## Overview
//!
//! [`PickerConfig`] is built with [`PickerConfigBuilder`]. The builder
//! validates eagerly so a misconfigured host fails at startup with an
//! actionable message instead of serving an empty picker later.
//!
//! ## Required Dependencies
//!
//! - `PackageResolver` - enumerates installed cloud media providers
//!
//! ## Optional Dependencies
//!
//! - `Clock` - defaults to [`SystemClock`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::PickerConfig;
//! use std::sync::Arc;
//!
//! let config = PickerConfig::builder()
//!     .database_path("/data/picker/picker.db")
//!     .package_resolver(Arc::new(MyResolver))
//!     .enable_cloud_media(true)
//!     .enforce_allowlist(true)
//!     .allowed_cloud_provider("com.example.cloud")
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::PickerConfig;
//!
//! // Fails: no PackageResolver injected
//! let config = PickerConfig::builder()
//!     .build()
//!     .expect("Should fail - missing required bridges");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, PackageResolver, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Authority of the on-device media provider.
pub const DEFAULT_LOCAL_AUTHORITY: &str = "com.android.providers.media.photopicker";

pub const DEFAULT_PAGE_SIZE: usize = 100;

const MAX_PAGE_SIZE: usize = 1_000;

pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SUGGESTION_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Picker data layer configuration.
///
/// Use [`PickerConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct PickerConfig {
    /// SQLite database file; `None` keeps the cache in memory
    pub database_path: Option<PathBuf>,

    /// Authority reported by the local provider
    pub local_authority: String,

    /// Cloud authorities allowed when allow-list enforcement is on, in no
    /// particular order
    pub allowed_cloud_providers: Vec<String>,

    pub features: FeatureFlags,

    /// Items per page served by paging sources
    pub page_size: usize,

    /// Upper bound on a provider refresh before the page is served anyway
    pub refresh_timeout: Duration,

    /// Capacity of the event bus
    pub event_buffer_size: usize,

    /// Cached search suggestions older than this are pruned
    pub suggestion_ttl: Duration,

    /// Installed provider enumeration (required)
    pub package_resolver: Arc<dyn PackageResolver>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PickerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickerConfig")
            .field("database_path", &self.database_path)
            .field("local_authority", &self.local_authority)
            .field("allowed_cloud_providers", &self.allowed_cloud_providers)
            .field("features", &self.features)
            .field("page_size", &self.page_size)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("suggestion_ttl", &self.suggestion_ttl)
            .field("package_resolver", &"PackageResolver { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

/// Feature flags gating optional behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Surface cloud (remote) providers at all
    pub cloud_media_enabled: bool,

    /// Restrict cloud providers to [`PickerConfig::allowed_cloud_providers`]
    pub enforce_allowlist: bool,

    /// Enable search and media-set caching
    pub search_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            cloud_media_enabled: true,
            enforce_allowlist: true,
            search_enabled: true,
        }
    }
}

impl PickerConfig {
    /// Creates a new builder for constructing a `PickerConfig`.
    pub fn builder() -> PickerConfigBuilder {
        PickerConfigBuilder::default()
    }

    /// Whether `authority` passes the allow-list policy.
    ///
    /// The local authority and every authority pass while enforcement is off.
    pub fn is_allowed(&self, authority: &str) -> bool {
        authority == self.local_authority
            || !self.features.enforce_allowlist
            || self.allowed_cloud_providers.iter().any(|a| a == authority)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Local authority is not empty
    /// - Page size is within (0, 1000]
    /// - Timeouts and buffer sizes are non-zero
    /// - Allow-list entries are non-empty and do not name the local provider
    pub fn validate(&self) -> Result<()> {
        if self.local_authority.trim().is_empty() {
            return Err(Error::Config("Local authority cannot be empty".to_string()));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        if self.refresh_timeout.is_zero() {
            return Err(Error::Config(
                "Refresh timeout must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(
                    "Database path cannot be empty. Omit it to use an in-memory cache.".to_string(),
                ));
            }
        }

        for authority in &self.allowed_cloud_providers {
            if authority.trim().is_empty() {
                return Err(Error::Config(
                    "Allow-listed cloud provider authority cannot be empty".to_string(),
                ));
            }
            if *authority == self.local_authority {
                return Err(Error::Config(format!(
                    "'{authority}' is the local provider and cannot be allow-listed as a cloud provider"
                )));
            }
        }

        Ok(())
    }
}

fn package_resolver_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "PackageResolver".to_string(),
        message: "PackageResolver implementation is required to enumerate cloud media providers. \
                 Device: inject the package-manager backed resolver. \
                 Tests: use bridge_local::StaticPackageResolver."
            .to_string(),
    }
}

/// Builder for [`PickerConfig`].
#[derive(Default)]
pub struct PickerConfigBuilder {
    database_path: Option<PathBuf>,
    local_authority: Option<String>,
    allowed_cloud_providers: Vec<String>,
    features: FeatureFlags,
    page_size: Option<usize>,
    refresh_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    suggestion_ttl: Option<Duration>,
    package_resolver: Option<Arc<dyn PackageResolver>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PickerConfigBuilder {
    /// Sets the SQLite database file. Without it the cache lives in memory.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Overrides the authority of the on-device provider.
    pub fn local_authority(mut self, authority: impl Into<String>) -> Self {
        self.local_authority = Some(authority.into());
        self
    }

    /// Adds one authority to the cloud provider allow-list.
    pub fn allowed_cloud_provider(mut self, authority: impl Into<String>) -> Self {
        self.allowed_cloud_providers.push(authority.into());
        self
    }

    /// Replaces the cloud provider allow-list.
    pub fn allowed_cloud_providers<I, S>(mut self, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_cloud_providers = authorities.into_iter().map(Into::into).collect();
        self
    }

    pub fn enable_cloud_media(mut self, enabled: bool) -> Self {
        self.features.cloud_media_enabled = enabled;
        self
    }

    pub fn enforce_allowlist(mut self, enforced: bool) -> Self {
        self.features.enforce_allowlist = enforced;
        self
    }

    pub fn enable_search(mut self, enabled: bool) -> Self {
        self.features.search_enabled = enabled;
        self
    }

    /// Replaces all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn suggestion_ttl(mut self, ttl: Duration) -> Self {
        self.suggestion_ttl = Some(ttl);
        self
    }

    /// Sets the package resolver implementation (required).
    pub fn package_resolver(mut self, resolver: Arc<dyn PackageResolver>) -> Self {
        self.package_resolver = Some(resolver);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `PickerConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no `PackageResolver` was injected
    /// - [`Error::Config`] when a value fails [`PickerConfig::validate`]
    pub fn build(self) -> Result<PickerConfig> {
        let package_resolver = self
            .package_resolver
            .ok_or_else(package_resolver_missing_error)?;

        let config = PickerConfig {
            database_path: self.database_path,
            local_authority: self
                .local_authority
                .unwrap_or_else(|| DEFAULT_LOCAL_AUTHORITY.to_string()),
            allowed_cloud_providers: self.allowed_cloud_providers,
            features: self.features,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            refresh_timeout: self.refresh_timeout.unwrap_or(DEFAULT_REFRESH_TIMEOUT),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            suggestion_ttl: self.suggestion_ttl.unwrap_or(DEFAULT_SUGGESTION_TTL),
            package_resolver,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
