//! Error types for provider access

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Provider transport and parsing errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider could not be reached (not installed, process died,
    /// permission revoked). Callers keep their last good value.
    #[error("Provider transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The provider was reached but the call failed
    #[error("Provider call failed: {0}")]
    CallFailed(String),

    /// A returned row lacks a required column
    #[error("Malformed {kind} row: missing or invalid '{column}'")]
    MalformedRow {
        kind: &'static str,
        column: &'static str,
    },

    /// An enumerated value was not recognised
    #[error("Invalid {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// Package resolution failed
    #[error("Package resolution failed: {0}")]
    Resolution(String),
}

impl ProviderError {
    pub fn malformed(kind: &'static str, column: &'static str) -> Self {
        ProviderError::MalformedRow { kind, column }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProviderError::TransportUnavailable(_))
    }
}

impl From<BridgeError> for ProviderError {
    fn from(error: BridgeError) -> Self {
        if error.is_unavailable() {
            ProviderError::TransportUnavailable(error.to_string())
        } else {
            ProviderError::CallFailed(error.to_string())
        }
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
