use core_library::LibraryError;
use core_provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cache error: {0}")]
    Library(#[from] LibraryError),

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    #[error("Refresh timed out after {0} ms")]
    Timeout(u64),

    #[error("Superseded by a newer transport")]
    Cancelled,
}

impl SyncError {
    /// The provider could not be reached; the caller keeps its last good value
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SyncError::Provider(e) if e.is_unavailable())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
