use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("No active transport; call set_active_transport first")]
    NoActiveTransport,

    #[error("Provider not available: {0}")]
    ProviderUnavailable(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] core_provider::ProviderError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

impl CoreError {
    /// The transport could not be reached; retrying later may succeed.
    pub fn is_unavailable(&self) -> bool {
        match self {
            CoreError::Provider(e) => e.is_unavailable(),
            CoreError::Sync(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
