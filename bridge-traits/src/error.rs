use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),
}

impl BridgeError {
    /// Whether the failure means the remote side could not be reached at all,
    /// as opposed to a call that reached it and failed.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BridgeError::NotAvailable(_) | BridgeError::PermissionDenied(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
