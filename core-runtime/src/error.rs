use thiserror::Error;

/// Failures while assembling the picker runtime
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid picker configuration: {0}")]
    Config(String),

    #[error("Host did not provide {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
