use core_provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored row no longer converts into its domain type
    #[error("Corrupt {table} row {id}: {source}")]
    CorruptRow {
        table: &'static str,
        id: i64,
        #[source]
        source: ProviderError,
    },
}

pub type Result<T> = std::result::Result<T, LibraryError>;
