use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duplicate value '{value}' for unique column {column}")]
    UniqueViolation { column: &'static str, value: String },
    #[error("record has no key to insert")]
    MissingKey,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("no open savepoint to {0}")]
    NoSavepoint(&'static str),
    /// A driver error, kept untouched so callers see exactly what the
    /// database reported.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
