use thiserror::Error;

/// Errors raised while validating a [`KeyConfig`][crate::KeyConfig].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("min_key_len must be at least 1")]
    ZeroMinKeyLen,
    #[error("max_key_len {max} is smaller than min_key_len {min}")]
    MaxBelowMin { min: usize, max: usize },
    #[error("alphabet must contain at least one symbol")]
    EmptyAlphabet,
    #[error("alphabet contains {0:?} more than once")]
    DuplicateSymbol(char),
    #[error("attempt budget must allow at least one attempt per key length")]
    ZeroAttemptBudget,
}

/// Errors returned by a key allocation.
///
/// Store failures are carried as-is so callers can inspect the backend's own
/// error; only exhaustion of the retry budget is reported by the allocator
/// itself.
#[derive(Debug, Error)]
pub enum AllocateError<E> {
    #[error(transparent)]
    Store(E),
    #[error("could not allocate a unique key for record of type {record_type} after {attempts} attempts")]
    KeyspaceExhausted {
        record_type: &'static str,
        attempts: u32,
    },
}

impl<E> AllocateError<E> {
    /// Returns the underlying store failure, if this is one.
    pub fn store_error(&self) -> Option<&E> {
        match self {
            AllocateError::Store(err) => Some(err),
            AllocateError::KeyspaceExhausted { .. } => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, AllocateError::KeyspaceExhausted { .. })
    }
}
