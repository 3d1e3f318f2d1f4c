use crate::classify::FailureKind;
use crate::record::Record;
use async_trait::async_trait;

/// How the store should treat an existing row with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Always create a new row. A row with the same key must make the insert
    /// fail with a uniqueness violation instead of being overwritten.
    #[default]
    Create,
    /// Create the row, or update it in place if the key already exists.
    CreateOrUpdate,
}

/// Nested rollback points inside an enclosing transaction.
///
/// Scopes nest like a stack: `rollback_nested` and `release_nested` always act
/// on the most recently opened scope. There is deliberately no way to roll
/// back the enclosing transaction through this trait.
#[async_trait]
pub trait TransactionScope: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a new nested scope (a savepoint).
    async fn begin_nested(&mut self) -> Result<(), Self::Error>;

    /// Discards the work done since the innermost scope was opened, and closes
    /// it. Work done before that scope is kept.
    async fn rollback_nested(&mut self) -> Result<(), Self::Error>;

    /// Closes the innermost scope, merging its work into the enclosing one.
    async fn release_nested(&mut self) -> Result<(), Self::Error>;
}

/// A datastore that enforces uniqueness on the key column of `R`.
#[async_trait]
pub trait Store<R: Record>: TransactionScope {
    /// Persists `record` with the key it currently carries.
    async fn insert(&mut self, record: &R, mode: InsertMode) -> Result<(), Self::Error>;

    /// Decides whether `failure` is a uniqueness violation on the key column
    /// of `R`, some other uniqueness violation, or anything else.
    fn classify(&self, failure: &Self::Error) -> FailureKind;
}
