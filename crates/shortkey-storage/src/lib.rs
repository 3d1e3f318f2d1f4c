//! Store implementations for the key allocator.
//!
//! - [`InMemoryStore`]: DashMap-backed tables with savepoints kept as
//!   positions in an undo log. Useful for tests and single-process tools.
//! - [`MySqlStore`]: runs inserts and savepoints inside a caller-owned sqlx
//!   transaction and classifies driver failures with a backend classifier.

pub mod error;
pub mod memory;
pub mod mysql;

pub use error::{Result, StorageError};
pub use memory::{InMemoryRecord, InMemoryStore, InMemoryTransaction};
pub use mysql::{MySqlRecord, MySqlStore};
