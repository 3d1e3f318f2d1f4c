//! Core types and traits for random primary-key allocation.
//!
//! This crate provides the key value type, the per-entity key configuration,
//! and the narrow collaborator traits (`Record`, `Store`, `TransactionScope`)
//! that the allocator drives. Backend-aware failure classifiers live in
//! [`classify`].

pub mod classify;
pub mod config;
pub mod error;
pub mod key;
pub mod record;
pub mod store;

pub use classify::{Backend, FailureClassifier, FailureKind, FailureReport, KeyTarget};
pub use config::{Alphabet, AttemptBudget, KeyConfig};
pub use error::{AllocateError, ConfigError};
pub use key::Key;
pub use record::Record;
pub use store::{InsertMode, Store, TransactionScope};
