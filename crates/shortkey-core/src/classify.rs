//! Backend-aware classification of store failures.
//!
//! Drivers report constraint violations in different shapes. Each backend gets
//! its own [`FailureClassifier`], which looks at a driver-neutral
//! [`FailureReport`] and decides whether the failure is a uniqueness violation
//! on the key column. Anything that can't be confirmed as such is reported as
//! something the allocator must not retry.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Outcome of classifying a failed insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The candidate key is already taken. The only retryable outcome.
    KeyUniquenessViolation,
    /// A unique constraint on some other column rejected the row.
    OtherUniquenessViolation,
    /// Anything else: connection loss, timeouts, malformed rows, ...
    Fatal,
}

impl FailureKind {
    pub fn is_key_collision(self) -> bool {
        self == FailureKind::KeyUniquenessViolation
    }
}

/// Identifies the key column a classifier should look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTarget {
    pub table: &'static str,
    pub column: &'static str,
    /// Name of the unique index or constraint guarding the column. When unset
    /// the backend's primary-key naming convention is assumed.
    pub index: Option<&'static str>,
}

impl KeyTarget {
    pub const fn new(table: &'static str, column: &'static str) -> Self {
        Self {
            table,
            column,
            index: None,
        }
    }

    pub const fn with_index(mut self, index: &'static str) -> Self {
        self.index = Some(index);
        self
    }
}

/// The parts of a driver error that classifiers look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureReport<'a> {
    /// SQLSTATE, or the driver's own code when it has no SQLSTATE.
    pub sqlstate: Option<&'a str>,
    /// Whether the driver itself flagged the error as a unique violation.
    pub unique_violation: bool,
    /// Constraint name, for drivers that report it as a structured field.
    pub constraint: Option<&'a str>,
    pub message: &'a str,
}

/// Strategy for recognising key collisions in one backend's failures.
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    fn backend(&self) -> Backend;

    fn classify(&self, report: &FailureReport<'_>, target: &KeyTarget) -> FailureKind;
}

/// Database backends with a known failure shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    MySql,
    Postgres,
    Sqlite,
}

impl Backend {
    /// Returns the classifier registered for this backend.
    pub fn classifier(self) -> &'static dyn FailureClassifier {
        match self {
            Backend::MySql => &MySqlClassifier,
            Backend::Postgres => &PostgresClassifier,
            Backend::Sqlite => &SqliteClassifier,
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::MySql => write!(f, "mysql"),
            Backend::Postgres => write!(f, "postgres"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// MySQL / MariaDB.
///
/// `Duplicate entry 'abc' for key 'PRIMARY'`, or since MySQL 8.0.19
/// `Duplicate entry 'abc' for key 'notes.PRIMARY'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlClassifier;

const MYSQL_DUPLICATE_ENTRY: &str = "Duplicate entry ";
const MYSQL_FOR_KEY: &str = " for key '";
const MYSQL_PRIMARY: &str = "PRIMARY";

impl FailureClassifier for MySqlClassifier {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    fn classify(&self, report: &FailureReport<'_>, target: &KeyTarget) -> FailureKind {
        if !report.unique_violation && !report.message.starts_with(MYSQL_DUPLICATE_ENTRY) {
            return FailureKind::Fatal;
        }

        // The duplicated value is quoted earlier in the message and may itself
        // contain the marker, so take the last occurrence.
        let Some(name) = report
            .message
            .rsplit_once(MYSQL_FOR_KEY)
            .and_then(|(_, rest)| rest.strip_suffix('\''))
        else {
            return FailureKind::OtherUniquenessViolation;
        };

        let index = target.index.unwrap_or(MYSQL_PRIMARY);
        let qualified = name
            .strip_prefix(target.table)
            .and_then(|rest| rest.strip_prefix('.'));

        if name == index || qualified == Some(index) {
            FailureKind::KeyUniquenessViolation
        } else {
            FailureKind::OtherUniquenessViolation
        }
    }
}

/// PostgreSQL.
///
/// SQLSTATE `23505` with the constraint name in a structured field, or quoted
/// in `duplicate key value violates unique constraint "notes_pkey"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresClassifier;

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_UNIQUE_CONSTRAINT: &str = "unique constraint \"";

impl FailureClassifier for PostgresClassifier {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn classify(&self, report: &FailureReport<'_>, target: &KeyTarget) -> FailureKind {
        if !report.unique_violation && report.sqlstate != Some(PG_UNIQUE_VIOLATION) {
            return FailureKind::Fatal;
        }

        let name = report.constraint.or_else(|| {
            let (_, rest) = report.message.split_once(PG_UNIQUE_CONSTRAINT)?;
            rest.split_once('"').map(|(name, _)| name)
        });

        let Some(name) = name else {
            return FailureKind::OtherUniquenessViolation;
        };

        let matches = match target.index {
            Some(index) => name == index,
            None => name.strip_suffix("_pkey") == Some(target.table),
        };

        if matches {
            FailureKind::KeyUniquenessViolation
        } else {
            FailureKind::OtherUniquenessViolation
        }
    }
}

/// SQLite.
///
/// `UNIQUE constraint failed: notes.id`, extended result codes 2067
/// (`SQLITE_CONSTRAINT_UNIQUE`) and 1555 (`SQLITE_CONSTRAINT_PRIMARYKEY`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteClassifier;

const SQLITE_UNIQUE_CODES: [&str; 2] = ["2067", "1555"];
const SQLITE_UNIQUE_FAILED: &str = "UNIQUE constraint failed: ";

impl FailureClassifier for SqliteClassifier {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn classify(&self, report: &FailureReport<'_>, target: &KeyTarget) -> FailureKind {
        let coded = report
            .sqlstate
            .is_some_and(|code| SQLITE_UNIQUE_CODES.contains(&code));
        let columns = report.message.strip_prefix(SQLITE_UNIQUE_FAILED);

        if !report.unique_violation && !coded && columns.is_none() {
            return FailureKind::Fatal;
        }

        // A composite index lists several columns; that's never the key alone.
        let single = columns.filter(|columns| !columns.contains(", "));
        let matches = single
            .and_then(|column| column.strip_prefix(target.table))
            .and_then(|rest| rest.strip_prefix('.'))
            == Some(target.column);

        if matches {
            FailureKind::KeyUniquenessViolation
        } else {
            FailureKind::OtherUniquenessViolation
        }
    }
}
