use crate::error::{Result, StorageError};
use async_trait::async_trait;
use shortkey_core::classify::{FailureClassifier, FailureReport};
use shortkey_core::{Backend, FailureKind, InsertMode, KeyTarget, Record, Store, TransactionScope};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection};
use sqlx::query::Query;
use sqlx::{Executor, Transaction};

/// Maps a record onto a MySQL table.
///
/// The key column is always bound first, followed by [`COLUMNS`](Self::COLUMNS)
/// in the order [`bind_columns`](Self::bind_columns) binds them.
pub trait MySqlRecord: Record {
    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;
    /// Unique index guarding the key column. `None` means it is the primary key.
    const KEY_INDEX: Option<&'static str> = None;
    /// Non-key columns written on insert.
    const COLUMNS: &'static [&'static str];

    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments>;

    fn key_target() -> KeyTarget {
        let target = KeyTarget::new(Self::TABLE, Self::KEY_COLUMN);
        match Self::KEY_INDEX {
            Some(index) => target.with_index(index),
            None => target,
        }
    }
}

/// A MySQL store bound to a caller-owned transaction.
///
/// Nested scopes are plain `SAVEPOINT`s, so a failed insert only rolls back
/// itself and never the caller's earlier work in the same transaction.
///
/// ```rust,no_run
/// # async fn example(pool: sqlx::MySqlPool) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tx = pool.begin().await?;
/// let mut store = shortkey_storage::MySqlStore::new(&mut tx);
/// // allocator.allocate(&mut store, &mut record).await?;
/// drop(store);
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MySqlStore<'c> {
    conn: &'c mut MySqlConnection,
    classifier: &'static dyn FailureClassifier,
    savepoints: usize,
}

impl<'c> MySqlStore<'c> {
    /// Creates a store that runs inside `tx`, classifying failures as MySQL.
    pub fn new(tx: &'c mut Transaction<'_, MySql>) -> Self {
        Self {
            conn: &mut **tx,
            classifier: Backend::MySql.classifier(),
            savepoints: 0,
        }
    }

    /// Replaces the failure classifier, e.g. for a MySQL-compatible server
    /// that words its errors differently.
    pub fn with_classifier(mut self, classifier: &'static dyn FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Number of open savepoints.
    pub fn depth(&self) -> usize {
        self.savepoints
    }

    /// Runs `sql` over the text protocol, which savepoint statements need.
    async fn execute_raw(&mut self, sql: &str) -> Result<()> {
        Executor::execute(&mut *self.conn, sql).await?;
        Ok(())
    }
}

fn savepoint_name(depth: usize) -> String {
    format!("shortkey_sp_{depth}")
}

fn insert_sql<R: MySqlRecord>(mode: InsertMode) -> String {
    let columns: Vec<String> = std::iter::once(R::KEY_COLUMN)
        .chain(R::COLUMNS.iter().copied())
        .map(|column| format!("`{column}`"))
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");

    let mut sql = format!(
        "INSERT INTO `{}` ({}) VALUES ({})",
        R::TABLE,
        columns.join(", "),
        placeholders
    );

    if mode == InsertMode::CreateOrUpdate {
        let updates = if R::COLUMNS.is_empty() {
            format!("`{0}` = `{0}`", R::KEY_COLUMN)
        } else {
            R::COLUMNS
                .iter()
                .map(|column| format!("`{column}` = VALUES(`{column}`)"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&updates);
    }

    sql
}

/// Classifies a sqlx error with `classifier`. Errors that didn't come from
/// the database itself (I/O, pool timeouts, decoding) are always fatal.
pub fn classify_sqlx(
    classifier: &dyn FailureClassifier,
    err: &sqlx::Error,
    target: &KeyTarget,
) -> FailureKind {
    let Some(db) = err.as_database_error() else {
        return FailureKind::Fatal;
    };

    let code = db.code();
    let report = FailureReport {
        sqlstate: code.as_deref(),
        unique_violation: db.is_unique_violation(),
        constraint: db.constraint(),
        message: db.message(),
    };

    classifier.classify(&report, target)
}

#[async_trait]
impl<'c> TransactionScope for MySqlStore<'c> {
    type Error = StorageError;

    async fn begin_nested(&mut self) -> Result<()> {
        let sql = format!("SAVEPOINT {}", savepoint_name(self.savepoints + 1));
        self.execute_raw(&sql).await?;
        self.savepoints += 1;
        Ok(())
    }

    async fn rollback_nested(&mut self) -> Result<()> {
        if self.savepoints == 0 {
            return Err(StorageError::NoSavepoint("roll back"));
        }
        let sql = format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(self.savepoints));
        self.execute_raw(&sql).await?;
        self.savepoints -= 1;
        Ok(())
    }

    async fn release_nested(&mut self) -> Result<()> {
        if self.savepoints == 0 {
            return Err(StorageError::NoSavepoint("release"));
        }
        let sql = format!("RELEASE SAVEPOINT {}", savepoint_name(self.savepoints));
        self.execute_raw(&sql).await?;
        self.savepoints -= 1;
        Ok(())
    }
}

#[async_trait]
impl<'c, R: MySqlRecord> Store<R> for MySqlStore<'c> {
    async fn insert(&mut self, record: &R, mode: InsertMode) -> Result<()> {
        let key = record
            .key()
            .filter(|key| !key.is_empty())
            .ok_or(StorageError::MissingKey)?;

        let sql = insert_sql::<R>(mode);
        let query = sqlx::query(&sql).bind(key.as_str());
        record.bind_columns(query).execute(&mut *self.conn).await?;

        Ok(())
    }

    fn classify(&self, failure: &StorageError) -> FailureKind {
        match failure {
            StorageError::Database(err) => classify_sqlx(self.classifier, err, &R::key_target()),
            _ => FailureKind::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortkey_core::Key;

    struct Note {
        id: Option<Key>,
        slug: String,
        body: String,
    }

    impl Record for Note {
        fn key(&self) -> Option<&Key> {
            self.id.as_ref()
        }

        fn set_key(&mut self, key: Option<Key>) {
            self.id = key;
        }
    }

    impl MySqlRecord for Note {
        const TABLE: &'static str = "notes";
        const KEY_COLUMN: &'static str = "id";
        const COLUMNS: &'static [&'static str] = &["slug", "body"];

        fn bind_columns<'q>(
            &'q self,
            query: Query<'q, MySql, MySqlArguments>,
        ) -> Query<'q, MySql, MySqlArguments> {
            query.bind(self.slug.as_str()).bind(self.body.as_str())
        }
    }

    struct Tag {
        id: Option<Key>,
    }

    impl Record for Tag {
        fn key(&self) -> Option<&Key> {
            self.id.as_ref()
        }

        fn set_key(&mut self, key: Option<Key>) {
            self.id = key;
        }
    }

    impl MySqlRecord for Tag {
        const TABLE: &'static str = "tags";
        const KEY_COLUMN: &'static str = "public_id";
        const KEY_INDEX: Option<&'static str> = Some("uq_tags_public_id");
        const COLUMNS: &'static [&'static str] = &[];

        fn bind_columns<'q>(
            &'q self,
            query: Query<'q, MySql, MySqlArguments>,
        ) -> Query<'q, MySql, MySqlArguments> {
            query
        }
    }

    #[test]
    fn create_sql_binds_key_first() {
        assert_eq!(
            insert_sql::<Note>(InsertMode::Create),
            "INSERT INTO `notes` (`id`, `slug`, `body`) VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn create_or_update_sql_updates_non_key_columns() {
        assert_eq!(
            insert_sql::<Note>(InsertMode::CreateOrUpdate),
            "INSERT INTO `notes` (`id`, `slug`, `body`) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE `slug` = VALUES(`slug`), `body` = VALUES(`body`)"
        );
    }

    #[test]
    fn create_or_update_sql_without_columns() {
        assert_eq!(
            insert_sql::<Tag>(InsertMode::CreateOrUpdate),
            "INSERT INTO `tags` (`public_id`) VALUES (?) \
             ON DUPLICATE KEY UPDATE `public_id` = `public_id`"
        );
    }

    #[test]
    fn key_target_uses_declared_index() {
        assert_eq!(Note::key_target(), KeyTarget::new("notes", "id"));
        assert_eq!(
            Tag::key_target(),
            KeyTarget::new("tags", "public_id").with_index("uq_tags_public_id")
        );
    }

    fn assert_send<T: Send>(_: &T) {}

    // Compile-time only: nested scope calls must stay `Send` to live inside
    // `#[async_trait]` methods.
    #[allow(dead_code)]
    fn savepoint_statements_are_send(store: &mut MySqlStore<'_>) {
        assert_send(&store.execute_raw("SAVEPOINT shortkey_sp_1"));
        assert_send(&TransactionScope::begin_nested(store));
    }

    #[test]
    fn savepoint_names_are_per_depth() {
        assert_eq!(savepoint_name(1), "shortkey_sp_1");
        assert_ne!(savepoint_name(1), savepoint_name(2));
    }

    #[test]
    fn non_database_errors_are_fatal() {
        let classifier = Backend::MySql.classifier();
        assert_eq!(
            classify_sqlx(classifier, &sqlx::Error::PoolTimedOut, &Note::key_target()),
            FailureKind::Fatal
        );
        assert_eq!(
            classify_sqlx(classifier, &sqlx::Error::RowNotFound, &Note::key_target()),
            FailureKind::Fatal
        );
    }
}
