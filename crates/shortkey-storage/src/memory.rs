use crate::error::{Result, StorageError};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shortkey_core::{FailureKind, InsertMode, Key, Record, Store, TransactionScope};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Name reported for the key column in [`StorageError::UniqueViolation`].
pub const KEY_COLUMN: &str = "key";

/// A record that can be kept in an [`InMemoryStore`].
pub trait InMemoryRecord: Record + Clone + 'static {
    /// Values of the record's other uniquely constrained columns, as
    /// `(column, value)` pairs.
    fn unique_fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

type UniqueSlot = (&'static str, String);

/// A stored record, tagged with the write that put it there.
#[derive(Debug)]
struct Row<R> {
    record: R,
    stamp: u64,
}

#[derive(Debug)]
struct Tables<R> {
    rows: DashMap<Key, Row<R>>,
    /// Secondary unique columns, mapped to the key of the row owning them.
    uniques: DashMap<UniqueSlot, Key>,
    next_stamp: AtomicU64,
}

impl<R> Tables<R> {
    fn stamp(&self) -> u64 {
        self.next_stamp.fetch_add(1, Ordering::Relaxed)
    }

    fn release_uniques(&self, key: &Key, slots: &[UniqueSlot]) {
        for slot in slots {
            self.uniques.remove_if(slot, |_, owner| owner == key);
        }
    }
}

/// In-memory tables keyed by [`Key`], using DashMap.
///
/// Writes go through an [`InMemoryTransaction`]. They are visible to other
/// transactions immediately, which is what makes the uniqueness check atomic:
/// DashMap's entry API claims a key under its shard lock, so of two racing
/// inserts with the same key exactly one wins.
#[derive(Debug)]
pub struct InMemoryStore<R> {
    tables: Arc<Tables<R>>,
}

impl<R> Clone for InMemoryStore<R> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
        }
    }
}

impl<R: InMemoryRecord> InMemoryStore<R> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty store with room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tables: Arc::new(Tables {
                rows: DashMap::with_capacity(capacity),
                uniques: DashMap::new(),
                next_stamp: AtomicU64::new(0),
            }),
        }
    }

    /// Starts a transaction against this store.
    pub fn begin(&self) -> InMemoryTransaction<R> {
        InMemoryTransaction {
            tables: Arc::clone(&self.tables),
            undo: Vec::new(),
            savepoints: Vec::new(),
            fault: None,
            finished: false,
        }
    }

    pub fn get(&self, key: &Key) -> Option<R> {
        self.tables.rows.get(key).map(|row| row.record.clone())
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.tables.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tables.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.rows.is_empty()
    }
}

impl<R: InMemoryRecord> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Undo<R> {
    key: Key,
    /// Stamp of the row this write stored.
    stamp: u64,
    /// Row replaced by an update, `None` for a fresh insert.
    previous: Option<Row<R>>,
    claimed: Vec<UniqueSlot>,
    released: Vec<UniqueSlot>,
}

/// A transaction over an [`InMemoryStore`].
///
/// Savepoints are positions in an undo log. Dropping the transaction without
/// calling [`commit`](Self::commit) rolls everything back.
///
/// There is no isolation: another transaction may overwrite a row this one
/// has not committed yet with [`InsertMode::CreateOrUpdate`]. Rolling back
/// then leaves the overwriting row alone instead of removing or restoring it.
#[derive(Debug)]
pub struct InMemoryTransaction<R: InMemoryRecord> {
    tables: Arc<Tables<R>>,
    undo: Vec<Undo<R>>,
    savepoints: Vec<usize>,
    fault: Option<StorageError>,
    finished: bool,
}

impl<R: InMemoryRecord> InMemoryTransaction<R> {
    /// Makes the next insert fail with `err` without touching any table.
    pub fn fail_next_insert(&mut self, err: StorageError) {
        self.fault = Some(err);
    }

    /// Number of open savepoints.
    pub fn depth(&self) -> usize {
        self.savepoints.len()
    }

    /// Keeps every write made by this transaction.
    pub fn commit(mut self) {
        self.undo.clear();
        self.savepoints.clear();
        self.finished = true;
    }

    /// Undoes every write made by this transaction.
    pub fn rollback(mut self) {
        self.rollback_to(0);
        self.finished = true;
    }

    fn rollback_to(&mut self, mark: usize) {
        while self.undo.len() > mark {
            let Some(entry) = self.undo.pop() else {
                break;
            };

            let undone = match entry.previous {
                Some(row) => match self.tables.rows.get_mut(&entry.key) {
                    Some(mut current) if current.stamp == entry.stamp => {
                        *current = row;
                        true
                    }
                    _ => false,
                },
                None => self
                    .tables
                    .rows
                    .remove_if(&entry.key, |_, row| row.stamp == entry.stamp)
                    .is_some(),
            };
            // overwritten by another transaction since
            if !undone {
                continue;
            }

            self.tables.release_uniques(&entry.key, &entry.claimed);
            for slot in entry.released {
                self.tables.uniques.insert(slot, entry.key.clone());
            }
        }
    }

    fn insert_row(&mut self, record: &R, mode: InsertMode) -> Result<()> {
        if let Some(err) = self.fault.take() {
            return Err(err);
        }

        let key = record
            .key()
            .filter(|key| !key.is_empty())
            .cloned()
            .ok_or(StorageError::MissingKey)?;

        let fields = record.unique_fields();
        let mut claimed = Vec::new();
        for (column, value) in &fields {
            let taken = match self.tables.uniques.entry((*column, value.clone())) {
                Entry::Occupied(owner) => owner.get() != &key,
                Entry::Vacant(slot) => {
                    slot.insert(key.clone());
                    claimed.push((*column, value.clone()));
                    false
                }
            };

            if taken {
                self.tables.release_uniques(&key, &claimed);
                return Err(StorageError::UniqueViolation {
                    column: *column,
                    value: value.clone(),
                });
            }
        }

        let stamp = self.tables.stamp();
        let row = Row {
            record: record.clone(),
            stamp,
        };
        let previous = match self.tables.rows.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(row);
                Ok(None)
            }
            Entry::Occupied(mut current) if mode == InsertMode::CreateOrUpdate => {
                Ok(Some(current.insert(row)))
            }
            Entry::Occupied(_) => Err(()),
        };

        let Ok(previous) = previous else {
            self.tables.release_uniques(&key, &claimed);
            return Err(StorageError::UniqueViolation {
                column: KEY_COLUMN,
                value: key.to_string(),
            });
        };

        // An update gives up the unique values the old row held and the new
        // one doesn't.
        let mut released = Vec::new();
        if let Some(previous) = &previous {
            for slot in previous.record.unique_fields() {
                if !fields.contains(&slot)
                    && self
                        .tables
                        .uniques
                        .remove_if(&slot, |_, owner| owner == &key)
                        .is_some()
                {
                    released.push(slot);
                }
            }
        }

        self.undo.push(Undo {
            key,
            stamp,
            previous,
            claimed,
            released,
        });
        Ok(())
    }
}

impl<R: InMemoryRecord> Drop for InMemoryTransaction<R> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_to(0);
        }
    }
}

#[async_trait]
impl<R: InMemoryRecord> TransactionScope for InMemoryTransaction<R> {
    type Error = StorageError;

    async fn begin_nested(&mut self) -> Result<()> {
        self.savepoints.push(self.undo.len());
        Ok(())
    }

    async fn rollback_nested(&mut self) -> Result<()> {
        let mark = self
            .savepoints
            .pop()
            .ok_or(StorageError::NoSavepoint("roll back"))?;
        self.rollback_to(mark);
        Ok(())
    }

    async fn release_nested(&mut self) -> Result<()> {
        self.savepoints
            .pop()
            .map(|_| ())
            .ok_or(StorageError::NoSavepoint("release"))
    }
}

#[async_trait]
impl<R: InMemoryRecord> Store<R> for InMemoryTransaction<R> {
    async fn insert(&mut self, record: &R, mode: InsertMode) -> Result<()> {
        self.insert_row(record, mode)
    }

    fn classify(&self, failure: &StorageError) -> FailureKind {
        match failure {
            StorageError::UniqueViolation { column, .. } if *column == KEY_COLUMN => {
                FailureKind::KeyUniquenessViolation
            }
            StorageError::UniqueViolation { .. } => FailureKind::OtherUniquenessViolation,
            _ => FailureKind::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        key: Option<Key>,
        slug: String,
    }

    impl Record for Note {
        fn key(&self) -> Option<&Key> {
            self.key.as_ref()
        }

        fn set_key(&mut self, key: Option<Key>) {
            self.key = key;
        }
    }

    impl InMemoryRecord for Note {
        fn unique_fields(&self) -> Vec<(&'static str, String)> {
            vec![("slug", self.slug.clone())]
        }
    }

    fn note(key: &str, slug: &str) -> Note {
        Note {
            key: Some(Key::new(key)),
            slug: slug.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();

        tx.insert(&note("Ada6z", "hello"), InsertMode::Create)
            .await
            .unwrap();
        tx.commit();

        let got = store.get(&Key::new("Ada6z")).unwrap();
        assert_eq!(got.slug, "hello");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let store = InMemoryStore::<Note>::new();
        assert!(store.get(&Key::new("nope")).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_key_is_a_key_violation() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();

        tx.insert(&note("Ada6z", "one"), InsertMode::Create)
            .await
            .unwrap();
        let err = tx
            .insert(&note("Ada6z", "two"), InsertMode::Create)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::UniqueViolation {
                column: KEY_COLUMN,
                ..
            }
        ));
        assert_eq!(
            Store::<Note>::classify(&tx, &err),
            FailureKind::KeyUniquenessViolation
        );
        // the losing insert must not leave its slug claimed
        tx.insert(&note("UFLX1", "two"), InsertMode::Create)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_slug_is_another_violation() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();

        tx.insert(&note("Ada6z", "same"), InsertMode::Create)
            .await
            .unwrap();
        let err = tx
            .insert(&note("UFLX1", "same"), InsertMode::Create)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::UniqueViolation { column: "slug", .. }
        ));
        assert_eq!(
            Store::<Note>::classify(&tx, &err),
            FailureKind::OtherUniquenessViolation
        );
        assert!(!store.contains(&Key::new("UFLX1")));
    }

    #[tokio::test]
    async fn create_or_update_overwrites() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();

        tx.insert(&note("Ada6z", "old"), InsertMode::Create)
            .await
            .unwrap();
        tx.insert(&note("Ada6z", "new"), InsertMode::CreateOrUpdate)
            .await
            .unwrap();
        tx.commit();

        assert_eq!(store.get(&Key::new("Ada6z")).unwrap().slug, "new");

        // the old slug is free again
        let mut tx = store.begin();
        tx.insert(&note("UFLX1", "old"), InsertMode::Create)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_key_is_fatal() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();
        let keyless = Note {
            key: None,
            slug: "x".to_string(),
        };

        let err = tx.insert(&keyless, InsertMode::Create).await.unwrap_err();

        assert!(matches!(err, StorageError::MissingKey));
        assert_eq!(Store::<Note>::classify(&tx, &err), FailureKind::Fatal);
    }

    #[tokio::test]
    async fn nested_rollback_keeps_outer_work() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();

        tx.insert(&note("Outer", "outer"), InsertMode::Create)
            .await
            .unwrap();
        TransactionScope::begin_nested(&mut tx).await.unwrap();
        tx.insert(&note("Inner", "inner"), InsertMode::Create)
            .await
            .unwrap();
        TransactionScope::rollback_nested(&mut tx).await.unwrap();
        tx.commit();

        assert!(store.contains(&Key::new("Outer")));
        assert!(!store.contains(&Key::new("Inner")));
    }

    #[tokio::test]
    async fn nested_rollback_restores_updated_row() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();

        tx.insert(&note("Ada6z", "old"), InsertMode::Create)
            .await
            .unwrap();
        TransactionScope::begin_nested(&mut tx).await.unwrap();
        tx.insert(&note("Ada6z", "new"), InsertMode::CreateOrUpdate)
            .await
            .unwrap();
        TransactionScope::rollback_nested(&mut tx).await.unwrap();
        tx.commit();

        assert_eq!(store.get(&Key::new("Ada6z")).unwrap().slug, "old");
        let mut tx = store.begin();
        let err = tx
            .insert(&note("UFLX1", "old"), InsertMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UniqueViolation { column: "slug", .. }));
    }

    #[tokio::test]
    async fn rollback_leaves_rows_overwritten_by_another_transaction() {
        let store = InMemoryStore::new();
        let mut first = store.begin();
        let mut second = store.begin();

        first
            .insert(&note("Ada6z", "first"), InsertMode::Create)
            .await
            .unwrap();
        second
            .insert(&note("Ada6z", "second"), InsertMode::CreateOrUpdate)
            .await
            .unwrap();
        first.rollback();
        second.commit();

        assert_eq!(store.get(&Key::new("Ada6z")).unwrap().slug, "second");
        let mut tx = store.begin();
        let err = tx
            .insert(&note("UFLX1", "second"), InsertMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UniqueViolation { column: "slug", .. }));
    }

    #[tokio::test]
    async fn released_scope_merges_into_outer() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();

        TransactionScope::begin_nested(&mut tx).await.unwrap();
        tx.insert(&note("Inner", "inner"), InsertMode::Create)
            .await
            .unwrap();
        TransactionScope::release_nested(&mut tx).await.unwrap();
        assert_eq!(tx.depth(), 0);

        // still undone by the outer rollback
        tx.rollback();
        assert!(!store.contains(&Key::new("Inner")));
    }

    #[tokio::test]
    async fn dropping_uncommitted_transaction_rolls_back() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin();
            tx.insert(&note("Ada6z", "hello"), InsertMode::Create)
                .await
                .unwrap();
            assert!(store.contains(&Key::new("Ada6z")));
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn closing_without_savepoint_fails() {
        let store = InMemoryStore::<Note>::new();
        let mut tx = store.begin();

        assert!(matches!(
            TransactionScope::rollback_nested(&mut tx).await,
            Err(StorageError::NoSavepoint(_))
        ));
        assert!(matches!(
            TransactionScope::release_nested(&mut tx).await,
            Err(StorageError::NoSavepoint(_))
        ));
    }

    #[tokio::test]
    async fn injected_fault_fails_next_insert_only() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();
        tx.fail_next_insert(StorageError::Timeout("injected".to_string()));

        let err = tx
            .insert(&note("Ada6z", "hello"), InsertMode::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout(_)));
        assert_eq!(Store::<Note>::classify(&tx, &err), FailureKind::Fatal);

        tx.insert(&note("Ada6z", "hello"), InsertMode::Create)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_inserts_of_one_key_have_one_winner() {
        let store = InMemoryStore::new();
        let mut handles = vec![];

        for i in 0..10u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut tx = store.begin();
                let result = tx
                    .insert(&note("Shared", &format!("slug-{i}")), InsertMode::Create)
                    .await;
                tx.commit();
                result.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }
}
