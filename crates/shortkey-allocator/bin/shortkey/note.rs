use shortkey_core::{Key, Record};
use shortkey_storage::{InMemoryRecord, MySqlRecord};
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::query::Query;

/// Demo entity stored in the `notes` table.
#[derive(Debug, Clone)]
pub struct Note {
    pub id: Option<Key>,
    pub body: String,
}

impl Note {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: None,
            body: body.into(),
        }
    }

    /// DDL for the `notes` table, with the key column wide enough for any key
    /// the allocator can produce.
    pub fn create_table_sql(key_width: usize) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS notes (\
             id VARCHAR({key_width}) NOT NULL PRIMARY KEY, \
             body TEXT NOT NULL)"
        )
    }
}

impl Record for Note {
    fn key(&self) -> Option<&Key> {
        self.id.as_ref()
    }

    fn set_key(&mut self, key: Option<Key>) {
        self.id = key;
    }
}

impl InMemoryRecord for Note {}

impl MySqlRecord for Note {
    const TABLE: &'static str = "notes";
    const KEY_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["body"];

    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments> {
        query.bind(self.body.as_str())
    }
}
