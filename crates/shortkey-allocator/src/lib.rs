//! Random primary-key allocation.
//!
//! [`KeyAllocator`] assigns short, hard-to-guess keys to records on insert.
//! It never checks for collisions itself: each candidate is inserted inside a
//! savepoint, and the store's unique constraint decides whether the key was
//! free. Collisions are retried with a fresh key, and the key grows by one
//! symbol whenever the attempt budget for the current length runs out.
//!
//! ```rust,no_run
//! use shortkey_allocator::KeyAllocator;
//! use shortkey_core::KeyConfig;
//! use shortkey_storage::MySqlStore;
//! # use shortkey_core::{Key, Record};
//! # use shortkey_storage::MySqlRecord;
//! # use sqlx::{mysql::{MySql, MySqlArguments}, query::Query};
//! # struct Note { id: Option<Key>, body: String }
//! # impl Record for Note {
//! #     fn key(&self) -> Option<&Key> { self.id.as_ref() }
//! #     fn set_key(&mut self, key: Option<Key>) { self.id = key; }
//! # }
//! # impl MySqlRecord for Note {
//! #     const TABLE: &'static str = "notes";
//! #     const KEY_COLUMN: &'static str = "id";
//! #     const COLUMNS: &'static [&'static str] = &["body"];
//! #     fn bind_columns<'q>(&'q self, q: Query<'q, MySql, MySqlArguments>) -> Query<'q, MySql, MySqlArguments> {
//! #         q.bind(self.body.as_str())
//! #     }
//! # }
//!
//! # async fn example(pool: sqlx::MySqlPool) -> Result<(), Box<dyn std::error::Error>> {
//! let allocator = KeyAllocator::new(KeyConfig::builder().prefix("n_").build())?;
//!
//! let mut tx = pool.begin().await?;
//! let mut note = Note { id: None, body: "hello".to_string() };
//! allocator.allocate(&mut MySqlStore::new(&mut tx), &mut note).await?;
//! tx.commit().await?;
//!
//! println!("stored as {}", note.key().unwrap());
//! # Ok(())
//! # }
//! ```

pub mod allocator;
mod attempt;

pub use allocator::{Allocation, KeyAllocator};
