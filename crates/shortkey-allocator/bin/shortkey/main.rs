mod cli;
mod note;

use crate::cli::{StorageBackendArg, CLI};
use crate::note::Note;
use anyhow::Context;
use clap::Parser;
use shortkey_allocator::{Allocation, KeyAllocator};
use shortkey_core::{Key, KeyConfig, Store};
use shortkey_storage::{InMemoryStore, MySqlStore, StorageError};
use sqlx::MySqlPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = CLI::try_parse()?;

    let key_config = KeyConfig::builder()
        .min_key_len(config.min_key_len)
        .max_key_len(config.max_key_len)
        .prefix(config.prefix)
        .suffix(config.suffix)
        .build();
    let allocator = KeyAllocator::new(key_config).context("invalid key configuration")?;

    info!(
        count = config.count,
        storage_backend = %config.storage,
        min_key_len = allocator.config().min_key_len(),
        max_key_len = allocator.config().max_key_len(),
        "allocating keys"
    );

    match config.storage {
        StorageBackendArg::InMemory => {
            let store = InMemoryStore::new();
            let mut tx = store.begin();
            let keys = allocate_notes(&allocator, &mut tx, config.count).await?;
            tx.commit();
            info!(allocated = keys.len(), rows = store.len(), "in-memory store populated");
        }
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .context("mysql dsn is required when storage backend is mysql")?;
            let pool = MySqlPool::connect(&mysql_dsn).await?;
            sqlx::raw_sql(&Note::create_table_sql(allocator.config().max_stored_len()))
                .execute(&pool)
                .await?;

            let mut tx = pool.begin().await?;
            let keys =
                allocate_notes(&allocator, &mut MySqlStore::new(&mut tx), config.count).await?;
            tx.commit().await?;
            info!(allocated = keys.len(), "mysql transaction committed");
        }
    }

    Ok(())
}

async fn allocate_notes<S>(
    allocator: &KeyAllocator,
    store: &mut S,
    count: usize,
) -> anyhow::Result<Vec<Key>>
where
    S: Store<Note, Error = StorageError>,
{
    let mut keys = Vec::with_capacity(count);

    for i in 0..count {
        let mut note = Note::new(format!("note #{i}"));
        let allocation = allocator.allocate(store, &mut note).await?;

        let key = note.id.clone().context("allocated note has no key")?;
        match allocation {
            Allocation::Generated { key_len, retries } => {
                info!(%key, key_len, retries, "allocated key");
            }
            Allocation::Existing => info!(%key, "stored existing key"),
        }
        keys.push(key);
    }

    Ok(keys)
}
