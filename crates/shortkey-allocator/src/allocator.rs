use crate::attempt::AttemptState;
use shortkey_core::{AllocateError, ConfigError, InsertMode, KeyConfig, Record, Store};
use shortkey_generator::{KeyGenerator, RandomKeyGenerator};
use std::any::type_name;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a successful [`KeyAllocator::save`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// The record already had a key and was inserted as-is.
    Existing,
    /// A fresh key was generated and stored.
    Generated {
        /// Body length of the key that was stored.
        key_len: usize,
        /// Collisions hit before the key was accepted.
        retries: u32,
    },
}

/// Assigns random keys to records of one entity type.
///
/// The allocator holds no per-call state and can be shared between tasks;
/// all coordination between concurrent writers happens in the store's unique
/// constraint.
#[derive(Debug, Clone)]
pub struct KeyAllocator<G = RandomKeyGenerator> {
    config: Arc<KeyConfig>,
    generator: G,
}

impl KeyAllocator<RandomKeyGenerator> {
    /// Creates an allocator drawing keys at random from `config`'s alphabets.
    pub fn new(config: KeyConfig) -> Result<Self, ConfigError> {
        let generator = RandomKeyGenerator::new(&config);
        Self::with_generator(config, generator)
    }
}

impl<G: KeyGenerator> KeyAllocator<G> {
    /// Creates an allocator with a custom key generator.
    pub fn with_generator(config: KeyConfig, generator: G) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            generator,
        })
    }

    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    /// Inserts `record`, generating a key for it unless it already has one.
    ///
    /// Shorthand for [`save`](Self::save) with [`InsertMode::Create`].
    pub async fn allocate<R, S>(
        &self,
        store: &mut S,
        record: &mut R,
    ) -> Result<Allocation, AllocateError<S::Error>>
    where
        R: Record,
        S: Store<R> + ?Sized,
    {
        self.save(store, record, InsertMode::Create).await
    }

    /// Inserts `record` into `store`.
    ///
    /// A record that already carries a key is passed straight through with
    /// `mode`, exactly once, whatever the outcome. Otherwise candidate keys are
    /// generated and inserted with [`InsertMode::Create`], each inside its own
    /// nested scope, until one is accepted or the attempt budget over
    /// `[min_key_len, max_key_len]` is spent.
    ///
    /// Only key collisions are retried. Any other failure is returned as-is
    /// after rolling back the nested scope. On every error path the record's
    /// key is cleared, so it never holds an unsaved candidate.
    #[instrument(skip_all, fields(record_type = type_name::<R>()))]
    pub async fn save<R, S>(
        &self,
        store: &mut S,
        record: &mut R,
        mode: InsertMode,
    ) -> Result<Allocation, AllocateError<S::Error>>
    where
        R: Record,
        S: Store<R> + ?Sized,
    {
        if record.has_key() {
            debug!("record already has a key, inserting as-is");
            store.insert(record, mode).await.map_err(AllocateError::Store)?;
            return Ok(Allocation::Existing);
        }

        let mut state = AttemptState::new(&self.config);
        while state.has_budget() {
            record.set_key(Some(self.generator.generate(state.key_len())));

            store
                .begin_nested()
                .await
                .map_err(|err| abandon(record, err))?;

            let failure = match store.insert(record, InsertMode::Create).await {
                Ok(()) => {
                    store
                        .release_nested()
                        .await
                        .map_err(|err| abandon(record, err))?;
                    return Ok(Allocation::Generated {
                        key_len: state.key_len(),
                        retries: state.retries(),
                    });
                }
                Err(failure) => failure,
            };

            if !store.classify(&failure).is_key_collision() {
                if let Err(err) = store.rollback_nested().await {
                    warn!(error = %err, "failed to roll back nested scope after store failure");
                }
                return Err(abandon(record, failure));
            }

            store
                .rollback_nested()
                .await
                .map_err(|err| abandon(record, err))?;

            debug!(
                key_len = state.key_len(),
                attempts_at_len = state.attempts_at_len() + 1,
                retries = state.retries() + 1,
                "key collision"
            );
            if let Some(key_len) = state.record_collision() {
                if state.has_budget() {
                    info!(key_len, "growing key length after repeated collisions");
                }
            }
        }

        record.set_key(None);
        warn!(
            attempts = state.retries(),
            max_key_len = self.config.max_key_len(),
            "could not allocate a unique key"
        );
        Err(AllocateError::KeyspaceExhausted {
            record_type: type_name::<R>(),
            attempts: state.retries(),
        })
    }
}

/// Leaves `record` without a key and wraps the store failure.
fn abandon<R: Record, E>(record: &mut R, err: E) -> AllocateError<E> {
    record.set_key(None);
    AllocateError::Store(err)
}
