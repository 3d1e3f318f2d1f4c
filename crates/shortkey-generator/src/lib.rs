pub mod random;

pub use random::RandomKeyGenerator;

use shortkey_core::Key;

/// Trait for producing candidate keys.
///
/// Implementations are pure generators that don't interact with storage: they
/// never check whether a key is already taken. Detecting collisions is the
/// store's job.
pub trait KeyGenerator: Send + Sync + 'static {
    /// Produces a candidate key whose body is `key_len` symbols long.
    fn generate(&self, key_len: usize) -> Key;
}
