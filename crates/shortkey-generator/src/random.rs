use crate::KeyGenerator;
use rand::Rng;
use shortkey_core::{Alphabet, Key, KeyConfig};

/// Generates URL-shortener style keys from a [`KeyConfig`].
///
/// A key is `prefix + first + rest + suffix`, where `first` is one symbol from
/// the first-character alphabet and `rest` is `key_len - 1` symbols drawn
/// independently and uniformly from the remaining-character alphabet. Keys are
/// hard to guess, not cryptographically unpredictable.
#[derive(Debug, Clone)]
pub struct RandomKeyGenerator {
    prefix: String,
    suffix: String,
    first_chars: Alphabet,
    rest_chars: Alphabet,
}

impl RandomKeyGenerator {
    pub fn new(config: &KeyConfig) -> Self {
        Self {
            prefix: config.prefix().to_owned(),
            suffix: config.suffix().to_owned(),
            first_chars: config.first_chars().clone(),
            rest_chars: config.rest_chars().clone(),
        }
    }

    /// Generates a key using the given random source.
    ///
    /// A `key_len` of zero still yields one leading symbol; configs are
    /// validated to start at length 1 so the allocator never asks for it.
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R, key_len: usize) -> Key {
        let mut key = String::with_capacity(
            self.prefix.len() + key_len * 4 + self.suffix.len(),
        );

        key.push_str(&self.prefix);
        key.push(pick(rng, &self.first_chars));
        for _ in 1..key_len {
            key.push(pick(rng, &self.rest_chars));
        }
        key.push_str(&self.suffix);

        Key::new(key)
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, alphabet: &Alphabet) -> char {
    let symbols = alphabet.symbols();
    symbols[rng.random_range(0..symbols.len())]
}

impl KeyGenerator for RandomKeyGenerator {
    fn generate(&self, key_len: usize) -> Key {
        self.generate_with(&mut rand::rng(), key_len)
    }
}
