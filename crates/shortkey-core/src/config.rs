use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use typed_builder::TypedBuilder;

pub const DEFAULT_MIN_KEY_LEN: usize = 5;
pub const DEFAULT_MAX_KEY_LEN: usize = 9;

const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";

/// A set of symbols keys are drawn from.
///
/// Every symbol appears exactly once, so picking a uniform index picks a
/// uniform symbol.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Alphabet(Box<[char]>);

impl Alphabet {
    /// Creates an alphabet from the symbols of `symbols`.
    pub fn new(symbols: &str) -> Result<Self, ConfigError> {
        let mut seen = Vec::with_capacity(symbols.len());
        for c in symbols.chars() {
            if seen.contains(&c) {
                return Err(ConfigError::DuplicateSymbol(c));
            }
            seen.push(c);
        }

        if seen.is_empty() {
            return Err(ConfigError::EmptyAlphabet);
        }

        Ok(Self(seen.into_boxed_slice()))
    }

    /// Upper and lower case ASCII letters.
    pub fn letters() -> Self {
        Self(LETTERS.chars().collect())
    }

    /// Digits followed by upper and lower case ASCII letters.
    pub fn alphanumeric() -> Self {
        Self(DIGITS.chars().chain(LETTERS.chars()).collect())
    }

    pub fn symbols(&self) -> &[char] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        self.0.contains(&c)
    }
}

impl std::fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Alphabet").field(&self.to_string()).finish()
    }
}

impl Display for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

impl TryFrom<String> for Alphabet {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Alphabet> for String {
    fn from(value: Alphabet) -> Self {
        value.to_string()
    }
}

/// How many consecutive collisions are tolerated at one key length before the
/// allocator moves on to the next length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptBudget {
    /// As many attempts as the key body is long: few cheap tries at short
    /// lengths, more tries once the keyspace is large.
    #[default]
    KeyLength,
    /// The same number of attempts at every length.
    Fixed(u32),
    /// `key_len * factor` attempts.
    Scaled(u32),
}

impl AttemptBudget {
    /// Attempts allowed at `key_len` before growing the key.
    pub fn attempts_at(&self, key_len: usize) -> u32 {
        let key_len = u32::try_from(key_len).unwrap_or(u32::MAX);
        match *self {
            AttemptBudget::KeyLength => key_len,
            AttemptBudget::Fixed(attempts) => attempts,
            AttemptBudget::Scaled(factor) => key_len.saturating_mul(factor),
        }
    }

    /// Whether some key length in `[1, usize::MAX]` gets no attempts at all.
    /// `KeyLength` always grants at least one attempt since key bodies are
    /// never empty.
    pub fn allows_zero_attempts(&self) -> bool {
        match *self {
            AttemptBudget::KeyLength => false,
            AttemptBudget::Fixed(attempts) => attempts == 0,
            AttemptBudget::Scaled(factor) => factor == 0,
        }
    }

    /// Total attempts made over `[min_key_len, max_key_len]` when every
    /// attempt collides.
    pub fn total_attempts(&self, min_key_len: usize, max_key_len: usize) -> u64 {
        (min_key_len..=max_key_len)
            .map(|len| u64::from(self.attempts_at(len)))
            .sum()
    }
}

/// Per-entity key configuration.
///
/// A config is validated once, when an allocator is built from it, and is
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Key body length used for the first attempt.
    #[builder(default = DEFAULT_MIN_KEY_LEN)]
    min_key_len: usize,
    /// Longest key body tried before giving up.
    #[builder(default = DEFAULT_MAX_KEY_LEN)]
    max_key_len: usize,
    /// Fixed text prepended to every key. Not counted in the key length.
    #[builder(default, setter(into))]
    prefix: String,
    /// Fixed text appended to every key. Not counted in the key length.
    #[builder(default, setter(into))]
    suffix: String,
    /// Symbols allowed in the first position of the key body.
    #[builder(default = Alphabet::letters())]
    first_chars: Alphabet,
    /// Symbols allowed in the remaining positions.
    #[builder(default = Alphabet::alphanumeric())]
    rest_chars: Alphabet,
    #[builder(default)]
    attempt_budget: AttemptBudget,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl KeyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_key_len == 0 {
            return Err(ConfigError::ZeroMinKeyLen);
        }

        if self.max_key_len < self.min_key_len {
            return Err(ConfigError::MaxBelowMin {
                min: self.min_key_len,
                max: self.max_key_len,
            });
        }

        // Alphabets built through `Alphabet::new` can't be empty, but the
        // builder takes them by value so check anyway.
        if self.first_chars.is_empty() || self.rest_chars.is_empty() {
            return Err(ConfigError::EmptyAlphabet);
        }

        if self.attempt_budget.allows_zero_attempts() {
            return Err(ConfigError::ZeroAttemptBudget);
        }

        Ok(())
    }

    pub fn min_key_len(&self) -> usize {
        self.min_key_len
    }

    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn first_chars(&self) -> &Alphabet {
        &self.first_chars
    }

    pub fn rest_chars(&self) -> &Alphabet {
        &self.rest_chars
    }

    pub fn attempt_budget(&self) -> AttemptBudget {
        self.attempt_budget
    }

    /// Widest key this config can produce, in characters. Suitable for sizing
    /// the key column.
    pub fn max_stored_len(&self) -> usize {
        self.prefix.chars().count() + self.max_key_len + self.suffix.chars().count()
    }

    /// Returns the key body length if `key` has the shape this config
    /// generates, `None` otherwise.
    pub fn body_len(&self, key: &str) -> Option<usize> {
        let body = key
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;

        let mut chars = body.chars();
        if !self.first_chars.contains(chars.next()?) {
            return None;
        }

        let mut len = 1;
        for c in chars {
            if !self.rest_chars.contains(c) {
                return None;
            }
            len += 1;
        }

        (self.min_key_len..=self.max_key_len)
            .contains(&len)
            .then_some(len)
    }
}
