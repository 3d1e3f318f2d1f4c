use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::Display;

/// A generated (or caller-supplied) primary key.
///
/// Keys are short, so they are kept inline in a [`SmolStr`] without a heap
/// allocation in the common case.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(SmolStr);

impl Key {
    /// Creates a key from any string-like value. No shape validation is
    /// performed; see [`KeyConfig::body_len`][crate::KeyConfig::body_len].
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(SmolStr::new(key))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters, including any prefix and suffix.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Key").field(&self.0).finish()
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_input() {
        let key = Key::new("Ada6z");
        assert_eq!(key.to_string(), "Ada6z");
        assert_eq!(key.as_str(), "Ada6z");
    }

    #[test]
    fn empty_key_is_empty() {
        assert!(Key::new("").is_empty());
        assert!(!Key::new("x").is_empty());
    }

    #[test]
    fn char_len_counts_characters_not_bytes() {
        assert_eq!(Key::new("ü-Ab").char_len(), 4);
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = Key::new("UFLX1");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"UFLX1\"");
        let back: Key = serde_json::from_str("\"UFLX1\"").unwrap();
        assert_eq!(back, key);
    }
}
