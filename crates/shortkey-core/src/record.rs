use crate::key::Key;

/// An entity whose primary key is assigned by the allocator.
///
/// The allocator only ever touches the key field; every other field belongs to
/// the persistence layer.
pub trait Record: Send + Sync {
    /// Returns the key currently held by the record, if any.
    fn key(&self) -> Option<&Key>;

    /// Assigns (or clears, with `None`) the record's key.
    fn set_key(&mut self, key: Option<Key>);

    /// Whether the record already carries a usable key.
    fn has_key(&self) -> bool {
        self.key().is_some_and(|key| !key.is_empty())
    }
}
