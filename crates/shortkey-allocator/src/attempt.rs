use shortkey_core::{AttemptBudget, KeyConfig};

/// Bookkeeping for a single allocation. Created when an allocation starts and
/// dropped when it ends.
#[derive(Debug, Clone)]
pub(crate) struct AttemptState {
    key_len: usize,
    max_key_len: usize,
    attempts_at_len: u32,
    retries: u32,
    budget: AttemptBudget,
    /// Set once the key length can't grow any further.
    spent: bool,
}

impl AttemptState {
    pub(crate) fn new(config: &KeyConfig) -> Self {
        Self {
            key_len: config.min_key_len(),
            max_key_len: config.max_key_len(),
            attempts_at_len: 0,
            retries: 0,
            budget: config.attempt_budget(),
            spent: false,
        }
    }

    /// Key body length for the next attempt.
    pub(crate) fn key_len(&self) -> usize {
        self.key_len
    }

    /// Collisions seen at the current length.
    pub(crate) fn attempts_at_len(&self) -> u32 {
        self.attempts_at_len
    }

    /// Collisions seen so far, across all lengths.
    pub(crate) fn retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn has_budget(&self) -> bool {
        !self.spent && self.key_len <= self.max_key_len
    }

    /// Records a collision. Returns the new key length if the budget for the
    /// current length is spent.
    pub(crate) fn record_collision(&mut self) -> Option<usize> {
        self.retries = self.retries.saturating_add(1);
        self.attempts_at_len = self.attempts_at_len.saturating_add(1);

        if self.attempts_at_len < self.budget.attempts_at(self.key_len) {
            return None;
        }

        self.attempts_at_len = 0;
        match self.key_len.checked_add(1) {
            Some(key_len) => {
                self.key_len = key_len;
                Some(key_len)
            }
            None => {
                self.spent = true;
                None
            }
        }
    }
}
