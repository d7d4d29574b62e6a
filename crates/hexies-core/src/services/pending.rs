//! Per-key exclusion for operations that must not interleave

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::data::{HexiesError, HexiesResult};

/// Keys with an operation outstanding.
#[derive(Debug)]
pub struct PendingSet<K> {
    keys: Mutex<HashSet<K>>,
}

impl<K: Eq + Hash + Clone + Display> PendingSet<K> {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashSet::new()),
        }
    }

    /// Marks `key` as busy until the returned guard is dropped.
    /// Fails with `OperationInProgress` if it is already busy.
    pub fn acquire(&self, key: &K) -> HexiesResult<PendingGuard<'_, K>> {
        if !self.keys.lock().insert(key.clone()) {
            return Err(HexiesError::OperationInProgress {
                target: key.to_string(),
            });
        }
        Ok(PendingGuard {
            set: self,
            key: key.clone(),
        })
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys.lock().contains(key)
    }
}

impl<K: Eq + Hash + Clone + Display> Default for PendingSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PendingGuard<'a, K: Eq + Hash> {
    set: &'a PendingSet<K>,
    key: K,
}

impl<K: Eq + Hash> Drop for PendingGuard<'_, K> {
    fn drop(&mut self) {
        self.set.keys.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ItemId;

    #[test]
    fn test_guard_releases_on_drop() {
        let pending = PendingSet::new();
        let id = ItemId::new("i-1");

        let guard = pending.acquire(&id).unwrap();
        assert!(pending.contains(&id));
        assert!(matches!(
            pending.acquire(&id),
            Err(HexiesError::OperationInProgress { .. })
        ));

        drop(guard);
        assert!(!pending.contains(&id));
        assert!(pending.acquire(&id).is_ok());
    }
}
