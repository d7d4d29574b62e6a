//! In-memory implementation of CatalogCache
//!
//! Snapshots are kept serialized so a round trip behaves like the file cache.
//! All data is lost when the instance is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::data::{CacheError, UserId};
use crate::traits::{CachedCatalog, CatalogCache};

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogCache {
    entries: Arc<RwLock<HashMap<UserId, Vec<u8>>>>,
}

impl MemoryCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CatalogCache for MemoryCatalogCache {
    async fn load(&self, user: &UserId) -> Result<Option<CachedCatalog>, CacheError> {
        let entries = self.entries.read();
        match entries.get(user) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, user: &UserId, snapshot: &CachedCatalog) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.entries.write().insert(user.clone(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_catalog;

    #[tokio::test]
    async fn test_entries_are_per_user() {
        let cache = MemoryCatalogCache::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        cache
            .store(&alice, &CachedCatalog::new(default_catalog(), None))
            .await
            .unwrap();

        assert_eq!(cache.load(&alice).await.unwrap().unwrap().items.len(), default_catalog().len());
        assert!(cache.load(&bob).await.unwrap().is_none());
        assert_eq!(cache.len(), 1);
    }
}
