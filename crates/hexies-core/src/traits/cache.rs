//! CatalogCache trait definition for the local fallback snapshot

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{CacheError, CatalogItem, SubscriptionRecord, UserId};

/// Snapshot of the last authoritative catalog seen for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCatalog {
    pub items: Vec<CatalogItem>,
    /// Last known subscription. Informational only, never used for access decisions.
    #[serde(default)]
    pub subscription: Option<SubscriptionRecord>,
    pub saved_at: DateTime<Utc>,
}

impl CachedCatalog {
    pub fn new(items: Vec<CatalogItem>, subscription: Option<SubscriptionRecord>) -> Self {
        Self {
            items,
            subscription,
            saved_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self, freshness: std::time::Duration, now: DateTime<Utc>) -> bool {
        match Duration::from_std(freshness) {
            Ok(window) => now - self.saved_at <= window,
            Err(_) => true,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogCache: Send + Sync {
    async fn load(&self, user: &UserId) -> Result<Option<CachedCatalog>, CacheError>;

    async fn store(&self, user: &UserId, snapshot: &CachedCatalog) -> Result<(), CacheError>;
}
