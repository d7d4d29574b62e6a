//! JSON file implementation of CatalogCache
//!
//! One file per user under the cache directory. Writes go to a temporary
//! file first and are renamed into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};

use crate::data::{CacheError, UserId};
use crate::traits::{CachedCatalog, CatalogCache};

#[derive(Debug, Clone)]
pub struct FileCatalogCache {
    dir: PathBuf,
}

impl FileCatalogCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a user's snapshot. Anything outside `[A-Za-z0-9_-]` is
    /// replaced so ids cannot escape the cache directory.
    fn entry_path(&self, user: &UserId) -> PathBuf {
        let name: String = user
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("catalog-{}.json", name))
    }
}

#[async_trait]
impl CatalogCache for FileCatalogCache {
    #[instrument(skip(self), fields(user = %user))]
    async fn load(&self, user: &UserId) -> Result<Option<CachedCatalog>, CacheError> {
        let path = self.entry_path(user);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: CachedCatalog = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), items = snapshot.items.len(), "Loaded catalog snapshot");
        Ok(Some(snapshot))
    }

    #[instrument(skip(self, snapshot), fields(user = %user))]
    async fn store(&self, user: &UserId, snapshot: &CachedCatalog) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(user);
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Stored catalog snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PlanId, SubscriptionRecord};
    use crate::defaults::default_catalog;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = FileCatalogCache::new(dir.path());

        assert!(cache.load(&UserId::new("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_survives_a_new_instance() {
        let dir = TempDir::new().unwrap();
        let user = UserId::new("host-42");
        let snapshot = CachedCatalog::new(
            default_catalog(),
            Some(SubscriptionRecord::free_tier(5)),
        );

        tokio_test::assert_ok!(
            FileCatalogCache::new(dir.path().join("nested"))
                .store(&user, &snapshot)
                .await
        );
        let loaded = FileCatalogCache::new(dir.path().join("nested"))
            .load(&user)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.subscription.unwrap().plan_id, PlanId::Free);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reported() {
        let dir = TempDir::new().unwrap();
        let cache = FileCatalogCache::new(dir.path());
        let user = UserId::new("host-1");
        std::fs::write(cache.entry_path(&user), b"{not json").unwrap();

        assert!(matches!(cache.load(&user).await, Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_entry_path_stays_inside_dir() {
        let cache = FileCatalogCache::new("/tmp/hexies");
        let path = cache.entry_path(&UserId::new("../../etc/passwd"));

        assert_eq!(path.parent(), Some(Path::new("/tmp/hexies")));
        assert_eq!(path.file_name().unwrap(), "catalog-______etc_passwd.json");
    }
}
