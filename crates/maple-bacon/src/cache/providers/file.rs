//! # Disk Store
//!
//! Persistent tier: one file per cache key inside the cache's own directory.
//! The file's modification time is the only metadata kept and acts as the
//! expiry clock. It is set on write and never refreshed on read.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::io;
use tracing::{debug, warn};

use crate::cache::types::CacheKey;

use super::BackingStore;

#[derive(Clone)]
pub struct DiskStore {
    cache_dir: PathBuf,
    backing: Arc<dyn BackingStore>,
}

impl fmt::Debug for DiskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskStore")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl DiskStore {
    /// Create a disk store rooted at `cache_dir`. Nothing is touched on disk
    /// until the first write.
    pub fn new(cache_dir: PathBuf, backing: Arc<dyn BackingStore>) -> Self {
        Self { cache_dir, backing }
    }

    /// Directory holding this store's entries
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Location of the file backing `key`
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }

    /// Persist `data` under `key`, replacing any previous entry.
    ///
    /// The cache directory is (re)created on every write, so a concurrent
    /// [`DiskStore::remove_all`] never leaves the store unable to write.
    pub async fn store(&self, key: &CacheKey, data: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        self.backing.create_dir_all(&self.cache_dir).await?;

        match self.backing.write(&path, data).await {
            // Directory removed between creation and write
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = ?self.cache_dir, "Cache directory vanished, recreating");
                self.backing.create_dir_all(&self.cache_dir).await?;
                self.backing.write(&path, data).await?;
            }
            result => result?,
        }

        debug!(key = %key, size = data.len(), "Successfully cached entry to disk");
        Ok(())
    }

    /// Read the entry for `key`. Unreadable entries are reported as missing.
    pub async fn retrieve(&self, key: &CacheKey) -> Option<Bytes> {
        let path = self.path_for(key);
        match self.backing.read(&path).await {
            Ok(data) => Some(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read cache data file");
                None
            }
        }
    }

    /// Check whether an entry exists for `key`
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.backing.exists(&self.path_for(key)).await
    }

    /// Remove the entry for `key`. A missing entry is not an error.
    pub async fn remove(&self, key: &CacheKey) {
        let path = self.path_for(key);
        match self.backing.remove_file(&path).await {
            Ok(()) => debug!(key = %key, "Removed entry from disk cache"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?path, error = %e, "Failed to remove cache file"),
        }
    }

    /// Remove every entry along with the cache directory itself
    pub async fn remove_all(&self) {
        match self.backing.remove_dir_all(&self.cache_dir).await {
            Ok(()) => debug!(dir = ?self.cache_dir, "Cleared disk cache"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = ?self.cache_dir, error = %e, "Failed to clear cache directory"),
        }
    }

    /// Entries whose modification time is older than `now - max_age`.
    ///
    /// A zero `max_age` reports every entry.
    pub async fn expired_entries(&self, max_age: Duration) -> Vec<(CacheKey, PathBuf)> {
        let paths = match self.backing.list_dir(&self.cache_dir).await {
            Ok(paths) => paths,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = ?self.cache_dir, error = %e, "Failed to read cache directory");
                return Vec::new();
            }
        };

        let now = SystemTime::now();
        let mut expired = Vec::new();
        for path in paths {
            let Some(key) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(CacheKey::from_filename)
            else {
                continue;
            };

            let modified = match self.backing.modified(&path).await {
                Ok(modified) => modified,
                Err(e) => {
                    debug!(path = ?path, error = %e, "Skipping entry without modification time");
                    continue;
                }
            };

            // An mtime in the future reads as zero age
            let age = now.duration_since(modified).unwrap_or_default();
            if max_age.is_zero() || age > max_age {
                expired.push((key, path));
            }
        }
        expired
    }

    /// Keys of the entries older than `max_age`
    pub async fn expired_keys(&self, max_age: Duration) -> Vec<CacheKey> {
        self.expired_entries(max_age)
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// On-disk locations of the entries older than `max_age`
    pub async fn expired_paths(&self, max_age: Duration) -> Vec<PathBuf> {
        self.expired_entries(max_age)
            .await
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    /// Delete every entry older than `max_age`, returning how many were removed
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        for (key, path) in self.expired_entries(max_age).await {
            match self.backing.remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to remove expired cache file"),
            }
        }
        debug!(dir = ?self.cache_dir, count = removed, "Swept expired cache entries");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::providers::{FsBackingStore, MemoryBackingStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Semaphore;

    /// Backing store whose first `create_dir_all` parks after creating the
    /// directory until released
    struct StallingBackingStore {
        inner: MemoryBackingStore,
        stalled: AtomicBool,
        entered: Semaphore,
        release: Semaphore,
    }

    impl StallingBackingStore {
        fn new() -> Self {
            Self {
                inner: MemoryBackingStore::new(),
                stalled: AtomicBool::new(false),
                entered: Semaphore::new(0),
                release: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl BackingStore for StallingBackingStore {
        async fn read(&self, path: &Path) -> io::Result<Bytes> {
            self.inner.read(path).await
        }

        async fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path).await
        }

        async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            self.inner.write(path, data).await
        }

        async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            self.inner.create_dir_all(path).await?;
            if !self.stalled.swap(true, Ordering::SeqCst) {
                self.entered.add_permits(1);
                if let Ok(permit) = self.release.acquire().await {
                    permit.forget();
                }
            }
            Ok(())
        }

        async fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.inner.remove_file(path).await
        }

        async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            self.inner.remove_dir_all(path).await
        }

        async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            self.inner.list_dir(path).await
        }

        async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
            self.inner.modified(path).await
        }
    }

    fn mock_store() -> (DiskStore, Arc<MemoryBackingStore>) {
        let backing = Arc::new(MemoryBackingStore::new());
        let store = DiskStore::new(PathBuf::from("/caches/mock"), backing.clone());
        (store, backing)
    }

    #[tokio::test]
    async fn test_store_creates_directory_lazily() {
        let (store, backing) = mock_store();
        assert!(!backing.exists(store.cache_dir()).await);

        let key = CacheKey::derive("https://example.com/a.png", None);
        store.store(&key, b"image").await.unwrap();

        assert!(backing.exists(store.cache_dir()).await);
        assert_eq!(store.retrieve(&key).await, Some(Bytes::from("image")));
        assert!(store.contains(&key).await);
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_none() {
        let (store, _) = mock_store();
        let key = CacheKey::derive("missing", None);
        assert_eq!(store.retrieve(&key).await, None);
        assert!(!store.contains(&key).await);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let (store, backing) = mock_store();
        backing.set_fail_writes(true);
        let key = CacheKey::derive("a", None);
        let err = store.store(&key, b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
        assert_eq!(store.retrieve(&key).await, None);
    }

    #[tokio::test]
    async fn test_remove_missing_entry_is_not_an_error() {
        let (store, _) = mock_store();
        store.remove(&CacheKey::derive("ghost", None)).await;
        store.remove_all().await;
    }

    #[tokio::test]
    async fn test_remove_all_then_store_again() {
        let (store, _) = mock_store();
        let key = CacheKey::derive("a", None);
        store.store(&key, b"1").await.unwrap();

        store.remove_all().await;
        assert_eq!(store.retrieve(&key).await, None);

        store.store(&key, b"2").await.unwrap();
        assert_eq!(store.retrieve(&key).await, Some(Bytes::from("2")));
    }

    #[tokio::test]
    async fn test_clear_during_first_write_does_not_disable_store() {
        let backing = Arc::new(StallingBackingStore::new());
        let store = DiskStore::new(PathBuf::from("/caches/stall"), backing.clone());
        let key = CacheKey::derive("https://example.com/first.png", None);

        let first = tokio::spawn({
            let store = store.clone();
            let key = key.clone();
            async move { store.store(&key, b"first").await }
        });

        // Clear while the first write sits between mkdir and write
        backing.entered.acquire().await.unwrap().forget();
        store.remove_all().await;
        backing.release.add_permits(1);

        first.await.unwrap().unwrap();
        assert_eq!(store.retrieve(&key).await, Some(Bytes::from("first")));

        store.remove_all().await;
        for i in 0..3 {
            let later = CacheKey::derive(&format!("https://example.com/{i}.png"), None);
            store.store(&later, b"later").await.unwrap();
            assert_eq!(store.retrieve(&later).await, Some(Bytes::from("later")));
        }
    }

    #[tokio::test]
    async fn test_zero_max_age_expires_everything() {
        let (store, _) = mock_store();
        let a = CacheKey::derive("a", None);
        let b = CacheKey::derive("b", Some("t"));
        store.store(&a, b"1").await.unwrap();
        store.store(&b, b"2").await.unwrap();

        let mut keys = store.expired_keys(Duration::ZERO).await;
        keys.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_expiry_uses_write_time() {
        let (store, backing) = mock_store();
        let fresh = CacheKey::derive("fresh", None);
        let stale = CacheKey::derive("stale", None);
        store.store(&fresh, b"1").await.unwrap();
        store.store(&stale, b"2").await.unwrap();

        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
        assert!(backing.set_modified(&store.path_for(&stale), two_hours_ago));

        // Reading does not refresh the clock
        assert!(store.retrieve(&stale).await.is_some());

        let expired = store.expired_paths(Duration::from_secs(3600)).await;
        assert_eq!(expired, vec![store.path_for(&stale)]);

        assert_eq!(store.sweep(Duration::from_secs(3600)).await, 1);
        assert!(store.contains(&fresh).await);
        assert!(!store.contains(&stale).await);
    }

    #[tokio::test]
    async fn test_expired_keys_on_missing_directory() {
        let (store, _) = mock_store();
        assert!(store.expired_keys(Duration::ZERO).await.is_empty());
    }

    #[tokio::test]
    async fn test_fs_store_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("named"), Arc::new(FsBackingStore::new()));
        let key = CacheKey::derive("https://example.com/a.png", None);
        store.store(&key, b"image").await.unwrap();
        tokio::fs::write(store.cache_dir().join("README"), b"not an entry")
            .await
            .unwrap();

        assert_eq!(store.expired_keys(Duration::ZERO).await, vec![key.clone()]);
        assert_eq!(store.retrieve(&key).await, Some(Bytes::from("image")));

        store.remove_all().await;
        assert!(!store.cache_dir().exists());
    }
}
