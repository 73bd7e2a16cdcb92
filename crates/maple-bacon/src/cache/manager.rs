//! # Cache Manager
//!
//! [`Cache`] coordinates the memory and disk tiers for one named value type.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::pressure::PressureNotifier;
use crate::cache::providers::{BackingStore, DiskStore, FsBackingStore, MemoryStore};
use crate::cache::registry::{CacheRegistry, DEFAULT_CACHE_NAME};
use crate::cache::types::{CacheConfig, CacheKey, CacheLookupResult, CacheScope, CacheType};
use crate::convert::DataConvertible;
use crate::error::{MapleBaconError, Result};

/// Two-tier cache handling both memory and disk storage for values of type `V`.
///
/// A cache name owns one directory under the cache root, whatever the value
/// type. Two caches with the same name and root but different `V` read and
/// write the same disk entries while keeping separate memory tiers, so a
/// name should be used with a single value type.
pub struct Cache<V> {
    name: String,
    memory: Arc<MemoryStore<V>>,
    disk: DiskStore,
    max_cache_age: Mutex<Duration>,
}

impl<V: DataConvertible> Cache<V> {
    /// Create a cache called `name` with the default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, &CacheConfig::default())
    }

    /// Create a cache called `name` on the local file system
    pub fn with_config(name: impl Into<String>, config: &CacheConfig) -> Self {
        Self::with_backing_store(name, config, Arc::new(FsBackingStore::new()))
    }

    /// Create a cache called `name` on top of an arbitrary backing store
    pub fn with_backing_store(
        name: impl Into<String>,
        config: &CacheConfig,
        backing: Arc<dyn BackingStore>,
    ) -> Self {
        let name = name.into();
        let disk = DiskStore::new(config.cache_dir(&name), backing);
        let memory = Arc::new(MemoryStore::new(config.memory_capacity));

        debug!(name = %name, dir = ?disk.cache_dir(), "Cache created");

        Self {
            name,
            memory,
            disk,
            max_cache_age: Mutex::new(config.max_cache_age),
        }
    }

    /// The process-wide cache named [`DEFAULT_CACHE_NAME`] for this value type
    pub fn default_cache() -> Arc<Self> {
        CacheRegistry::global().cache(DEFAULT_CACHE_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn memory(&self) -> &MemoryStore<V> {
        &self.memory
    }

    pub fn disk(&self) -> &DiskStore {
        &self.disk
    }

    pub fn max_cache_age(&self) -> Duration {
        *self.max_cache_age.lock()
    }

    pub fn set_max_cache_age(&self, max_age: Duration) {
        *self.max_cache_age.lock() = max_age;
    }

    /// Evict this cache's memory tier whenever `notifier` fires
    pub fn register_memory_pressure(&self, notifier: &PressureNotifier) {
        notifier.register(self.memory.clone());
    }

    /// Store `value` in both tiers.
    ///
    /// The memory tier is written before this returns its first poll, so a
    /// retrieve issued after the store completes always hits memory. The
    /// future resolves once the disk write settles; a disk failure is returned
    /// but leaves the memory entry in place.
    pub async fn store(&self, value: V, identifier: &str, transformer_id: Option<&str>) -> Result<()> {
        let key = CacheKey::derive(identifier, transformer_id);
        self.memory.insert(key.clone(), value.clone(), value.cost());

        let data = tokio::task::spawn_blocking(move || value.encode())
            .await
            .ok()
            .flatten()
            .ok_or_else(|| MapleBaconError::Encode {
                key: key.to_string(),
            })?;

        if let Err(e) = self.disk.store(&key, &data).await {
            warn!(cache = %self.name, key = %key, error = %e, "Failed to write entry to disk cache");
            return Err(e.into());
        }
        Ok(())
    }

    /// Look a value up, memory first, then disk.
    ///
    /// A disk hit is decoded and promoted to memory. Bytes that fail to decode
    /// are treated as a miss and the file is removed.
    pub async fn retrieve(
        &self,
        identifier: &str,
        transformer_id: Option<&str>,
    ) -> CacheLookupResult<V> {
        let key = CacheKey::derive(identifier, transformer_id);

        if let Some(value) = self.memory.get(&key) {
            return (Some(value), CacheType::Memory);
        }

        let Some(data) = self.disk.retrieve(&key).await else {
            return (None, CacheType::None);
        };

        let decoded = tokio::task::spawn_blocking(move || V::decode(&data))
            .await
            .ok()
            .flatten();

        match decoded {
            Some(value) => {
                // Store in memory cache for faster access next time
                self.memory.insert(key, value.clone(), value.cost());
                (Some(value), CacheType::Disk)
            }
            None => {
                warn!(cache = %self.name, key = %key, "Failed to decode disk cache entry, removing it");
                self.disk.remove(&key).await;
                (None, CacheType::None)
            }
        }
    }

    /// Check whether a value is cached in either tier
    pub async fn is_cached(&self, identifier: &str, transformer_id: Option<&str>) -> bool {
        let key = CacheKey::derive(identifier, transformer_id);
        self.memory.contains(&key) || self.disk.contains(&key).await
    }

    /// Remove one entry from both tiers
    pub async fn remove(&self, identifier: &str, transformer_id: Option<&str>) {
        let key = CacheKey::derive(identifier, transformer_id);
        self.memory.remove(&key);
        self.disk.remove(&key).await;
    }

    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    pub async fn clear_disk(&self) {
        self.disk.remove_all().await;
    }

    pub async fn clear(&self, scope: CacheScope) {
        match scope {
            CacheScope::Memory => self.clear_memory(),
            CacheScope::Disk => self.clear_disk().await,
            CacheScope::All => {
                self.clear_memory();
                self.clear_disk().await;
            }
        }
    }

    /// On-disk locations of entries older than [`Cache::max_cache_age`].
    ///
    /// Deleting them is left to the caller's own schedule; see
    /// [`Cache::sweep_expired`].
    pub async fn expired_file_urls(&self) -> Vec<PathBuf> {
        self.disk.expired_paths(self.max_cache_age()).await
    }

    /// Delete entries older than [`Cache::max_cache_age`] from disk
    pub async fn sweep_expired(&self) -> usize {
        self.disk.sweep(self.max_cache_age()).await
    }
}
