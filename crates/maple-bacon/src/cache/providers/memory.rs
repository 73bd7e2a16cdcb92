//! # Memory Store
//!
//! In-memory tier holding decoded values, built on Moka with an LRU eviction
//! policy. Capacity is either a number of entries or a total cost.

use moka::policy::EvictionPolicy;
use moka::sync::Cache as MokaCache;
use tracing::{debug, info, warn};

use crate::cache::pressure::PressureListener;
use crate::cache::types::{CacheKey, MemoryCapacity};

/// Entry in the memory cache
#[derive(Clone)]
struct MemoryEntry<V> {
    value: V,
    cost: u32,
}

/// Memory tier implementation using Moka
pub struct MemoryStore<V> {
    cache: MokaCache<CacheKey, MemoryEntry<V>>,
    capacity: MemoryCapacity,
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new memory store with the given capacity limit
    pub fn new(capacity: MemoryCapacity) -> Self {
        let builder = MokaCache::builder().eviction_policy(EvictionPolicy::lru());

        let cache = match capacity {
            MemoryCapacity::Entries(max_entries) => builder.max_capacity(max_entries).build(),
            MemoryCapacity::Cost(max_cost) => builder
                .weigher(|_k, entry: &MemoryEntry<V>| entry.cost)
                .max_capacity(max_cost)
                .build(),
        };

        debug!(capacity = ?capacity, "Memory store created");

        Self { cache, capacity }
    }

    pub fn capacity(&self) -> MemoryCapacity {
        self.capacity
    }

    /// Insert `value` under `key`, replacing any previous value
    pub fn insert(&self, key: CacheKey, value: V, cost: u32) {
        // A single entry shouldn't be larger than the total cache size
        if let MemoryCapacity::Cost(max_cost) = self.capacity {
            if u64::from(cost) > max_cost {
                warn!(
                    key = %key,
                    cost = cost,
                    max_cost = max_cost,
                    "Entry too large for memory cache, skipping"
                );
                return;
            }
        }

        self.cache.insert(key, MemoryEntry { value, cost });
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.cache.get(key).map(|entry| entry.value)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn remove(&self, key: &CacheKey) {
        self.cache.invalidate(key);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        debug!("Memory cache cleared");
    }

    /// Drop everything held in memory. Called when the host reports memory
    /// pressure.
    pub fn evict_on_pressure(&self) {
        let count = self.cache.entry_count();
        self.cache.invalidate_all();
        info!(entries = count, "Evicted memory cache on memory pressure");
    }

    /// Apply pending evictions and invalidations now instead of lazily
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }
}

impl<V> PressureListener for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn on_memory_pressure(&self) {
        self.evict_on_pressure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline]
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer() // Write to test output
            .try_init();
    }

    // Helper to create a CacheKey
    fn key(name: &str) -> CacheKey {
        CacheKey::derive(name, None)
    }

    #[test]
    fn test_insert_get_hit() {
        let store = MemoryStore::new(MemoryCapacity::Entries(10));
        store.insert(key("item1"), "hello".to_string(), 1);
        assert_eq!(store.get(&key("item1")), Some("hello".to_string()));
        assert!(store.contains(&key("item1")));
    }

    #[test]
    fn test_get_miss() {
        let store: MemoryStore<String> = MemoryStore::new(MemoryCapacity::Entries(10));
        assert!(store.get(&key("non_existent")).is_none());
    }

    #[test]
    fn test_insert_replaces_value() {
        let store = MemoryStore::new(MemoryCapacity::Cost(100));
        store.insert(key("item"), "value1".to_string(), 6);
        store.insert(key("item"), "new_val".to_string(), 7);
        store.run_pending_tasks();

        assert_eq!(store.get(&key("item")), Some("new_val".to_string()));
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.weighted_size(), 7);
    }

    #[test]
    fn test_evicts_least_recently_used_entry() {
        init_tracing();
        let store = MemoryStore::new(MemoryCapacity::Entries(2));
        store.insert(key("lru_item1"), 1u32, 1);
        store.insert(key("lru_item2"), 2u32, 1);
        store.run_pending_tasks();

        // Access item1 so item2 becomes the least recently used
        assert_eq!(store.get(&key("lru_item1")), Some(1));

        store.insert(key("lru_item3"), 3u32, 1);
        store.run_pending_tasks();

        assert!(store.contains(&key("lru_item1")), "item1 was accessed");
        assert!(!store.contains(&key("lru_item2")), "item2 was least recently used");
        assert!(store.contains(&key("lru_item3")), "newest entry is admitted");
        assert_eq!(store.entry_count(), 2);
    }

    #[test]
    fn test_evicts_by_cost() {
        init_tracing();
        let store = MemoryStore::new(MemoryCapacity::Cost(10));
        store.insert(key("a"), "dataA", 5);
        store.insert(key("b"), "dataB", 5);
        store.run_pending_tasks();

        store.insert(key("c"), "dataC", 5);
        store.run_pending_tasks();

        assert!(!store.contains(&key("a")), "oldest entry is evicted");
        assert!(store.contains(&key("b")));
        assert!(store.contains(&key("c")));
        assert_eq!(store.weighted_size(), 10);
    }

    #[test]
    fn test_entry_larger_than_capacity_is_skipped() {
        let store = MemoryStore::new(MemoryCapacity::Cost(50));
        store.insert(key("large_item"), vec![0u8; 80], 80);
        store.run_pending_tasks();
        assert!(!store.contains(&key("large_item")));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = MemoryStore::new(MemoryCapacity::Entries(10));
        store.insert(key("a"), 1, 1);
        store.insert(key("b"), 2, 1);

        store.remove(&key("a"));
        assert!(!store.contains(&key("a")));

        store.clear();
        store.run_pending_tasks();
        assert!(!store.contains(&key("b")));
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn test_memory_pressure_clears_store() {
        let store = MemoryStore::new(MemoryCapacity::Entries(10));
        store.insert(key("a"), 1, 1);
        store.on_memory_pressure();
        assert!(store.get(&key("a")).is_none());
    }
}
