//! # Cache System
//!
//! Two-tier cache for decoded values: a synchronous memory tier in front of a
//! disk tier that persists encoded bytes. Each named [`Cache`] owns one
//! directory under the cache root, so caches never see each other's entries.

// Module declarations
mod manager;
pub mod pressure;
pub mod providers;
mod registry;
mod types;

// Re-export primary types from our various modules
pub use manager::Cache;
pub use pressure::{PressureListener, PressureNotifier};
pub use providers::{BackingStore, DiskStore, FsBackingStore, MemoryBackingStore, MemoryStore};
pub use registry::{CacheRegistry, DEFAULT_CACHE_NAME};
pub use types::{
    CacheConfig, CacheKey, CacheLookupResult, CacheScope, CacheType, DEFAULT_MAX_CACHE_AGE,
    MemoryCapacity,
};
