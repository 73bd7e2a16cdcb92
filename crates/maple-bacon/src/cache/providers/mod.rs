//! # Cache Providers
//!
//! Storage tiers used by [`Cache`](crate::cache::Cache) and the file-system
//! capability the disk tier is built on.

// Re-export providers for easier access
pub use self::backing::{BackingStore, FsBackingStore, MemoryBackingStore};
pub use self::file::DiskStore;
pub use self::memory::MemoryStore;

// File-system capability
pub mod backing;

// Individual tier implementations
pub mod file;
pub mod memory;
