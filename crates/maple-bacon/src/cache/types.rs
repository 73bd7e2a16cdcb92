//! # Cache Types
//!
//! This module defines common types used across the caching system.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};

/// Default age after which disk entries are reported as expired (one week)
pub const DEFAULT_MAX_CACHE_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Length of a rendered key: a hex encoded SHA-256 digest
const KEY_LEN: usize = 64;

/// Which tier satisfied a cache read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    /// Not served from the cache
    None,
    /// Served from the in-memory tier
    Memory,
    /// Served from the disk tier (and promoted to memory)
    Disk,
}

/// Which tiers a clear operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Memory,
    Disk,
    All,
}

/// Cache key derived from a locator and an optional transformer identifier.
///
/// The key is a lowercase hex SHA-256 digest, so it is safe to use as a file
/// name on every platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `identifier`, qualified by `transformer_id` if present
    pub fn derive(identifier: &str, transformer_id: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        // Length prefix pins the identifier boundary so no identifier can
        // collide with another identifier plus a transformer suffix.
        hasher.update((identifier.len() as u64).to_be_bytes());
        hasher.update(identifier.as_bytes());
        if let Some(id) = transformer_id {
            hasher.update(b":");
            hasher.update(id.as_bytes());
        }

        let hash = hasher.finalize();
        Self(format!("{hash:x}"))
    }

    /// Recover a key from a file name written by the disk tier.
    ///
    /// Returns `None` for names that were not produced by [`CacheKey::derive`],
    /// such as in-progress temporary files.
    pub fn from_filename(name: &str) -> Option<Self> {
        let valid = name.len() == KEY_LEN
            && name
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capacity limit of the memory tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCapacity {
    /// Maximum number of entries
    Entries(u64),
    /// Maximum total cost, as reported by `DataConvertible::cost`
    Cost(u64),
}

impl Default for MemoryCapacity {
    fn default() -> Self {
        MemoryCapacity::Cost(30 * 1024 * 1024) // 30MB
    }
}

/// Configuration for a named cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding one sub-directory per named cache
    pub root_dir: Option<PathBuf>,
    /// Age after which disk entries are considered expired
    pub max_cache_age: Duration,
    /// Capacity of the memory tier
    pub memory_capacity: MemoryCapacity,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: None, // If None, we'll use system temp dir
            max_cache_age: DEFAULT_MAX_CACHE_AGE,
            memory_capacity: MemoryCapacity::default(),
        }
    }
}

impl CacheConfig {
    /// Resolve the directory used by the cache called `name`.
    ///
    /// Every name maps to its own direct child of the root, see
    /// [`cache_dir_name`].
    pub fn cache_dir(&self, name: &str) -> PathBuf {
        self.root_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("maple-bacon"))
            .join(cache_dir_name(name))
    }
}

/// Directory name for the cache called `name`.
///
/// Names made of lowercase ASCII letters, digits, `-`, `_` and `.` (not
/// leading) are used as is. Anything else, including the empty name, names
/// with path separators or `..`, and mixed case names, is replaced by `~`
/// followed by the hex SHA-256 of the name. `~` never appears in a name
/// used as is, so the two forms cannot collide.
pub fn cache_dir_name(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'_' | b'.'));
    if plain {
        name.to_owned()
    } else {
        format!("~{:x}", Sha256::digest(name.as_bytes()))
    }
}

/// Result of a tiered lookup: the value, if any, and the tier that served it
pub type CacheLookupResult<V> = (Option<V>, CacheType);
