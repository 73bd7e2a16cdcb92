//! # Cache Registry
//!
//! Process-wide lookup of named caches. Asking for the same name and value
//! type twice yields the same [`Cache`] instance.
//!
//! Instances are keyed by value type as well as name, but the disk directory
//! only depends on the name: the same name requested for two value types
//! gives two memory tiers over one directory. Use one value type per name.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::manager::Cache;
use crate::cache::types::CacheConfig;
use crate::convert::DataConvertible;

/// Name of the cache used when none is given
pub const DEFAULT_CACHE_NAME: &str = "default";

static GLOBAL: LazyLock<CacheRegistry> = LazyLock::new(CacheRegistry::new);

type Entries = HashMap<(TypeId, String), Arc<dyn Any + Send + Sync>>;

/// Registry of shared instances, keyed by type and name
#[derive(Default)]
pub struct CacheRegistry {
    entries: Mutex<Entries>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process
    pub fn global() -> &'static CacheRegistry {
        &GLOBAL
    }

    /// Get the cache called `name`, creating it with the default configuration
    pub fn cache<V: DataConvertible>(&self, name: &str) -> Arc<Cache<V>> {
        self.cache_with_config(name, &CacheConfig::default())
    }

    /// Get the cache called `name`, creating it from `config` if needed.
    ///
    /// `config` is ignored when the cache already exists.
    pub fn cache_with_config<V: DataConvertible>(
        &self,
        name: &str,
        config: &CacheConfig,
    ) -> Arc<Cache<V>> {
        let result: Result<_, std::convert::Infallible> =
            self.get_or_try_init(name, || Ok(Cache::<V>::with_config(name, config)));
        match result {
            Ok(cache) => cache,
            Err(never) => match never {},
        }
    }

    /// Get the `T` registered as `name`, building it with `init` on first use.
    ///
    /// `init` runs under the registry lock and must not call back into the
    /// registry.
    pub(crate) fn get_or_try_init<T, E>(
        &self,
        name: &str,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
    {
        let mut entries = self.entries.lock();
        let slot = (TypeId::of::<T>(), name.to_owned());

        if let Some(existing) = entries.get(&slot) {
            if let Ok(value) = existing.clone().downcast::<T>() {
                return Ok(value);
            }
        }

        let value = Arc::new(init()?);
        entries.insert(slot, value.clone() as Arc<dyn Any + Send + Sync>);
        debug!(name = name, kind = std::any::type_name::<T>(), "Registered shared instance");
        Ok(value)
    }
}
