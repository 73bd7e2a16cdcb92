//! # Builder for MapleBaconConfig
//!
//! Fluent construction of [`MapleBaconConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use maple_bacon::{MapleBaconConfig, MemoryCapacity};
//!
//! let config = MapleBaconConfig::builder()
//!     .with_cache_name("avatars")
//!     .with_max_cache_age(Duration::from_secs(60 * 60 * 24))
//!     .with_memory_capacity(MemoryCapacity::Entries(200))
//!     .with_timeout(Duration::from_secs(15))
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .build();
//!
//! assert_eq!(config.cache_name, "avatars");
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::cache::MemoryCapacity;
use crate::config::MapleBaconConfig;
use crate::proxy::ProxyConfig;

/// Builder for creating MapleBaconConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct MapleBaconConfigBuilder {
    config: MapleBaconConfig,
}

impl MapleBaconConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: MapleBaconConfig::default(),
        }
    }

    /// Set the cache name, which is also its directory name
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.config.cache_name = name.into();
        self
    }

    /// Set the directory holding every named cache
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.cache.root_dir = Some(root.into());
        self
    }

    /// Set the age after which disk entries are reported as expired
    pub fn with_max_cache_age(mut self, max_age: Duration) -> Self {
        self.config.cache.max_cache_age = max_age;
        self
    }

    /// Set the memory tier capacity
    pub fn with_memory_capacity(mut self, capacity: MemoryCapacity) -> Self {
        self.config.cache.memory_capacity = capacity;
        self
    }

    /// Set the overall timeout for the entire HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher.connect_timeout = timeout;
        self
    }

    /// Set the read timeout (maximum time between receiving data chunks)
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher.read_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.fetcher.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.fetcher.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.fetcher.headers.insert(name, value);
        }
        self
    }

    /// Set all HTTP headers, replacing any existing headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.fetcher.headers = headers;
        self
    }

    /// Set the proxy configuration
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.fetcher.proxy = Some(proxy);
        self.config.fetcher.use_system_proxy = false; // Explicit proxy overrides system proxy
        self
    }

    /// Set whether to use system proxy settings if available
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        // Only set system proxy if no explicit proxy is configured
        if self.config.fetcher.proxy.is_none() {
            self.config.fetcher.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn build(self) -> MapleBaconConfig {
        self.config
    }
}

impl Default for MapleBaconConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
