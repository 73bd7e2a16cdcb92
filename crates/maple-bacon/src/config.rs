use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::cache::{CacheConfig, DEFAULT_CACHE_NAME};
use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str = concat!("maple-bacon/", env!("CARGO_PKG_VERSION"));

/// Configurable options for the network fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Overall timeout for the entire HTTP request
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: FetcherConfig::get_default_headers(),
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl FetcherConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("image/png,image/jpeg,image/*;q=0.8,*/*;q=0.5"),
        );
        default_headers
    }
}

/// Top-level configuration for a [`MapleBacon`](crate::MapleBacon) instance
#[derive(Debug, Clone)]
pub struct MapleBaconConfig {
    /// Name of the cache, which also names its directory on disk
    pub cache_name: String,

    /// Cache tiers configuration
    pub cache: CacheConfig,

    /// Network fetcher configuration
    pub fetcher: FetcherConfig,
}

impl Default for MapleBaconConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_owned(),
            cache: CacheConfig::default(),
            fetcher: FetcherConfig::default(),
        }
    }
}

impl MapleBaconConfig {
    pub fn builder() -> crate::builder::MapleBaconConfigBuilder {
        crate::builder::MapleBaconConfigBuilder::new()
    }
}
