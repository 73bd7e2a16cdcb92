use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use maple_bacon::CacheScope;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Image fetching and caching tool",
    long_about = "Fetches images through a two-tier (memory + disk) cache.\n\
                  \n\
                  Images are downloaded once, verified to be JPEG or PNG, and kept on disk\n\
                  under <cache-dir>/<name>/ until they expire. Expired entries can be\n\
                  listed or swept on demand."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Root directory holding the named caches
    #[arg(
        long,
        global = true,
        help = "Root directory of the cache (default: <system temp>/maple-bacon)"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Name of the cache to operate on
    #[arg(
        short,
        long,
        global = true,
        default_value = "default",
        help = "Name of the cache, also used as its directory name"
    )]
    pub name: String,

    /// Maximum age of disk entries with optional unit (s, m, h, d)
    #[arg(
        long,
        global = true,
        default_value = "7d",
        help = "Age after which disk entries expire, with optional unit (s, m, h, d). Examples: \"90m\", \"12h\", \"7d\""
    )]
    pub max_age: String,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch one or more images through the cache
    Fetch(FetchArgs),

    /// Clear cached entries
    Clear {
        #[arg(long, value_enum, default_value_t = ClearScope::All)]
        scope: ClearScope,
    },

    /// List disk entries older than the maximum age
    Expired,

    /// Delete disk entries older than the maximum age
    Sweep,
}

#[derive(clap::Args)]
pub struct FetchArgs {
    /// Image URL(s) to fetch
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Directory where fetched images are written
    #[arg(short, long, help = "Copy each fetched image into this directory")]
    pub output_dir: Option<PathBuf>,

    /// Overall HTTP request timeout in seconds
    #[arg(long, default_value = "30", help = "Overall timeout for each HTTP request in seconds (0 to disable)")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10", help = "Timeout for establishing a connection in seconds (0 to disable)")]
    pub connect_timeout: u64,

    /// Custom HTTP headers
    #[arg(
        short = 'H',
        long = "header",
        help = "Add custom HTTP header (can be used multiple times). Format: 'Name: Value'"
    )]
    pub headers: Vec<String>,

    /// HTTP proxy URL
    #[arg(long, help = "Proxy server URL (e.g. http://proxy.example.com:8080)")]
    pub proxy: Option<String>,

    /// Proxy type
    #[arg(long, default_value = "http", help = "Proxy type: http, https, socks5 or all")]
    pub proxy_type: String,

    /// Disable all proxies
    #[arg(long, help = "Ignore system proxy settings")]
    pub no_proxy: bool,

    /// Disable progress bars
    #[arg(long, help = "Do not show download progress bars")]
    pub no_progress: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ClearScope {
    Memory,
    Disk,
    All,
}

impl From<ClearScope> for CacheScope {
    fn from(scope: ClearScope) -> Self {
        match scope {
            ClearScope::Memory => CacheScope::Memory,
            ClearScope::Disk => CacheScope::Disk,
            ClearScope::All => CacheScope::All,
        }
    }
}
