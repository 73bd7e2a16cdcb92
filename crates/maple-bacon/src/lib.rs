//! # MapleBacon
//!
//! A client-side media cache. Resources are fetched over the network, decoded
//! once, and kept in a two-tier cache (memory + disk) keyed by URL and an
//! optional transformer identifier.
//!
//! ## Features
//!
//! - Memory tier with LRU eviction by entry count or total cost
//! - Disk tier with one directory per named cache and write-time expiry
//! - Deduplicated downloads with per-subscriber cancellation and progress
//! - Transformer pipeline whose results are cached independently
//! - Process-wide registry of named caches

pub mod builder;
pub mod cache;
pub mod config;
pub mod convert;
pub mod coordinator;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod image_type;
pub mod proxy;
pub mod transformer;

pub use builder::MapleBaconConfigBuilder;
pub use cache::{
    BackingStore, Cache, CacheConfig, CacheKey, CacheLookupResult, CacheRegistry, CacheScope,
    CacheType, DEFAULT_CACHE_NAME, DEFAULT_MAX_CACHE_AGE, DiskStore, FsBackingStore,
    MemoryBackingStore, MemoryCapacity, MemoryStore, PressureListener, PressureNotifier,
};
pub use config::{FetcherConfig, MapleBaconConfig};
pub use convert::DataConvertible;
pub use coordinator::{ImageHandle, MapleBacon};
pub use downloader::{Canceller, DownloadEvent, DownloadHandle, DownloadStream, Downloader};
pub use error::{MapleBaconError, Result};
pub use fetch::{Fetch, FetchError, HttpFetcher, Progress, ProgressHandler, create_client};
pub use image_type::{EncodedImage, ImageType};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use transformer::{FnTransformer, ImageTransformer};
