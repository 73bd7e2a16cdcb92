//! # MapleBacon
//!
//! Front door combining a [`Cache`] and a [`Downloader`]: look the resource up,
//! fetch it on a miss, run the optional transformer once, and cache the result
//! under the transformer-qualified key.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheLookupResult, CacheRegistry, CacheScope, CacheType, DEFAULT_CACHE_NAME};
use crate::config::{FetcherConfig, MapleBaconConfig};
use crate::convert::DataConvertible;
use crate::downloader::{Canceller, DownloadHandle, Downloader};
use crate::error::{MapleBaconError, Result};
use crate::fetch::ProgressHandler;
use crate::transformer::ImageTransformer;

pub struct MapleBacon<V> {
    cache: Arc<Cache<V>>,
    downloader: Downloader<V>,
}

impl<V> Clone for MapleBacon<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            downloader: self.downloader.clone(),
        }
    }
}

impl<V: DataConvertible> MapleBacon<V> {
    pub fn new(cache: Arc<Cache<V>>, downloader: Downloader<V>) -> Self {
        Self { cache, downloader }
    }

    /// Build an instance with its own cache and an HTTP downloader
    pub fn with_config(config: &MapleBaconConfig) -> Result<Self> {
        let cache = Arc::new(Cache::with_config(&config.cache_name, &config.cache));
        let downloader = Downloader::http(&config.fetcher)?;
        Ok(Self::new(cache, downloader))
    }

    /// The process-wide instance for `V`, built on the default cache
    pub fn shared() -> Result<Arc<Self>> {
        let registry = CacheRegistry::global();
        // Resolved before the instance lookup, which holds the registry lock
        let cache = registry.cache::<V>(DEFAULT_CACHE_NAME);
        registry.get_or_try_init(DEFAULT_CACHE_NAME, || {
            let downloader = Downloader::http(&FetcherConfig::default())?;
            Ok(Self::new(cache, downloader))
        })
    }

    pub fn cache(&self) -> &Arc<Cache<V>> {
        &self.cache
    }

    pub fn downloader(&self) -> &Downloader<V> {
        &self.downloader
    }

    /// Resolve `locator`, from the cache when possible, otherwise from the
    /// network.
    ///
    /// On a miss the value is fetched, passed through `transformer` if one is
    /// given, stored under the transformer-qualified key, and delivered with
    /// source [`CacheType::None`]. Must be called from within a Tokio runtime.
    pub fn image(
        &self,
        locator: &str,
        transformer: Option<Arc<dyn ImageTransformer<V>>>,
        progress: Option<ProgressHandler>,
    ) -> ImageHandle<V> {
        let canceller = Canceller::new();
        let (tx, rx) = oneshot::channel();

        let this = self.clone();
        let task_locator = locator.to_owned();
        let task_canceller = canceller.clone();
        tokio::spawn(async move {
            let result = this
                .resolve(&task_locator, transformer, progress, &task_canceller)
                .await;
            let _ = tx.send(result);
        });

        ImageHandle {
            locator: locator.to_owned(),
            rx,
            canceller,
            done: false,
        }
    }

    async fn resolve(
        &self,
        locator: &str,
        transformer: Option<Arc<dyn ImageTransformer<V>>>,
        progress: Option<ProgressHandler>,
        canceller: &Canceller,
    ) -> Result<(V, CacheType)> {
        let transformer_id = transformer.as_ref().map(|t| t.identifier().to_owned());

        let (cached, source) = self.cache.retrieve(locator, transformer_id.as_deref()).await;
        if let Some(value) = cached {
            debug!(locator = %locator, source = ?source, "Served from cache");
            return Ok((value, source));
        }

        if canceller.is_cancelled() {
            return Err(MapleBaconError::Cancelled);
        }

        let download = self.downloader.fetch(locator, progress);
        let download_canceller = download.canceller();
        canceller.set_action(move || download_canceller.cancel());
        let value = download.await?;

        let value = match transformer {
            Some(transformer) => apply_transformer(transformer, value).await?,
            None => value,
        };

        if let Err(e) = self
            .cache
            .store(value.clone(), locator, transformer_id.as_deref())
            .await
        {
            warn!(locator = %locator, error = %e, "Failed to cache fetched value");
        }

        Ok((value, CacheType::None))
    }

    /// Fetch `locator` from the network, bypassing and not populating the cache
    pub fn fetch_from_network(
        &self,
        locator: &str,
        progress: Option<ProgressHandler>,
    ) -> DownloadHandle<V> {
        self.downloader.fetch(locator, progress)
    }

    /// Look `locator` up in the cache only
    pub async fn fetch_from_cache(
        &self,
        locator: &str,
        transformer: Option<&dyn ImageTransformer<V>>,
    ) -> CacheLookupResult<V> {
        self.cache
            .retrieve(locator, transformer.map(|t| t.identifier()))
            .await
    }

    pub async fn is_cached(&self, locator: &str, transformer: Option<&dyn ImageTransformer<V>>) -> bool {
        self.cache
            .is_cached(locator, transformer.map(|t| t.identifier()))
            .await
    }

    pub async fn clear_cache(&self, scope: CacheScope) {
        self.cache.clear(scope).await;
    }
}

async fn apply_transformer<V: DataConvertible>(
    transformer: Arc<dyn ImageTransformer<V>>,
    value: V,
) -> Result<V> {
    let identifier = transformer.identifier().to_owned();
    tokio::task::spawn_blocking(move || transformer.transform(value))
        .await
        .ok()
        .flatten()
        .ok_or(MapleBaconError::Transform {
            transformer: identifier,
        })
}

/// Pending result of [`MapleBacon::image`]: the value and the tier that
/// served it.
///
/// Dropping an unfinished handle cancels it.
pub struct ImageHandle<V> {
    locator: String,
    rx: oneshot::Receiver<Result<(V, CacheType)>>,
    canceller: Canceller,
    done: bool,
}

impl<V> ImageHandle<V> {
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Stop waiting for the image. Forwards to the underlying download, which
    /// is only cancelled once none of its subscribers remain.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }
}

impl<V> Future for ImageHandle<V> {
    type Output = Result<(V, CacheType)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.done || this.canceller.is_cancelled() {
            this.done = true;
            return Poll::Ready(Err(MapleBaconError::Cancelled));
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                this.done = true;
                Poll::Ready(result.unwrap_or(Err(MapleBaconError::Cancelled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<V> Drop for ImageHandle<V> {
    fn drop(&mut self) {
        if !self.done {
            self.canceller.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryBackingStore};
    use crate::fetch::{Fetch, FetchError, Progress};
    use crate::transformer::FnTransformer;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    struct StaticFetcher {
        calls: AtomicUsize,
        body: Bytes,
    }

    #[async_trait]
    impl Fetch for StaticFetcher {
        async fn fetch(
            &self,
            _locator: &str,
            progress: &(dyn Fn(Progress) + Send + Sync),
        ) -> std::result::Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress(Progress {
                received: self.body.len() as u64,
                expected: Some(self.body.len() as u64),
            });
            Ok(self.body.clone())
        }
    }

    /// Fetcher that never completes until released
    struct GatedFetcher {
        gate: Semaphore,
    }

    #[async_trait]
    impl Fetch for GatedFetcher {
        async fn fetch(
            &self,
            _locator: &str,
            _progress: &(dyn Fn(Progress) + Send + Sync),
        ) -> std::result::Result<Bytes, FetchError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            Ok(Bytes::from_static(b"late"))
        }
    }

    fn mock_cache() -> Arc<Cache<Bytes>> {
        let config = CacheConfig {
            root_dir: Some(PathBuf::from("/caches")),
            ..Default::default()
        };
        Arc::new(Cache::with_backing_store(
            "mock",
            &config,
            Arc::new(MemoryBackingStore::new()),
        ))
    }

    fn mock_maple_bacon() -> (MapleBacon<Bytes>, Arc<StaticFetcher>) {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicUsize::new(0),
            body: Bytes::from_static(b"\x89PNG\r\n\x1a\nbody"),
        });
        let maple_bacon = MapleBacon::new(mock_cache(), Downloader::new(fetcher.clone()));
        (maple_bacon, fetcher)
    }

    #[tokio::test]
    async fn test_miss_then_memory_hit() {
        let (maple_bacon, fetcher) = mock_maple_bacon();
        let url = "https://example.com/maple.png";

        let (_, source) = maple_bacon.image(url, None, None).await.unwrap();
        assert_eq!(source, CacheType::None);

        let (value, source) = maple_bacon.image(url, None, None).await.unwrap();
        assert_eq!(source, CacheType::Memory);
        assert_eq!(value.as_ref(), b"\x89PNG\r\n\x1a\nbody");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_is_forwarded() {
        let (maple_bacon, _) = mock_maple_bacon();
        let seen = Arc::new(AtomicUsize::new(0));
        let handler: ProgressHandler = {
            let seen = seen.clone();
            Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        };

        maple_bacon
            .image("https://example.com/p.png", None, Some(handler))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transformer_result_is_cached_under_its_own_key() {
        let (maple_bacon, _) = mock_maple_bacon();
        let url = "https://example.com/maple.png";
        let truncate: Arc<dyn ImageTransformer<Bytes>> =
            Arc::new(FnTransformer::new("truncate", |b: Bytes| Some(b.slice(..4))));

        let (value, _) = maple_bacon
            .image(url, Some(truncate.clone()), None)
            .await
            .unwrap();
        assert_eq!(value.len(), 4);

        assert!(maple_bacon.is_cached(url, Some(truncate.as_ref())).await);
        assert!(!maple_bacon.is_cached(url, None).await);

        let (plain, source) = maple_bacon.fetch_from_cache(url, Some(truncate.as_ref())).await;
        assert_eq!(plain.map(|b| b.len()), Some(4));
        assert_eq!(source, CacheType::Memory);
    }

    #[tokio::test]
    async fn test_transform_failure_is_reported() {
        let (maple_bacon, _) = mock_maple_bacon();
        let reject: Arc<dyn ImageTransformer<Bytes>> =
            Arc::new(FnTransformer::new("reject", |_: Bytes| None));

        let err = maple_bacon
            .image("https://example.com/maple.png", Some(reject), None)
            .await
            .unwrap_err();
        match err {
            MapleBaconError::Transform { transformer } => assert_eq!(transformer, "reject"),
            other => panic!("expected transform error, got {other:?}"),
        }
        assert!(!maple_bacon.is_cached("https://example.com/maple.png", None).await);
    }

    #[tokio::test]
    async fn test_fetch_from_network_does_not_populate_cache() {
        let (maple_bacon, fetcher) = mock_maple_bacon();
        let url = "https://example.com/raw.png";

        let data = maple_bacon.fetch_from_network(url, None).await.unwrap();
        assert!(!data.is_empty());
        assert!(!maple_bacon.is_cached(url, None).await);

        maple_bacon.cache().store(data, url, None).await.unwrap();
        assert!(maple_bacon.is_cached(url, None).await);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let (maple_bacon, fetcher) = mock_maple_bacon();
        let url = "https://example.com/maple.png";
        maple_bacon.image(url, None, None).await.unwrap();

        maple_bacon.clear_cache(CacheScope::All).await;
        let (_, source) = maple_bacon.image(url, None, None).await.unwrap();
        assert_eq!(source, CacheType::None);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_resolves_with_cancelled() {
        let fetcher = Arc::new(GatedFetcher {
            gate: Semaphore::new(0),
        });
        let downloader: Downloader<Bytes> = Downloader::new(fetcher.clone());
        let maple_bacon = MapleBacon::new(mock_cache(), downloader.clone());

        let handle = maple_bacon.image("https://example.com/slow.png", None, None);
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while downloader.in_flight_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        handle.cancel();
        assert!(handle.await.unwrap_err().is_cancelled());

        // Forwarded to the download, which had no other subscriber
        assert_eq!(downloader.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_delivery_is_a_noop() {
        let (maple_bacon, _) = mock_maple_bacon();
        let url = "https://example.com/maple.png";
        let handle = maple_bacon.image(url, None, None);
        let canceller = handle.canceller();

        assert!(handle.await.is_ok());
        canceller.cancel();
        assert!(maple_bacon.is_cached(url, None).await);
    }
}
