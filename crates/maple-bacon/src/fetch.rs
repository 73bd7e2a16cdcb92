//! # Network Fetching
//!
//! The [`Fetch`] trait is the network capability the downloader runs on.
//! [`HttpFetcher`] implements it with reqwest.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use rustls::ClientConfig;
use rustls::crypto::aws_lc_rs;
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::FetcherConfig;

/// Upper bound on the buffer reserved up front from a `Content-Length` header
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Bytes received so far and the total, when the server announced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub received: u64,
    pub expected: Option<u64>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, if the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.expected {
            Some(0) => Some(1.0),
            Some(total) => Some((self.received as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Callback receiving the progress of one request
pub type ProgressHandler = Box<dyn FnMut(Progress) + Send>;

/// Errors raised while fetching a resource
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("Server returned status code {0}")]
    Status(StatusCode),

    #[error("Invalid proxy configuration: {0}")]
    Proxy(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Arc::new(err))
    }
}

/// Retrieves the raw bytes behind a locator.
///
/// Dropping the returned future cancels the request.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(
        &self,
        locator: &str,
        progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<Bytes, FetchError>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &FetcherConfig) -> Result<Client, FetchError> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    // Build platform default TLS configuration
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| FetchError::Tls(e.to_string()))?
        .with_platform_verifier()
        .map_err(|e| FetchError::Tls(e.to_string()))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        client_builder = client_builder.proxy(proxy_config.to_proxy()?);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy for images");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings for images");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for images");
    }

    client_builder.build().map_err(FetchError::from)
}

/// [`Fetch`] implementation performing HTTP GET requests
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    /// Wrap an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(skip(self, progress), level = "debug")]
    async fn fetch(
        &self,
        locator: &str,
        progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<Bytes, FetchError> {
        let url = locator
            .parse::<Url>()
            .map_err(|e| FetchError::InvalidUrl(format!("{locator}: {e}")))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let expected = response.content_length();
        let capacity = expected.unwrap_or(0).min(MAX_PREALLOC) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);

        progress(Progress {
            received: 0,
            expected,
        });

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            progress(Progress {
                received: buffer.len() as u64,
                expected,
            });
        }

        debug!(url = %locator, size = buffer.len(), "Fetched resource");
        Ok(buffer.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let half = Progress {
            received: 5,
            expected: Some(10),
        };
        assert_eq!(half.fraction(), Some(0.5));

        let unknown = Progress {
            received: 5,
            expected: None,
        };
        assert_eq!(unknown.fraction(), None);

        let empty = Progress {
            received: 0,
            expected: Some(0),
        };
        assert_eq!(empty.fraction(), Some(1.0));
    }
}
