//! Subcommand implementations

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::future::join_all;
use indicatif::MultiProgress;
use maple_bacon::{
    CacheScope, CacheType, EncodedImage, MapleBacon, MapleBaconConfig, MapleBaconConfigBuilder,
    ProxyConfig, ProxyType,
};
use tracing::{error, info, warn};
use url::Url;

use crate::cli::{CliArgs, FetchArgs};
use crate::error::AppError;
use crate::utils::parse_headers;
use crate::utils::progress::ProgressManager;

/// Common cache settings shared by every subcommand
fn base_builder(args: &CliArgs, max_age: Duration) -> MapleBaconConfigBuilder {
    let mut builder = MapleBaconConfig::builder()
        .with_cache_name(&args.name)
        .with_max_cache_age(max_age);
    if let Some(dir) = &args.cache_dir {
        builder = builder.with_cache_root(dir);
    }
    builder
}

fn open(config: &MapleBaconConfig) -> Result<MapleBacon<EncodedImage>, AppError> {
    let maple_bacon = MapleBacon::with_config(config)?;
    info!(
        name = %config.cache_name,
        dir = %maple_bacon.cache().disk().cache_dir().display(),
        "Opened cache"
    );
    Ok(maple_bacon)
}

/// File name for a fetched image: the last URL path segment with the
/// extension replaced by the detected image type.
fn output_file_name(url: &str, index: usize, image: &EncodedImage) -> String {
    let stem = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .filter(|s| !s.is_empty())
        .map(|s| match s.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_owned(),
            _ => s,
        })
        .unwrap_or_else(|| format!("image_{index}"));
    format!("{stem}.{}", image.image_type.extension())
}

pub async fn fetch(args: &CliArgs, fetch_args: &FetchArgs, max_age: Duration) -> Result<(), AppError> {
    let mut builder = base_builder(args, max_age)
        .with_timeout(Duration::from_secs(fetch_args.timeout))
        .with_connect_timeout(Duration::from_secs(fetch_args.connect_timeout))
        .with_system_proxy(!fetch_args.no_proxy);

    let headers = parse_headers(
        maple_bacon::FetcherConfig::get_default_headers(),
        &fetch_args.headers,
    );
    builder = builder.with_headers(headers);

    if let Some(url) = &fetch_args.proxy {
        let proxy_type = fetch_args
            .proxy_type
            .parse::<ProxyType>()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        builder = builder.with_proxy(ProxyConfig::new(url, proxy_type));
    }

    let config = builder.build();
    let maple_bacon = open(&config)?;

    if let Some(dir) = &fetch_args.output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let progress = if fetch_args.no_progress {
        ProgressManager::new_disabled(MultiProgress::new())
    } else {
        ProgressManager::new(MultiProgress::new())
    };

    let start = Instant::now();
    let requests = fetch_args.urls.iter().enumerate().map(|(index, url)| {
        let maple_bacon = maple_bacon.clone();
        let progress = progress.clone();
        async move {
            let (bar, handler) = match progress.start(url) {
                Some((bar, handler)) => (Some(bar), Some(handler)),
                None => (None, None),
            };
            let result = maple_bacon.image(url, None, handler).await;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            (index, url, result)
        }
    });

    let mut failures = 0usize;
    for (index, url, result) in join_all(requests).await {
        match result {
            Ok((image, source)) => {
                info!(
                    url = %url,
                    kind = ?image.image_type,
                    size = image.data.len(),
                    source = source_label(source),
                    "Fetched image"
                );
                if let Some(dir) = &fetch_args.output_dir {
                    write_output(dir, &output_file_name(url, index, &image), &image).await?;
                }
            }
            Err(e) => {
                failures += 1;
                error!(url = %url, error = %e, "Failed to fetch image");
            }
        }
    }

    info!(
        total = fetch_args.urls.len(),
        failed = failures,
        elapsed = ?start.elapsed(),
        "Fetch finished"
    );

    if failures > 0 {
        return Err(AppError::InvalidInput(format!(
            "{failures} of {} image(s) could not be fetched",
            fetch_args.urls.len()
        )));
    }
    Ok(())
}

fn source_label(source: CacheType) -> &'static str {
    match source {
        CacheType::None => "network",
        CacheType::Memory => "memory",
        CacheType::Disk => "disk",
    }
}

async fn write_output(dir: &Path, file_name: &str, image: &EncodedImage) -> Result<(), AppError> {
    let path: PathBuf = dir.join(file_name);
    tokio::fs::write(&path, &image.data).await?;
    info!(path = %path.display(), "Wrote image");
    Ok(())
}

pub async fn clear(args: &CliArgs, max_age: Duration, scope: CacheScope) -> Result<(), AppError> {
    let maple_bacon = open(&base_builder(args, max_age).build())?;
    maple_bacon.clear_cache(scope).await;
    info!(scope = ?scope, "Cleared cache");
    Ok(())
}

pub async fn expired(args: &CliArgs, max_age: Duration) -> Result<(), AppError> {
    let maple_bacon = open(&base_builder(args, max_age).build())?;
    let paths = maple_bacon.cache().expired_file_urls().await;
    if paths.is_empty() {
        info!("No expired entries");
    }
    for path in &paths {
        println!("{}", path.display());
    }
    Ok(())
}

pub async fn sweep(args: &CliArgs, max_age: Duration) -> Result<(), AppError> {
    let maple_bacon = open(&base_builder(args, max_age).build())?;
    let removed = maple_bacon.cache().sweep_expired().await;
    if removed == 0 {
        warn!("Nothing to sweep");
    } else {
        info!(removed, "Swept expired entries");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use maple_bacon::ImageType;

    fn png() -> EncodedImage {
        EncodedImage {
            data: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
            image_type: ImageType::Png,
        }
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(
            output_file_name("https://example.com/a/photo.jpg", 0, &png()),
            "photo.png"
        );
        assert_eq!(output_file_name("https://example.com/", 3, &png()), "image_3.png");
        assert_eq!(output_file_name("not a url", 1, &png()), "image_1.png");
    }
}
