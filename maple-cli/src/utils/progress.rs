use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use maple_bacon::{Progress, ProgressHandler};

fn download_style() -> Option<ProgressStyle> {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}")
        .ok()
        .map(|style| style.progress_chars("=> "))
}

/// One progress bar per fetched URL
#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            disabled: true,
        }
    }

    /// Create a bar for `url`, returning it with a handler that drives it
    pub fn start(&self, url: &str) -> Option<(ProgressBar, ProgressHandler)> {
        if self.disabled {
            return None;
        }

        let bar = self.multi.add(ProgressBar::new(0));
        if let Some(style) = download_style() {
            bar.set_style(style);
        }
        bar.set_message(format!("Fetching {url}"));
        bar.enable_steady_tick(Duration::from_millis(500));

        let handle = bar.clone();
        let handler: ProgressHandler = Box::new(move |progress: Progress| {
            if let Some(total) = progress.expected {
                handle.set_length(total);
            }
            handle.set_position(progress.received);
        });
        Some((bar, handler))
    }
}
