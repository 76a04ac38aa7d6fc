//! Progress reporting for archive and merge operations.
//!
//! Bars are only drawn when enabled; a disabled reporter is a no-op so the
//! library stays quiet under tests and `--quiet`.

use indicatif::{ProgressBar, ProgressStyle};

/// Per-file progress bar with a known total.
#[derive(Debug)]
pub struct FileProgress {
    bar: Option<ProgressBar>,
}

impl FileProgress {
    /// Creates a progress bar for `total` files, or a no-op when disabled.
    pub fn new(enabled: bool, total: u64, message: &str) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%)")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(message.to_string());
        Self { bar: Some(bar) }
    }

    /// A reporter that draws nothing.
    pub fn disabled() -> Self {
        Self { bar: None }
    }

    /// Whether a bar is being drawn.
    pub fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }

    /// Increments progress by one file.
    pub fn inc(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    /// Finishes the bar, leaving a final message.
    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }
}
