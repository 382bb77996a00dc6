//! Byte progress for file transfers.

use indicatif::{ProgressBar, ProgressStyle};

const SIZED_TEMPLATE: &str = "{msg:<12} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const UNSIZED_TEMPLATE: &str = "{spinner:.green} {msg:<12} {bytes} ({bytes_per_sec})";

/// Creates progress bars for downloads, or hidden ones in quiet mode.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    enabled: bool,
}

impl Progress {
    /// A factory that draws bars when `enabled`.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// A factory whose bars never draw.
    #[must_use]
    pub const fn hidden() -> Self {
        Self::new(false)
    }

    /// Whether bars are drawn.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.enabled
    }

    /// A bar for downloading `name`, sized when the length is known.
    #[must_use]
    pub fn download_bar(self, name: &str, total: Option<u64>) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let (bar, template) = match total {
            Some(len) => (ProgressBar::new(len), SIZED_TEMPLATE),
            None => (ProgressBar::new_spinner(), UNSIZED_TEMPLATE),
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(name.to_owned());
        bar
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(true)
    }
}
