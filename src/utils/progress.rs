//! Terminal progress for long query runs.

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over a fixed number of queries.
///
/// Quiet bars are hidden but still count, so callers never branch on it.
#[derive(Debug, Clone)]
pub struct QueryProgress {
    pb: ProgressBar,
}

impl QueryProgress {
    pub fn new(len: u64, msg: &str, quiet: bool) -> Self {
        if quiet {
            return Self::hidden(len);
        }

        let pb = ProgressBar::new(len);
        let style = ProgressStyle::with_template("{msg}: {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ ");
        pb.set_style(style);
        pb.set_message(msg.to_string());
        Self { pb }
    }

    /// A bar that never draws
    pub fn hidden(len: u64) -> Self {
        let pb = ProgressBar::hidden();
        pb.set_length(len);
        Self { pb }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.pb.set_message(msg.into());
    }

    pub fn inc(&self) {
        self.pb.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    /// Print a line above the bar without tearing it
    pub fn println(&self, msg: impl AsRef<str>) {
        self.pb.println(msg);
    }

    pub fn finish(&self, msg: impl Into<String>) {
        self.pb.finish_with_message(msg.into());
    }
}
