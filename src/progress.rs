// src/progress.rs

//! Status reporting for fetches, builds and removals
//!
//! The `ProgressTracker` trait is the interface every long-running step
//! reports through. Implementations:
//! - `CliProgress`: an indicatif spinner on stderr
//! - `LogProgress`: messages go to tracing
//! - `SilentProgress`: no-op, for tests and scripted use

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which tracker a context hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    /// Spinners on the terminal
    #[default]
    Cli,
    /// Plain log lines
    Log,
    /// Nothing at all
    Silent,
}

impl ProgressMode {
    /// Start a tracker for one step
    pub fn start(self, title: &str) -> Box<dyn ProgressTracker> {
        match self {
            ProgressMode::Cli => Box::new(CliProgress::new(title)),
            ProgressMode::Log => Box::new(LogProgress::new(title)),
            ProgressMode::Silent => Box::new(SilentProgress::new()),
        }
    }
}

/// Core trait for progress tracking
///
/// Implementations must be Send + Sync so build output readers can report
/// from their own tasks.
pub trait ProgressTracker: Send + Sync {
    /// Set the current status line (e.g. the latest build output)
    fn set_message(&self, message: &str);

    /// Finish successfully
    fn finish_with_message(&self, message: &str);

    /// Finish after a failure
    fn finish_with_error(&self, message: &str);

    fn is_finished(&self) -> bool;
}

/// No-op tracker
#[derive(Debug, Default)]
pub struct SilentProgress {
    finished: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn finish_with_error(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Tracker that logs instead of drawing
#[derive(Debug)]
pub struct LogProgress {
    title: String,
    finished: AtomicBool,
}

impl LogProgress {
    pub fn new(title: &str) -> Self {
        info!("{}", title);
        Self {
            title: title.to_string(),
            finished: AtomicBool::new(false),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        debug!("[{}] {}", self.title, message);
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        info!("[{}] {}", self.title, message);
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        warn!("[{}] {}", self.title, message);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Spinner with a title line and the latest output underneath
pub struct CliProgress {
    bar: ProgressBar,
    title: String,
    finished: AtomicBool,
    last: Mutex<String>,
}

impl CliProgress {
    pub fn new(title: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {wide_msg:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(title.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            title: title.to_string(),
            finished: AtomicBool::new(false),
            last: Mutex::new(String::new()),
        }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        if let Ok(mut last) = self.last.lock() {
            if *last == message {
                return;
            }
            *last = message.to_string();
        }
        self.bar.set_message(message.to_string());
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        self.bar.finish_and_clear();
        debug!("[{}] {}", self.title, message);
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        self.bar.abandon_with_message(message.to_string());
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_progress_finishes() {
        let progress = ProgressMode::Silent.start("Installing foo");
        assert!(!progress.is_finished());
        progress.set_message("wmake all -j");
        progress.finish_with_message("done");
        assert!(progress.is_finished());
    }

    #[test]
    fn test_log_progress_error_finishes() {
        let progress = LogProgress::new("Building foo");
        progress.finish_with_error("failed");
        assert!(progress.is_finished());
    }
}
