// Core types
pub mod types;
pub use types::*;

pub mod atomics;
pub mod config;
pub mod order;

// Per-class statistics and per-thread bookkeeping
pub mod stack;
pub mod stats;
pub mod thread_info;
pub use thread_info::ThreadRecord;

pub mod registry;
pub use registry::{all_threads_report, thread_record};

pub mod violation;
pub use violation::{Violation, ViolationCounts, violation_counts};

// Logging functionality
pub mod logger;
pub use logger::init_logger;

// Deadlock detector
pub mod detector;
pub use detector::detect;

// Bookkeeping hooks, compiled out without the `tracking` feature
pub(crate) mod tracking;
pub use tracking::TRACKING_ENABLED;

pub mod locks;
pub mod thread;

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Process-wide configuration of the mutex checks
///
/// ```rust
/// use audio_mutex::Config;
///
/// Config::new()
///     .abort_on_order_check(false)
///     .priority_inheritance(true)
///     .start()
///     .unwrap();
/// assert!(!audio_mutex::config::abort_on_order_check());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    abort_on_order_check: bool,
    abort_on_recursion_check: bool,
    abort_on_invalid_unlock: bool,
    priority_inheritance: bool,
    log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a new Config with default settings
    ///
    /// By default:
    /// - Every violation kind aborts the process
    /// - Priority inheritance is off
    /// - Event logging is disabled
    pub fn new() -> Self {
        Config {
            abort_on_order_check: true,
            abort_on_recursion_check: true,
            abort_on_invalid_unlock: true,
            priority_inheritance: false,
            log_path: None,
        }
    }

    pub fn abort_on_order_check(mut self, enabled: bool) -> Self {
        self.abort_on_order_check = enabled;
        self
    }

    pub fn abort_on_recursion_check(mut self, enabled: bool) -> Self {
        self.abort_on_recursion_check = enabled;
        self
    }

    pub fn abort_on_invalid_unlock(mut self, enabled: bool) -> Self {
        self.abort_on_invalid_unlock = enabled;
        self
    }

    /// Default for mutexes constructed after [`start`](Self::start)
    pub fn priority_inheritance(mut self, enabled: bool) -> Self {
        self.priority_inheritance = enabled;
        self
    }

    /// Activate the event log and set the path for the log file
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the path contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    pub fn with_log<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Apply the settings to the whole process
    ///
    /// # Errors
    /// Returns an error if logger initialization fails
    pub fn start(self) -> Result<()> {
        config::set_abort_on_order_check(self.abort_on_order_check);
        config::set_abort_on_recursion_check(self.abort_on_recursion_check);
        config::set_abort_on_invalid_unlock(self.abort_on_invalid_unlock);
        config::set_priority_inheritance(self.priority_inheritance);

        if let Some(log_path) = self.log_path {
            init_logger(Some(log_path)).context("Failed to initialize logger")?;
        }

        Ok(())
    }
}
