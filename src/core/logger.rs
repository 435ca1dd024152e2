//! Structured event log for violations and detected wait cycles
//!
//! Disabled until [`Config::with_log`](crate::Config::with_log) names a file.
//! Each record is written as one JSON line and flushed immediately, so a
//! record describing a fatal violation is on disk before the process aborts.

use crate::core::types::{DeadlockInfo, ThreadId};
use crate::core::violation::Violation;
use anyhow::{Context, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Payload of a log line
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRecord<'a> {
    Violation(&'a Violation),
    Deadlock(&'a DeadlockInfo),
}

/// A single log line
#[derive(Debug, Serialize)]
pub struct LogEntry<'a> {
    /// Seconds since the Unix epoch, microsecond precision
    pub timestamp: f64,
    /// Thread that reported the record
    pub tid: ThreadId,
    pub record: LogRecord<'a>,
}

/// Appends log entries to a file
pub struct EventLogger {
    path: PathBuf,
    file: File,
}

impl EventLogger {
    /// Opens (truncating) the log file at `path`
    ///
    /// `{timestamp}` in the file name is replaced with the current UTC time.
    /// Missing parent directories are created.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_timestamp(path.as_ref());

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        Ok(EventLogger { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record. Write errors are dropped.
    pub fn log(&mut self, tid: ThreadId, record: LogRecord<'_>) {
        let now = Utc::now();
        let timestamp = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0;
        let entry = LogEntry {
            timestamp,
            tid,
            record,
        };
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = writeln!(self.file, "{json}").and_then(|_| self.file.flush());
        }
    }
}

#[allow(clippy::literal_string_with_formatting_args)]
fn expand_timestamp(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text.contains("{timestamp}") {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        PathBuf::from(text.replace("{timestamp}", &timestamp))
    } else {
        path.to_path_buf()
    }
}

lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<Option<EventLogger>> = Mutex::new(None);
}

/// Directs the global log to `path`, or disables it when `None`
pub fn init_logger<P: AsRef<Path>>(path: Option<P>) -> Result<()> {
    let logger = path.map(EventLogger::with_file).transpose()?;
    *GLOBAL_LOGGER.lock() = logger;
    Ok(())
}

pub fn is_logging_enabled() -> bool {
    GLOBAL_LOGGER.lock().is_some()
}

/// Path of the active log file
pub fn current_log_file() -> Option<PathBuf> {
    GLOBAL_LOGGER
        .lock()
        .as_ref()
        .map(|logger| logger.path().to_path_buf())
}

pub(crate) fn log_violation(tid: ThreadId, violation: &Violation) {
    if let Some(logger) = GLOBAL_LOGGER.lock().as_mut() {
        logger.log(tid, LogRecord::Violation(violation));
    }
}

pub(crate) fn log_deadlock(tid: ThreadId, info: &DeadlockInfo) {
    if let Some(logger) = GLOBAL_LOGGER.lock().as_mut() {
        logger.log(tid, LogRecord::Deadlock(info));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_basic_logging() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("nested").join("basic.log");

        let mut logger = EventLogger::with_file(&log_path).unwrap();
        logger.log(3, LogRecord::Violation(&Violation::Recursion { order: 7 }));
        let mut info = DeadlockInfo::new(3);
        info.chain.push((4, "ThreadBase_Mutex".to_string()));
        logger.log(3, LogRecord::Deadlock(&info));

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tid"], 3);
        assert!(lines[0]["timestamp"].as_f64().unwrap() > 0.0);
        assert_eq!(lines[0]["record"]["violation"]["kind"], "recursion");
        assert_eq!(lines[1]["record"]["deadlock"]["chain"][0][1], "ThreadBase_Mutex");
    }

    #[test]
    fn test_timestamp_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let logger = EventLogger::with_file(temp_dir.path().join("run_{timestamp}.log")).unwrap();
        let name = logger.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("run_"));
        assert!(!name.contains("{timestamp}"));
        assert!(logger.path().exists());
    }
}
