//! Runtime settings for discovery and the event loop.

use std::path::PathBuf;
use std::time::Duration;

use crate::collector::LineBuffer;

/// Default root holding one multilog directory per qmail service.
pub const DEFAULT_LOG_DIR: &str = "/var/log/qmail";

/// Default qmail queue location.
pub const DEFAULT_QUEUE_DIR: &str = "/var/qmail/queue";

/// Name of the live file multilog writes in each log directory.
pub const DEFAULT_FILE_NAME: &str = "current";

/// Settings resolved by the binary from its arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for `send`/`smtp` log subdirectories.
    pub log_dir: PathBuf,
    /// Snapshot interval (netdata `update_every`).
    pub interval: Duration,
    /// Queue directory to poll, `None` disables the queue watch.
    pub queue_dir: Option<PathBuf>,
    /// File tailed inside each log directory.
    pub file_name: String,
    /// Reassembly buffer capacity per tailed file, in bytes.
    pub buffer_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            interval: Duration::from_secs(1),
            queue_dir: Some(PathBuf::from(DEFAULT_QUEUE_DIR)),
            file_name: DEFAULT_FILE_NAME.to_string(),
            buffer_capacity: LineBuffer::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Interval in whole seconds as announced to netdata (at least 1).
    pub fn update_every(&self) -> u64 {
        self.interval.as_secs().max(1)
    }
}
