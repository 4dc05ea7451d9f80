//! Error types shared by the engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while setting up or running the plugin.
///
/// Only `Read` is recoverable: it is logged by the watch that hit it and the
/// read is retried on the next interval. Everything else ends the process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to initialize {family} collector: {reason}")]
    Init {
        family: &'static str,
        reason: String,
    },

    #[error("Cannot watch directory {path}: {source}")]
    Subscription {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to start file watcher: {0}")]
    Notifier(#[from] notify::Error),

    #[error("Read failed on {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Cannot scan log directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Nothing to log for qmail in {0}")]
    NothingToMonitor(PathBuf),

    #[error("File watcher channel closed")]
    ChannelClosed,
}

/// The metrics sink could not be written.
#[derive(Error, Debug)]
#[error("Cannot write to metrics sink: {0}")]
pub struct SinkError(#[from] pub io::Error);
