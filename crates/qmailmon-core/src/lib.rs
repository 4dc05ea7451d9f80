//! qmailmon-core - log-ingestion engine for the qmail netdata plugin.
//!
//! Provides:
//! - `collector` - line reassembly, rotation-aware watches, the `Collector`
//!   capability set, per-family collectors and aggregators
//! - `registry` - ordered watches/aggregators and log directory discovery
//! - `dispatcher` - single-threaded event loop (signal, timer, fs notifications)
//! - `sink` - netdata external plugin protocol output
//! - `config` - runtime settings consumed by discovery and the loop

pub mod collector;
pub mod config;
pub mod dispatcher;
mod error;
pub mod registry;
pub mod sink;

pub use config::Config;
pub use dispatcher::{Dispatcher, EventSources, FsNotifier};
pub use error::{Error, SinkError};
pub use registry::Registry;
