//! Active watches and aggregators, and their discovery at startup.
//!
//! Insertion order is emission order. The registry is only mutated before
//! the event loop starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collector::{
    Aggregator, LogFamily, QueueCollector, RateLimitAggregator, RealFs, SourceKind, Watch,
};
use crate::config::Config;
use crate::dispatcher::FsNotifier;
use crate::error::Error;

/// Ordered collections iterated once per interval.
#[derive(Debug, Default)]
pub struct Registry {
    watches: Vec<Watch>,
    aggregators: Vec<Aggregator>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_watch(&mut self, watch: Watch) {
        self.watches.push(watch);
    }

    pub fn add_aggregator(&mut self, aggregator: Aggregator) {
        self.aggregators.push(aggregator);
    }

    pub fn watches(&self) -> &[Watch] {
        &self.watches
    }

    pub fn aggregators(&self) -> &[Aggregator] {
        &self.aggregators
    }

    /// True when there is no watch to read; aggregators alone emit nothing useful.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub(crate) fn watches_mut(&mut self) -> &mut [Watch] {
        &mut self.watches
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut [Watch], &mut [Aggregator]) {
        (&mut self.watches, &mut self.aggregators)
    }

    /// Releases every accumulator; file handles close as watches drop.
    pub fn finalize(self) {
        for watch in self.watches {
            watch.finalize();
        }
        for aggregator in self.aggregators {
            aggregator.finalize();
        }
    }

    /// Builds the registry for `config`.
    ///
    /// One tailed watch per `send`/`smtp` log directory (each subscribed for
    /// creation events), then the queue watch, then the ratelimitspp
    /// aggregator.
    pub fn discover(config: &Config, notifier: &mut FsNotifier) -> Result<Self, Error> {
        let mut registry = Registry::new();

        for (dir, family) in discover_log_dirs(&config.log_dir)? {
            info!(dir = %dir.display(), family = ?family, "log directory detected");
            notifier.subscribe(&dir)?;
            registry.add_watch(Watch::tailed(
                dir,
                config.file_name.as_str(),
                family.collector(),
                config.buffer_capacity,
            )?);
        }

        if let Some(queue_dir) = &config.queue_dir {
            let collector = QueueCollector::new(RealFs::new(), queue_dir.clone());
            match Watch::polled("queue", Arc::new(collector)) {
                Ok(watch) => {
                    debug!(dir = %queue_dir.display(), "polling queue directory");
                    registry.add_watch(watch);
                }
                Err(e @ Error::Init { .. }) => warn!("{e}, queue chart disabled"),
                Err(e) => return Err(e),
            }
        }

        if registry.is_empty() {
            return Err(Error::NothingToMonitor(config.log_dir.clone()));
        }

        registry.add_aggregator(Aggregator::new(
            SourceKind::TailedFile,
            RateLimitAggregator::NAME,
            Arc::new(RateLimitAggregator),
        )?);

        Ok(registry)
    }
}

/// Lists log subdirectories of `root` with their family, sorted by name.
///
/// Hidden entries and names matching no family are skipped. Paths are
/// absolute so they compare equal to notification event paths.
pub fn discover_log_dirs(root: &Path) -> Result<Vec<(PathBuf, LogFamily)>, Error> {
    let discovery_error = |source| Error::Discovery {
        path: root.to_path_buf(),
        source,
    };

    let root = std::fs::canonicalize(root).map_err(discovery_error)?;
    let mut found = Vec::new();

    for entry in std::fs::read_dir(&root).map_err(discovery_error)? {
        let entry = entry.map_err(discovery_error)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        if let Some(family) = LogFamily::detect(&name) {
            found.push((entry.path(), family));
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}
