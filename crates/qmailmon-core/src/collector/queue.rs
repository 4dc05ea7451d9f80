//! qmail queue size collector.
//!
//! The queue has no log stream, so this collector is driven by `tick` once
//! per interval and samples the queue layout directly:
//!
//! ```text
//! <queue>/mess/<split>/<inode>   one file per queued message
//! <queue>/todo[/<split>]/<inode> messages not yet preprocessed
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::collector::Collector;
use crate::collector::stats::Stats;
use crate::collector::traits::FileSystem;
use crate::error::Error;
use crate::sink::{Chart, ChartType};

/// Counts queued and unprocessed messages.
#[derive(Debug, Clone)]
pub struct QueueCollector<F: FileSystem> {
    fs: F,
    queue_dir: PathBuf,
}

impl<F: FileSystem> QueueCollector<F> {
    pub fn new(fs: F, queue_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            queue_dir: queue_dir.into(),
        }
    }

    /// Files directly in `dir` plus files one level down in split buckets.
    fn count_messages(&self, dir: &Path) -> io::Result<i64> {
        let mut count = 0;
        for entry in self.fs.read_dir(dir)? {
            if self.fs.is_dir(&entry) {
                count += self.fs.read_dir(&entry)?.len() as i64;
            } else {
                count += 1;
            }
        }
        Ok(count)
    }

    fn sample(&self, stats: &mut Stats, field: &str, subdir: &str) {
        let dir = self.queue_dir.join(subdir);
        match self.count_messages(&dir) {
            Ok(count) => stats.set(field, count),
            Err(e) => debug!(path = %dir.display(), error = %e, "cannot count queue"),
        }
    }
}

impl<F: FileSystem> Collector for QueueCollector<F> {
    fn chart(&self) -> Chart {
        Chart {
            family: "queue",
            title: "qmail queue",
            units: "messages",
            context: "qmail.queue",
            chart_type: ChartType::Area,
            priority: 70200,
        }
    }

    fn init(&self) -> Result<Stats, Error> {
        if !self.fs.is_dir(&self.queue_dir.join("mess")) {
            return Err(Error::Init {
                family: "queue",
                reason: format!("{} has no mess directory", self.queue_dir.display()),
            });
        }
        Ok(Stats::new().counter("messages").counter("todo"))
    }

    fn tick(&self, stats: &mut Stats) {
        self.sample(stats, "messages", "mess");
        self.sample(stats, "todo", "todo");
    }
}
