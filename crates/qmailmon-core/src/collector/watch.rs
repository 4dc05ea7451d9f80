//! One monitored source: a tailed log file or a polled directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, trace, warn};

use crate::collector::Collector;
use crate::collector::accumulator::Accumulator;
use crate::collector::log_collector::tailer::FileTailer;
use crate::collector::stats::Stats;
use crate::error::{Error, SinkError};
use crate::sink::Sink;

/// How a watch gets its input. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Lines read from a file in a notified directory.
    TailedFile,
    /// No line stream; the collector samples on each tick.
    PolledDirectory,
}

#[derive(Debug)]
enum Source {
    Tailed(FileTailer),
    Polled,
}

/// A source plus the accumulator it feeds.
#[derive(Debug)]
pub struct Watch {
    source: Source,
    acc: Accumulator,
}

impl Watch {
    /// Tails `dir/file_name` from its current end.
    ///
    /// The chart is named after the directory's last component.
    pub fn tailed(
        dir: PathBuf,
        file_name: impl Into<OsString>,
        collector: Arc<dyn Collector>,
        capacity: usize,
    ) -> Result<Self, Error> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        let acc = Accumulator::new(name, collector)?;
        let tailer = FileTailer::new(dir, file_name, capacity);

        Ok(Self {
            source: Source::Tailed(tailer),
            acc,
        })
    }

    /// A source sampled through `Collector::tick`.
    pub fn polled(name: impl Into<String>, collector: Arc<dyn Collector>) -> Result<Self, Error> {
        Ok(Self {
            source: Source::Polled,
            acc: Accumulator::new(name, collector)?,
        })
    }

    pub fn kind(&self) -> SourceKind {
        match self.source {
            Source::Tailed(_) => SourceKind::TailedFile,
            Source::Polled => SourceKind::PolledDirectory,
        }
    }

    pub fn name(&self) -> &str {
        self.acc.name()
    }

    pub fn stats(&self) -> &Stats {
        self.acc.stats()
    }

    pub fn tailer(&self) -> Option<&FileTailer> {
        match &self.source {
            Source::Tailed(tailer) => Some(tailer),
            Source::Polled => None,
        }
    }

    /// Directory whose notifications concern this watch.
    pub fn directory(&self) -> Option<&Path> {
        self.tailer().map(FileTailer::dir)
    }

    /// Pulls whatever input is available: drains the file or ticks the collector.
    pub fn poll(&mut self) {
        match self.kind() {
            SourceKind::TailedFile => self.read_lines(),
            SourceKind::PolledDirectory => self.acc.tick(),
        }
    }

    /// Reads pending lines into the accumulator. Read errors are logged and
    /// retried on the next call.
    fn read_lines(&mut self) {
        let Source::Tailed(tailer) = &mut self.source else {
            return;
        };
        let acc = &mut self.acc;

        match tailer.read_lines(|line| acc.consume(line)) {
            Ok(0) => {}
            Ok(lines) => trace!(watch = acc.name(), lines, "read log lines"),
            Err(e) => warn!(watch = acc.name(), "{e}"),
        }
    }

    /// Handles "entry created at `path`": if it replaces the tailed file,
    /// drains the old file and reopens the new one from its start.
    ///
    /// Bytes appended to the old file between this drain and the reopen are
    /// not recovered.
    ///
    /// Returns whether the event concerned this watch.
    pub fn handle_created(&mut self, path: &Path) -> bool {
        let matches = self.tailer().is_some_and(|t| t.matches(path));
        if !matches {
            return false;
        }

        self.read_lines();
        if let Source::Tailed(tailer) = &mut self.source {
            tailer.reopen();
            info!(watch = self.acc.name(), path = %path.display(), "log file rotated");
        }
        true
    }

    pub fn emit_header(&mut self, sink: &mut dyn Sink) -> Result<(), SinkError> {
        self.acc.emit_header(sink)
    }

    pub fn post_process(&mut self) {
        self.acc.post_process();
    }

    pub fn emit_snapshot(&mut self, sink: &mut dyn Sink) -> Result<(), SinkError> {
        self.acc.emit_snapshot(sink)
    }

    pub fn reset(&mut self) {
        self.acc.reset();
    }

    /// Releases collector state; the file handle closes on drop.
    pub fn finalize(self) {
        self.acc.finalize();
    }
}
