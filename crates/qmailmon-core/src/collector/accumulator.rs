//! Collector plus the interval state it accumulates into.

use std::sync::Arc;
use std::time::Instant;

use crate::collector::Collector;
use crate::collector::stats::Stats;
use crate::error::{Error, SinkError};
use crate::sink::Sink;

/// A named chart instance: shared collector, owned counters, emission clock.
///
/// Both watches and aggregators are built around one of these.
pub struct Accumulator {
    name: String,
    collector: Arc<dyn Collector>,
    stats: Stats,
    last_snapshot: Instant,
}

impl Accumulator {
    pub fn new(name: impl Into<String>, collector: Arc<dyn Collector>) -> Result<Self, Error> {
        let stats = collector.init()?;
        Ok(Self {
            name: name.into(),
            collector,
            stats,
            last_snapshot: Instant::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &'static str {
        self.collector.chart().family
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn consume(&mut self, line: &str) {
        self.collector.consume(line, &mut self.stats);
    }

    pub fn tick(&mut self) {
        self.collector.tick(&mut self.stats);
    }

    /// Folds another accumulator's counters into this one.
    pub fn combine(&mut self, other: &Stats) {
        self.collector.combine(&mut self.stats, other);
    }

    /// Declares the chart and starts the emission clock.
    pub fn emit_header(&mut self, sink: &mut dyn Sink) -> Result<(), SinkError> {
        self.collector.emit_header(sink, &self.name, &self.stats)?;
        self.last_snapshot = Instant::now();
        Ok(())
    }

    pub fn post_process(&mut self) {
        self.collector.post_process(&mut self.stats);
    }

    /// Emits current values with the time elapsed since the previous emission.
    pub fn emit_snapshot(&mut self, sink: &mut dyn Sink) -> Result<(), SinkError> {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_snapshot);
        self.collector.emit_snapshot(sink, &self.name, &self.stats, elapsed)?;
        self.last_snapshot = now;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.collector.reset(&mut self.stats);
    }

    pub fn finalize(self) {
        self.collector.finalize(self.stats);
    }
}

impl std::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator")
            .field("name", &self.name)
            .field("family", &self.family())
            .field("stats", &self.stats)
            .finish()
    }
}
