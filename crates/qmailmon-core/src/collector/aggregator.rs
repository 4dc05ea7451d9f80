//! Cross-source accumulators.
//!
//! An aggregator folds the interval counters of every watch of one
//! `SourceKind` into its own chart, after each watch has been read and
//! before it is reset.

use std::sync::Arc;

use crate::collector::Collector;
use crate::collector::accumulator::Accumulator;
use crate::collector::stats::Stats;
use crate::collector::watch::{SourceKind, Watch};
use crate::error::{Error, SinkError};
use crate::sink::{Chart, ChartType, Sink};

/// Combines statistics across all watches of one kind.
#[derive(Debug)]
pub struct Aggregator {
    kind: SourceKind,
    acc: Accumulator,
}

impl Aggregator {
    pub fn new(
        kind: SourceKind,
        name: impl Into<String>,
        collector: Arc<dyn Collector>,
    ) -> Result<Self, Error> {
        Ok(Self {
            kind,
            acc: Accumulator::new(name, collector)?,
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.acc.name()
    }

    pub fn stats(&self) -> &Stats {
        self.acc.stats()
    }

    /// Folds `watch` in when it is of this aggregator's kind.
    pub fn combine(&mut self, watch: &Watch) {
        if watch.kind() == self.kind {
            self.acc.combine(watch.stats());
        }
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

    pub fn finalize(self) {
        self.acc.finalize();
    }
}

/// Table update results of the ratelimitspp plugin across all smtpd logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateLimitAggregator;

impl RateLimitAggregator {
    /// Chart instance name of the aggregate.
    pub const NAME: &'static str = "table_updates";
}

impl Collector for RateLimitAggregator {
    fn chart(&self) -> Chart {
        Chart {
            family: "ratelimitspp",
            title: "Table updates by ratelimitspp",
            units: "update",
            context: "ratelimitspp.table_updates",
            chart_type: ChartType::Stacked,
            priority: 70300,
        }
    }

    fn init(&self) -> Result<Stats, Error> {
        Ok(Stats::new()
            .counter("conn_timeout")
            .counter("error")
            .counter("ratelimited"))
    }
}
