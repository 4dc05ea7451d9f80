//! The capability set every source family and aggregator implements.

use std::time::Duration;

use crate::collector::stats::Stats;
use crate::error::{Error, SinkError};
use crate::sink::{Chart, Sink};

/// Per-family behavior plugged into watches and aggregators.
///
/// A collector is shared (`Arc<dyn Collector>`) and stateless; all counters
/// live in the `Stats` owned by the watch or aggregator that holds it. The
/// dispatcher calls these methods without knowing the concrete family.
pub trait Collector {
    /// Chart metadata; `family` doubles as the collector name in logs.
    fn chart(&self) -> Chart;

    /// Builds the zero-valued accumulator for one watch or aggregator.
    fn init(&self) -> Result<Stats, Error>;

    /// Accounts one complete line. Lines that match nothing are ignored.
    fn consume(&self, _line: &str, _stats: &mut Stats) {}

    /// Samples sources that have no line stream, such as a polled directory.
    fn tick(&self, _stats: &mut Stats) {}

    /// Folds one watch's interval counters into an aggregator's.
    fn combine(&self, into: &mut Stats, from: &Stats) {
        into.merge(from);
    }

    /// Computes derived fields just before emission.
    fn post_process(&self, _stats: &mut Stats) {}

    /// Declares the chart and one dimension per accumulator field.
    fn emit_header(
        &self,
        sink: &mut dyn Sink,
        name: &str,
        stats: &Stats,
    ) -> Result<(), SinkError> {
        let chart = self.chart();
        sink.chart(&chart.id(name), &chart)?;
        for field in stats.fields() {
            sink.dimension(field.name)?;
        }
        sink.flush()
    }

    /// Emits the current values of every field.
    fn emit_snapshot(
        &self,
        sink: &mut dyn Sink,
        name: &str,
        stats: &Stats,
        elapsed: Duration,
    ) -> Result<(), SinkError> {
        sink.begin(&self.chart().id(name), elapsed)?;
        for field in stats.fields() {
            sink.set(field.name, field.value)?;
        }
        sink.end()
    }

    /// Zeroes interval-scoped fields.
    fn reset(&self, stats: &mut Stats) {
        stats.reset();
    }

    /// Releases the accumulator at shutdown.
    fn finalize(&self, stats: Stats) {
        drop(stats);
    }
}
