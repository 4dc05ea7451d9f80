//! Output side of the plugin: chart declarations and periodic values.
//!
//! The engine never formats protocol text itself. Collectors describe their
//! chart with [`Chart`] and push values through the [`Sink`] trait; the only
//! production implementation is [`NetdataSink`].

mod netdata;

use std::time::Duration;

pub use netdata::NetdataSink;

use crate::error::SinkError;

/// Prefix of every chart id emitted by the plugin.
pub const CHART_TYPE_PREFIX: &str = "qmail";

/// How netdata should draw a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Line,
    Area,
    Stacked,
}

impl ChartType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::Stacked => "stacked",
        }
    }
}

/// Static description of the chart a collector emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chart {
    pub family: &'static str,
    pub title: &'static str,
    pub units: &'static str,
    pub context: &'static str,
    pub chart_type: ChartType,
    pub priority: u32,
}

impl Chart {
    /// Full chart id for one instance, e.g. `qmail.send_qmail_send`.
    pub fn id(&self, name: &str) -> String {
        format!("{CHART_TYPE_PREFIX}.{}_{}", self.family, sanitize_id(name))
    }
}

/// Replaces characters netdata does not accept in ids.
pub fn sanitize_id(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Destination of chart headers and snapshots.
///
/// Mirrors the netdata external plugin verbs. Any error means the collector
/// on the other end is gone and is fatal to the event loop.
pub trait Sink {
    /// Declares a chart; followed by one `dimension` per field.
    fn chart(&mut self, id: &str, chart: &Chart) -> Result<(), SinkError>;

    fn dimension(&mut self, id: &str) -> Result<(), SinkError>;

    /// Opens a value block; `elapsed` is the time since the previous one.
    fn begin(&mut self, id: &str, elapsed: Duration) -> Result<(), SinkError>;

    fn set(&mut self, id: &str, value: i64) -> Result<(), SinkError>;

    /// Closes a value block and flushes it.
    fn end(&mut self) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;

    /// Tells netdata to stop restarting the plugin.
    fn disable(&mut self) -> Result<(), SinkError>;
}
