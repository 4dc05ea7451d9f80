//! netdata external plugin protocol writer.

use std::io::Write;
use std::time::Duration;

use super::{Chart, Sink};
use crate::error::SinkError;

/// Writes the netdata plugin protocol to any `Write` (stdout in production).
pub struct NetdataSink<W: Write> {
    out: W,
    update_every: u64,
}

impl<W: Write> NetdataSink<W> {
    pub fn new(out: W, update_every: u64) -> Self {
        Self { out, update_every }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for NetdataSink<W> {
    fn chart(&mut self, id: &str, chart: &Chart) -> Result<(), SinkError> {
        writeln!(
            self.out,
            "CHART {id} '' '{}' '{}' '{}' '{}' {} {} {}",
            chart.title,
            chart.units,
            chart.family,
            chart.context,
            chart.chart_type.as_str(),
            chart.priority,
            self.update_every
        )?;
        Ok(())
    }

    fn dimension(&mut self, id: &str) -> Result<(), SinkError> {
        writeln!(self.out, "DIMENSION {id} '{id}' absolute 1 1")?;
        Ok(())
    }

    fn begin(&mut self, id: &str, elapsed: Duration) -> Result<(), SinkError> {
        writeln!(self.out, "BEGIN {id} {}", elapsed.as_micros())?;
        Ok(())
    }

    fn set(&mut self, id: &str, value: i64) -> Result<(), SinkError> {
        writeln!(self.out, "SET {id} = {value}")?;
        Ok(())
    }

    fn end(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "END")?;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "DISABLE")?;
        self.flush()
    }
}
