//! qmail log file collectors.
//!
//! Tails multilog directories (`send`, `smtpd`, ...), reassembles lines with
//! a fixed-size buffer, classifies them and counts the events per interval.

pub mod line_buffer;
pub mod parser;
pub mod tailer;

use std::sync::Arc;

use crate::collector::Collector;
use crate::collector::stats::Stats;
use crate::error::Error;
use crate::sink::{Chart, ChartType};

use parser::{DeliveryResult, RateLimitEvent, SendEvent, SmtpEvent};

/// Log directory families recognised by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFamily {
    Send,
    Smtp,
}

impl LogFamily {
    /// Picks the family from a log directory name; `send` wins over `smtp`.
    pub fn detect(dir_name: &str) -> Option<Self> {
        if dir_name.contains("send") {
            Some(LogFamily::Send)
        } else if dir_name.contains("smtp") {
            Some(LogFamily::Smtp)
        } else {
            None
        }
    }

    pub fn collector(self) -> Arc<dyn Collector> {
        match self {
            LogFamily::Send => Arc::new(SendCollector),
            LogFamily::Smtp => Arc::new(SmtpCollector),
        }
    }
}

/// Counts qmail-send message and delivery events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendCollector;

impl Collector for SendCollector {
    fn chart(&self) -> Chart {
        Chart {
            family: "send",
            title: "qmail-send deliveries",
            units: "events",
            context: "qmail.send",
            chart_type: ChartType::Line,
            priority: 70000,
        }
    }

    fn init(&self) -> Result<Stats, Error> {
        Ok(Stats::new()
            .counter("new_msg")
            .counter("end_msg")
            .counter("bounce")
            .counter("success")
            .counter("failure")
            .counter("deferral")
            .counter("success_permille")
            .gauge("local_busy")
            .gauge("remote_busy"))
    }

    fn consume(&self, line: &str, stats: &mut Stats) {
        match parser::parse_send_line(line) {
            Some(SendEvent::NewMsg) => stats.incr("new_msg"),
            Some(SendEvent::EndMsg) => stats.incr("end_msg"),
            Some(SendEvent::Bounce) => stats.incr("bounce"),
            Some(SendEvent::Delivery(DeliveryResult::Success)) => stats.incr("success"),
            Some(SendEvent::Delivery(DeliveryResult::Failure)) => stats.incr("failure"),
            Some(SendEvent::Delivery(DeliveryResult::Deferral)) => stats.incr("deferral"),
            Some(SendEvent::Status { local, remote }) => {
                stats.set("local_busy", local);
                stats.set("remote_busy", remote);
            }
            None => {}
        }
    }

    fn post_process(&self, stats: &mut Stats) {
        let success = stats.get("success").unwrap_or(0);
        let attempts = success
            + stats.get("failure").unwrap_or(0)
            + stats.get("deferral").unwrap_or(0);
        let permille = if attempts > 0 {
            success * 1000 / attempts
        } else {
            0
        };
        stats.set("success_permille", permille);
    }
}

/// Counts tcpserver connections and ratelimitspp verdicts for qmail-smtpd.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpCollector;

impl Collector for SmtpCollector {
    fn chart(&self) -> Chart {
        Chart {
            family: "smtp",
            title: "qmail-smtpd connections",
            units: "connections",
            context: "qmail.smtp",
            chart_type: ChartType::Line,
            priority: 70100,
        }
    }

    fn init(&self) -> Result<Stats, Error> {
        Ok(Stats::new()
            .counter("accepted")
            .counter("denied")
            .counter("ended_ok")
            .counter("ended_failed")
            .counter("conn_timeout")
            .counter("error")
            .counter("ratelimited")
            .gauge("busy"))
    }

    fn consume(&self, line: &str, stats: &mut Stats) {
        match parser::parse_smtp_line(line) {
            Some(SmtpEvent::Accepted) => stats.incr("accepted"),
            Some(SmtpEvent::Denied) => stats.incr("denied"),
            Some(SmtpEvent::End { status: 0 }) => stats.incr("ended_ok"),
            Some(SmtpEvent::End { .. }) => stats.incr("ended_failed"),
            Some(SmtpEvent::Status { busy }) => stats.set("busy", busy),
            Some(SmtpEvent::RateLimit(RateLimitEvent::ConnTimeout)) => stats.incr("conn_timeout"),
            Some(SmtpEvent::RateLimit(RateLimitEvent::Error)) => stats.incr("error"),
            Some(SmtpEvent::RateLimit(RateLimitEvent::Ratelimited)) => stats.incr("ratelimited"),
            None => {}
        }
    }
}
