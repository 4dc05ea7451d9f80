//! Log and queue collectors for qmail.
//!
//! This module turns raw log bytes and queue directories into per-interval
//! counters behind a single [`Collector`] interface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Watch                             │
//! │  ┌──────────────────────────┐   ┌─────────────────────────┐  │
//! │  │ TailedFile               │   │ PolledDirectory         │  │
//! │  │  FileTailer              │   │  (no line stream)       │  │
//! │  │   └─ LineBuffer (fixed)  │   │                         │  │
//! │  └────────────┬─────────────┘   └────────────┬────────────┘  │
//! │         consume(line)                     tick()             │
//! │               └──────────────┬───────────────┘               │
//! │                       ┌──────▼──────┐                        │
//! │                       │ Accumulator │ Arc<dyn Collector>     │
//! │                       │             │ + owned Stats          │
//! │                       └──────┬──────┘                        │
//! └──────────────────────────────┼───────────────────────────────┘
//!                         combine(stats)
//!                        ┌───────▼──────┐
//!                        │  Aggregator  │ (per SourceKind)
//!                        └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use qmailmon_core::collector::{Collector, SendCollector};
//!
//! let collector = SendCollector;
//! let mut stats = collector.init().unwrap();
//! collector.consume("delivery 7: success: did_1+0+0/", &mut stats);
//! assert_eq!(stats.get("success"), Some(1));
//! ```

mod accumulator;
mod aggregator;
#[allow(clippy::module_inception)]
mod collector;
pub mod log_collector;
pub mod mock;
mod queue;
mod stats;
pub mod traits;
mod watch;

pub use accumulator::Accumulator;
pub use aggregator::{Aggregator, RateLimitAggregator};
pub use collector::Collector;
pub use log_collector::line_buffer::{LineBuffer, SkipState};
pub use log_collector::tailer::FileTailer;
pub use log_collector::{LogFamily, SendCollector, SmtpCollector};
pub use mock::MockFs;
pub use queue::QueueCollector;
pub use stats::{Field, Scope, Stats};
pub use traits::{FileSystem, RealFs};
pub use watch::{SourceKind, Watch};
