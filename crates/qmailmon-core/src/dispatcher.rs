//! Single-threaded event loop.
//!
//! Waits on three channels (termination signal, interval ticks, directory
//! notifications) and services them in that priority order. All work for
//! one wake-up runs to completion before waiting again.
//!
//! ```text
//!  ctrlc handler ──► shutdown ─┐
//!  tick(interval) ─► ticks ────┼─► Select::ready() ─► signal? ─► stop
//!  notify watcher ─► fs_events ┘                      fs events ─► rotate watches
//!                                                     tick ─► interval cycle
//! ```

use std::path::Path;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Select, TryRecvError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::registry::Registry;
use crate::sink::Sink;

/// Result delivered by the notify watcher for each filesystem change.
pub type FsEvent = notify::Result<Event>;

/// Directory change subscriptions backed by one `notify` watcher.
pub struct FsNotifier {
    watcher: RecommendedWatcher,
    events: Receiver<FsEvent>,
}

impl FsNotifier {
    pub fn new() -> Result<Self, Error> {
        let (tx, events) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |res: FsEvent| {
            if is_forwarded(&res) {
                let _ = tx.send(res);
            }
        })?;
        Ok(Self { watcher, events })
    }

    /// Watches `dir` (non-recursively) for entries created in it.
    pub fn subscribe(&mut self, dir: &Path) -> Result<(), Error> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| Error::Subscription {
                path: dir.to_path_buf(),
                source,
            })?;
        debug!(dir = %dir.display(), "watching directory");
        Ok(())
    }
}

/// Only entry creations and watcher errors reach the loop; appends to a
/// tailed file would otherwise wake it on every log write.
fn is_forwarded(res: &FsEvent) -> bool {
    match res {
        Ok(event) => matches!(event.kind, EventKind::Create(_)),
        Err(_) => true,
    }
}

/// The three inputs of the loop. Dropping it tears down the watcher.
pub struct EventSources {
    shutdown: Receiver<()>,
    ticks: Receiver<Instant>,
    fs_events: Receiver<FsEvent>,
    _watcher: Option<RecommendedWatcher>,
}

impl EventSources {
    pub fn new(shutdown: Receiver<()>, interval: Duration, notifier: FsNotifier) -> Self {
        Self {
            shutdown,
            ticks: crossbeam_channel::tick(interval),
            fs_events: notifier.events,
            _watcher: Some(notifier.watcher),
        }
    }

    /// Sources fed by the caller, without an OS watcher.
    pub fn from_channels(
        shutdown: Receiver<()>,
        ticks: Receiver<Instant>,
        fs_events: Receiver<FsEvent>,
    ) -> Self {
        Self {
            shutdown,
            ticks,
            fs_events,
            _watcher: None,
        }
    }
}

/// Whether the loop keeps running after a wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Drives reads, rotation handling and periodic emission.
pub struct Dispatcher<S: Sink> {
    registry: Registry,
    sink: S,
    sources: EventSources,
}

impl<S: Sink> Dispatcher<S> {
    pub fn new(registry: Registry, sink: S, sources: EventSources) -> Self {
        Self {
            registry,
            sink,
            sources,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Emits chart headers, then loops until the termination signal.
    ///
    /// Returns `Ok` on a clean shutdown; sink and channel failures are
    /// returned as errors. Collector state is finalized either way.
    pub fn run(mut self) -> Result<(), Error> {
        let result = self.event_loop();
        self.registry.finalize();
        result
    }

    fn event_loop(&mut self) -> Result<(), Error> {
        self.emit_headers()?;
        info!(
            watches = self.registry.watches().len(),
            aggregators = self.registry.aggregators().len(),
            "starting event loop"
        );

        while self.step()? == Flow::Continue {}

        info!("shutting down");
        Ok(())
    }

    /// Declares every watch chart, then every aggregator chart.
    pub fn emit_headers(&mut self) -> Result<(), Error> {
        let sink: &mut dyn Sink = &mut self.sink;
        let (watches, aggregators) = self.registry.parts_mut();

        for watch in watches.iter_mut() {
            watch.emit_header(sink)?;
        }
        for aggregator in aggregators.iter_mut() {
            aggregator.emit_header(sink)?;
        }
        Ok(())
    }

    /// Blocks until a source is ready and services one wake-up.
    pub fn step(&mut self) -> Result<Flow, Error> {
        self.wait();

        match self.sources.shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                info!("received shutdown signal");
                return Ok(Flow::Stop);
            }
            Err(TryRecvError::Empty) => {}
        }

        self.process_fs_events()?;

        if self.drain_ticks()? {
            self.run_interval()?;
        }

        Ok(Flow::Continue)
    }

    fn wait(&self) {
        let mut select = Select::new();
        select.recv(&self.sources.shutdown);
        select.recv(&self.sources.fs_events);
        select.recv(&self.sources.ticks);
        select.ready();
    }

    fn process_fs_events(&mut self) -> Result<(), Error> {
        loop {
            match self.sources.fs_events.try_recv() {
                Ok(Ok(event)) => self.handle_fs_event(&event),
                Ok(Err(e)) => warn!("file watcher error: {e}"),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(Error::ChannelClosed),
            }
        }
    }

    /// Routes a creation event to the watches whose file it replaces.
    pub fn handle_fs_event(&mut self, event: &Event) {
        if !matches!(event.kind, EventKind::Create(_)) {
            return;
        }

        for path in &event.paths {
            trace!(path = %path.display(), "entry created");
            for watch in self.registry.watches_mut() {
                watch.handle_created(path);
            }
        }
    }

    /// Empties the tick channel; true when at least one tick was pending.
    fn drain_ticks(&self) -> Result<bool, Error> {
        let mut fired = false;
        loop {
            match self.sources.ticks.try_recv() {
                Ok(_) => fired = true,
                Err(TryRecvError::Empty) => return Ok(fired),
                Err(TryRecvError::Disconnected) => return Err(Error::ChannelClosed),
            }
        }
    }

    /// One interval: read, aggregate, emit and reset every watch in
    /// registry order, then emit and reset every aggregator.
    pub fn run_interval(&mut self) -> Result<(), Error> {
        let sink: &mut dyn Sink = &mut self.sink;
        let (watches, aggregators) = self.registry.parts_mut();

        for watch in watches.iter_mut() {
            watch.poll();
            for aggregator in aggregators.iter_mut() {
                aggregator.combine(watch);
            }
            watch.post_process();
            watch.emit_snapshot(sink)?;
            watch.reset();
        }

        for aggregator in aggregators.iter_mut() {
            aggregator.post_process();
            aggregator.emit_snapshot(sink)?;
            aggregator.reset();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{
        Aggregator, RateLimitAggregator, SendCollector, SmtpCollector, SourceKind, Watch,
    };
    use crate::sink::NetdataSink;
    use crossbeam_channel::Sender;
    use notify::event::CreateKind;
    use std::io::{self, Write};
    use std::path::PathBuf;
    use std::sync::Arc;

    struct Harness {
        shutdown: Sender<()>,
        ticks: Sender<Instant>,
        fs_events: Sender<FsEvent>,
    }

    fn dispatcher<S: Sink>(registry: Registry, sink: S) -> (Dispatcher<S>, Harness) {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::unbounded();
        let (tick_tx, tick_rx) = crossbeam_channel::unbounded();
        let (fs_tx, fs_rx) = crossbeam_channel::unbounded();
        let sources = EventSources::from_channels(shutdown_rx, tick_rx, fs_rx);
        let harness = Harness {
            shutdown: shutdown_tx,
            ticks: tick_tx,
            fs_events: fs_tx,
        };
        (Dispatcher::new(registry, sink, sources), harness)
    }

    fn log_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("current"), "").unwrap();
        dir
    }

    fn append(path: &Path, content: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn output(d: &Dispatcher<NetdataSink<Vec<u8>>>) -> String {
        String::from_utf8(d.sink().get_ref().clone()).unwrap()
    }

    fn set_lines(out: &str, chart: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut inside = false;
        for line in out.lines() {
            if line.starts_with("BEGIN ") {
                inside = line.starts_with(&format!("BEGIN {chart} "));
            } else if line == "END" {
                inside = false;
            } else if inside {
                lines.push(line.to_string());
            }
        }
        lines
    }

    fn smtp_registry(root: &Path) -> (Registry, PathBuf, PathBuf) {
        let a = log_dir(root, "smtpd-a");
        let b = log_dir(root, "smtpd-b");
        let mut registry = Registry::new();
        registry.add_watch(
            Watch::tailed(a.clone(), "current", Arc::new(SmtpCollector), 512).unwrap(),
        );
        registry.add_watch(
            Watch::tailed(b.clone(), "current", Arc::new(SmtpCollector), 512).unwrap(),
        );
        registry.add_aggregator(
            Aggregator::new(
                SourceKind::TailedFile,
                RateLimitAggregator::NAME,
                Arc::new(RateLimitAggregator),
            )
            .unwrap(),
        );
        (registry, a, b)
    }

    #[test]
    fn test_interval_aggregates_across_watches() {
        let root = tempfile::tempdir().unwrap();
        let (registry, a, b) = smtp_registry(root.path());
        let (mut d, _h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));

        append(
            &a.join("current"),
            &"ratelimitspp: 1.2.3.4;x@y;Result:NOK\n".repeat(3),
        );
        append(
            &b.join("current"),
            &"ratelimitspp: 1.2.3.4;x@y;Result:NOK\n".repeat(5),
        );
        d.emit_headers().unwrap();
        d.run_interval().unwrap();

        let out = output(&d);
        assert!(set_lines(&out, "qmail.smtp_smtpd_a").contains(&"SET ratelimited = 3".into()));
        assert!(set_lines(&out, "qmail.smtp_smtpd_b").contains(&"SET ratelimited = 5".into()));
        assert_eq!(
            set_lines(&out, "qmail.ratelimitspp_table_updates"),
            vec!["SET conn_timeout = 0", "SET error = 0", "SET ratelimited = 8"]
        );
    }

    #[test]
    fn test_interval_emission_order_and_reset() {
        let root = tempfile::tempdir().unwrap();
        let (registry, a, _b) = smtp_registry(root.path());
        let (mut d, _h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));

        append(&a.join("current"), "ratelimitspp: x;Result:NOK\n");
        d.run_interval().unwrap();
        d.run_interval().unwrap();

        let out = output(&d);
        let begins: Vec<_> = out.lines().filter(|l| l.starts_with("BEGIN ")).collect();
        assert_eq!(begins.len(), 6);
        assert!(begins[0].starts_with("BEGIN qmail.smtp_smtpd_a "));
        assert!(begins[1].starts_with("BEGIN qmail.smtp_smtpd_b "));
        assert!(begins[2].starts_with("BEGIN qmail.ratelimitspp_table_updates "));

        // Second interval starts from zero.
        let agg = d.registry().aggregators()[0].stats().clone();
        assert_eq!(agg.get("ratelimited"), Some(0));
        assert_eq!(d.registry().watches()[0].stats().get("ratelimited"), Some(0));
        assert!(out.contains("SET ratelimited = 1\n"));
    }

    #[test]
    fn test_step_runs_interval_on_tick() {
        let root = tempfile::tempdir().unwrap();
        let (registry, a, _b) = smtp_registry(root.path());
        let (mut d, h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));
        append(&a.join("current"), "tcpserver: ok 1 a:b:25 :c::1\n");

        h.ticks.send(Instant::now()).unwrap();
        h.ticks.send(Instant::now()).unwrap();
        assert_eq!(d.step().unwrap(), Flow::Continue);

        let out = output(&d);
        // Both pending ticks collapse into one interval.
        assert_eq!(out.lines().filter(|l| l.starts_with("BEGIN ")).count(), 3);
        assert!(set_lines(&out, "qmail.smtp_smtpd_a").contains(&"SET accepted = 1".into()));
    }

    #[test]
    fn test_shutdown_takes_priority() {
        let root = tempfile::tempdir().unwrap();
        let (registry, _a, _b) = smtp_registry(root.path());
        let (mut d, h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));

        h.ticks.send(Instant::now()).unwrap();
        h.shutdown.send(()).unwrap();

        assert_eq!(d.step().unwrap(), Flow::Stop);
        assert!(output(&d).is_empty());
    }

    #[test]
    fn test_dropped_shutdown_sender_stops() {
        let root = tempfile::tempdir().unwrap();
        let (registry, _a, _b) = smtp_registry(root.path());
        let (mut d, h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));

        drop(h.shutdown);
        assert_eq!(d.step().unwrap(), Flow::Stop);
    }

    #[test]
    fn test_run_emits_headers_and_stops() {
        let root = tempfile::tempdir().unwrap();
        let (registry, _a, _b) = smtp_registry(root.path());
        let (d, h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));

        h.shutdown.send(()).unwrap();
        assert!(d.run().is_ok());
    }

    #[test]
    fn test_rotation_event_drains_and_reopens() {
        let root = tempfile::tempdir().unwrap();
        let dir = log_dir(root.path(), "qmail-send");
        let current = dir.join("current");
        let mut registry = Registry::new();
        registry.add_watch(
            Watch::tailed(dir.clone(), "current", Arc::new(SendCollector), 512).unwrap(),
        );
        let (mut d, h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));

        append(&current, "new msg 1\nnew msg 2\n");
        std::fs::rename(&current, dir.join("@400000006553f1a90b2c3d4e.s")).unwrap();
        std::fs::write(&current, "end msg 1\n").unwrap();

        // Unrelated events are ignored.
        h.fs_events
            .send(Ok(Event::new(EventKind::Create(CreateKind::File))
                .add_path(dir.join("lock"))))
            .unwrap();
        h.fs_events
            .send(Ok(Event::new(EventKind::Any).add_path(current.clone())))
            .unwrap();
        h.fs_events
            .send(Err(notify::Error::generic("queue overflow")))
            .unwrap();
        assert_eq!(d.step().unwrap(), Flow::Continue);
        assert_eq!(d.registry().watches()[0].stats().get("new_msg"), Some(0));

        h.fs_events
            .send(Ok(Event::new(EventKind::Create(CreateKind::File))
                .add_path(current.clone())))
            .unwrap();
        assert_eq!(d.step().unwrap(), Flow::Continue);

        let stats = d.registry().watches()[0].stats();
        assert_eq!(stats.get("new_msg"), Some(2));
        assert_eq!(stats.get("end_msg"), Some(0));

        h.ticks.send(Instant::now()).unwrap();
        d.step().unwrap();

        let out = output(&d);
        let values = set_lines(&out, "qmail.send_qmail_send");
        assert!(values.contains(&"SET new_msg = 2".into()));
        assert!(values.contains(&"SET end_msg = 1".into()));
    }

    #[test]
    fn test_closed_fs_channel_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let (registry, _a, _b) = smtp_registry(root.path());
        let (mut d, h) = dispatcher(registry, NetdataSink::new(Vec::new(), 1));

        drop(h.fs_events);
        assert!(matches!(d.step(), Err(Error::ChannelClosed)));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let (registry, _a, _b) = smtp_registry(root.path());
        let (mut d, h) = dispatcher(registry, NetdataSink::new(ClosedPipe, 1));

        h.ticks.send(Instant::now()).unwrap();
        assert!(matches!(d.step(), Err(Error::Sink(_))));
    }

    #[test]
    fn test_fs_notifier_subscribe() {
        let dir = tempfile::tempdir().unwrap();
        let mut notifier = FsNotifier::new().unwrap();

        notifier.subscribe(dir.path()).unwrap();
        let err = notifier
            .subscribe(Path::new("/nonexistent/qmail/send"))
            .unwrap_err();
        assert!(matches!(err, Error::Subscription { .. }));
    }

    #[test]
    fn test_fs_notifier_reports_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = std::fs::canonicalize(dir.path()).unwrap();
        let mut notifier = FsNotifier::new().unwrap();
        notifier.subscribe(&dir_path).unwrap();

        std::fs::write(dir_path.join("current"), "x\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while let Ok(event) = notifier.events.recv_deadline(deadline) {
            let event = event.unwrap();
            if matches!(event.kind, EventKind::Create(_))
                && event.paths.contains(&dir_path.join("current"))
            {
                seen = true;
                break;
            }
        }
        assert!(seen);
    }

    #[test]
    fn test_only_creations_and_errors_are_forwarded() {
        use notify::event::{AccessKind, AccessMode, DataChange, ModifyKind};

        let create = Event::new(EventKind::Create(CreateKind::File));
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)));
        let close = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)));

        assert!(is_forwarded(&Ok(create)));
        assert!(is_forwarded(&Err(notify::Error::generic("overflow"))));
        assert!(!is_forwarded(&Ok(modify)));
        assert!(!is_forwarded(&Ok(close)));
        assert!(!is_forwarded(&Ok(Event::new(EventKind::Any))));
    }

    #[test]
    fn test_fs_notifier_ignores_appends() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = std::fs::canonicalize(dir.path()).unwrap();
        let current = dir_path.join("current");
        std::fs::write(&current, "").unwrap();
        let mut notifier = FsNotifier::new().unwrap();
        notifier.subscribe(&dir_path).unwrap();

        for n in 0..50 {
            append(&current, &format!("new msg {n}\n"));
        }
        std::thread::sleep(Duration::from_millis(500));

        let unexpected: Vec<_> = notifier
            .events
            .try_iter()
            .filter_map(Result::ok)
            .filter(|e| !matches!(e.kind, EventKind::Create(_)))
            .collect();
        assert!(unexpected.is_empty(), "{unexpected:?}");
    }
}
