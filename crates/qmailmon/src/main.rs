//! qmailmon - qmail log collector for netdata.
//!
//! Tails the multilog files of qmail-send and qmail-smtpd, polls the queue
//! and writes per-interval charts to stdout in the netdata external plugin
//! protocol. Diagnostics go to stderr.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::Sender;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use qmailmon_core::collector::LineBuffer;
use qmailmon_core::config::{DEFAULT_FILE_NAME, DEFAULT_LOG_DIR, DEFAULT_QUEUE_DIR};
use qmailmon_core::sink::{NetdataSink, Sink};
use qmailmon_core::{Config, Dispatcher, Error, EventSources, FsNotifier, Registry};

/// qmail log collector for netdata.
#[derive(Parser, Debug)]
#[command(name = "qmailmon", about = "qmail log collector for netdata", version)]
struct Args {
    /// Update interval in seconds (netdata passes update_every here).
    #[arg(default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Directory holding one multilog directory per qmail service.
    #[arg(default_value = DEFAULT_LOG_DIR)]
    path: PathBuf,

    /// qmail queue directory to poll.
    #[arg(long, default_value = DEFAULT_QUEUE_DIR, env = "QMAILMON_QUEUE_DIR")]
    queue_dir: PathBuf,

    /// Do not poll the queue.
    #[arg(long)]
    no_queue: bool,

    /// Name of the live log file in each log directory.
    #[arg(long, default_value = DEFAULT_FILE_NAME)]
    file_name: String,

    /// Line reassembly buffer size in bytes. Longer lines are truncated.
    #[arg(long, default_value_t = LineBuffer::DEFAULT_CAPACITY, value_parser = parse_buffer_size)]
    buffer_size: usize,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            log_dir: self.path.clone(),
            interval: Duration::from_secs(self.interval),
            queue_dir: (!self.no_queue).then(|| self.queue_dir.clone()),
            file_name: self.file_name.clone(),
            buffer_capacity: self.buffer_size,
        }
    }
}

fn parse_buffer_size(s: &str) -> Result<usize, String> {
    let size = s
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid buffer size '{}': {}", s, e))?;
    if size < LineBuffer::MIN_CAPACITY {
        return Err(format!(
            "buffer size must be at least {} bytes",
            LineBuffer::MIN_CAPACITY
        ));
    }
    Ok(size)
}

/// Initializes the tracing subscriber on stderr; stdout carries the protocol.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["qmailmon", "qmailmon_core"] {
        match format!("{target}={level}").parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {target}: {e}"),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Routes SIGINT/SIGTERM into the event loop's shutdown channel.
fn install_signal_handler(shutdown: Sender<()>) {
    if let Err(e) = ctrlc::set_handler(move || {
        if shutdown.try_send(()).is_err() {
            debug!("shutdown already pending");
        }
    }) {
        warn!("Failed to set signal handler: {}", e);
    }
}

fn run(config: &Config) -> Result<(), Error> {
    let mut notifier = FsNotifier::new()?;

    let registry = match Registry::discover(config, &mut notifier) {
        Ok(registry) => registry,
        Err(e @ Error::NothingToMonitor(_)) => {
            let mut sink = NetdataSink::new(io::stdout(), config.update_every());
            sink.disable()?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    // Held for the whole run so a failed handler install does not read as a shutdown.
    let _shutdown_guard = shutdown_tx.clone();
    install_signal_handler(shutdown_tx);

    let sources = EventSources::new(shutdown_rx, config.interval, notifier);
    let sink = NetdataSink::new(BufWriter::new(io::stdout()), config.update_every());

    Dispatcher::new(registry, sink, sources).run()
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = args.config();
    info!("qmailmon {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, logs={}, queue={}, file={}, buffer={}B",
        config.update_every(),
        config.log_dir.display(),
        config
            .queue_dir
            .as_deref()
            .map_or_else(|| "disabled".to_string(), |q| q.display().to_string()),
        config.file_name,
        config.buffer_capacity
    );

    match run(&config) {
        Ok(()) => {
            info!("qmailmon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
