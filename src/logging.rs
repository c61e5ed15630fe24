//! Tracing setup and the prefixed sink for subprocess output.
//!
//! Library code only emits `tracing` events. Harnesses that want to see them
//! call [`init_logging`] (or install their own subscriber). Output captured
//! from `docker`, `sudo` and friends goes through [`log_with_prefix`] so every
//! line is tagged with the program it came from.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Target used for forwarded subprocess output, e.g. `RUST_LOG=e2e_docker::output=off`.
pub const OUTPUT_TARGET: &str = "e2e_docker::output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Trace,
}

impl Verbosity {
    /// `-v` count to verbosity: none is normal, one is verbose, more is trace.
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Trace,
        }
    }

    pub fn as_level_filter(&self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::ERROR,
            Verbosity::Normal => LevelFilter::INFO,
            Verbosity::Verbose => LevelFilter::DEBUG,
            Verbosity::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub verbosity: Verbosity,
    /// Also write every event at debug level or above to this file.
    pub log_file: Option<String>,
}

/// Keeps the file writer alive; pending lines are flushed on drop.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `config.verbosity` for the stderr layer.
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(config.verbosity.as_level_filter().into())
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let (file_layer, file_guard) = match config.log_file.as_deref() {
        Some(log_file) => {
            let path = Path::new(log_file);
            let dir = path.parent().unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("e2e-docker.log");

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(writer)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A harness may already have a global subscriber; keep theirs.
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    LogGuard {
        _file_guard: file_guard,
    }
}

/// Forward subprocess output line by line, each prefixed with `[prefix]`.
pub fn log_with_prefix(prefix: &str, output: &str) {
    for line in prefixed_lines(prefix, output) {
        tracing::info!(target: OUTPUT_TARGET, "{line}");
    }
}

fn prefixed_lines<'a>(prefix: &'a str, output: &'a str) -> impl Iterator<Item = String> + 'a {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(move |line| format!("[{prefix}] {line}"))
}
