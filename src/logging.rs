//! Tracing setup.
//!
//! Two sinks:
//! - the run log, rotated daily, INFO and above, no colors;
//! - stderr, filtered by `RUST_LOG` or, when unset, by the verbosity flags.
//!   Command output stays off the console unless running verbose.

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use indicatif::ProgressBar;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Verbosity;
use crate::constants::MAX_LOG_FILES;

/// Default stderr filter for a verbosity level.
#[must_use]
pub fn stderr_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error,pkg_update::command_output=off",
        Verbosity::Normal => "warn,pkg_update::command_output=off",
        Verbosity::Verbose => "info",
    }
}

/// Stderr writer that hides the spinner, if one is attached, while a log
/// line is printed.
#[derive(Clone, Default)]
pub struct ConsoleWriter {
    spinner: Arc<OnceLock<ProgressBar>>,
}

impl ConsoleWriter {
    pub fn attach(&self, spinner: ProgressBar) {
        let _ = self.spinner.set(spinner);
    }
}

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.spinner.get() {
            Some(spinner) => spinner.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Keeps the log pipeline alive. Dropping it flushes the file log.
#[must_use]
pub struct LogHandle {
    pub console: ConsoleWriter,
    _file_guard: WorkerGuard,
}

/// Daily-rotated appender for `log_file`. Rotated files are named
/// `<file name>.YYYY-MM-DD` in the same directory.
pub fn file_appender(log_file: &Path) -> anyhow::Result<RollingFileAppender> {
    let file_name = log_file
        .file_name()
        .with_context(|| format!("Log file {} has no file name", log_file.display()))?;
    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name.to_string_lossy())
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))
}

/// Installs the global subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=pkg_update=debug pkg-update acme widgets
/// ```
pub fn init(log_file: &Path, verbosity: Verbosity) -> anyhow::Result<LogHandle> {
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender(log_file)?);
    let console = ConsoleWriter::default();

    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(stderr_directive(verbosity)));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(LevelFilter::INFO),
        )
        .with(
            fmt::layer()
                .with_writer(console.clone())
                .compact()
                .with_filter(stderr_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogHandle {
        console,
        _file_guard: file_guard,
    })
}
