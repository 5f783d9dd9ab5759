//! Observability: structured logging and operation metrics.
//!
//! Storage backends emit `tracing` spans and `metrics` counters on their
//! own; this module only installs the subscriber that renders them.

mod logging;

pub use logging::{LOG_ENV, LogFormat, LoggingConfig};

use crate::{Error, Result};
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// Events go to `config.file` when set (appended, no ANSI colours) and to
/// stderr otherwise.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if logging was already initialised,
/// the filter directive is invalid or the log file cannot be opened.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(logging_failed("install_logger", "logging already initialized"));
    }

    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        logging_failed("parse_log_filter", format!("'{}': {e}", config.filter))
    })?;

    let (writer, to_file) = match &config.file {
        Some(path) => (BoxMakeWriter::new(SharedLogFile::open(path)?), true),
        None => (BoxMakeWriter::new(io::stderr), false),
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty if to_file => subscriber
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().pretty().with_writer(writer))
            .try_init(),
    };
    installed.map_err(|e| logging_failed("install_logger", e))?;

    LOGGING_INIT
        .set(())
        .map_err(|()| logging_failed("install_logger", "logging already initialized"))
}

fn logging_failed(operation: &str, cause: impl Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: cause.to_string(),
    }
}

/// Append-only log file shared by every event writer.
#[derive(Clone)]
struct SharedLogFile(Arc<Mutex<File>>);

impl SharedLogFile {
    /// Opens `path` for appending, creating missing parent directories.
    fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| logging_failed("prepare_log_dir", format!("{}: {e}", dir.display())))?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|file| Self(Arc::new(Mutex::new(file))))
            .map_err(|e| logging_failed("append_log_file", format!("{}: {e}", path.display())))
    }

    // A panic mid-write leaves the file usable; keep logging.
    fn file(&self) -> MutexGuard<'_, File> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file().flush()
    }
}

impl<'a> fmt::MakeWriter<'a> for SharedLogFile {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
