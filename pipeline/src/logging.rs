//! Tracing subscriber setup: human-readable stdout plus an appended log file.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::{filter::ParseError, fmt, prelude::*, util::TryInitError, EnvFilter};

/// Name of the log file created inside the configured directory.
pub const LOG_FILE_NAME: &str = "logs.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid log level: {0}")]
    Filter(#[from] ParseError),

    #[error("logging already initialised: {0}")]
    Init(#[from] TryInitError),
}

/// Install the global subscriber.
///
/// `level` is used unless `RUST_LOG` is set. The directory is created when
/// missing. Returns the path of the log file.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created, or if a
/// global subscriber was already installed.
pub fn init(level: &str, dir: impl AsRef<Path>) -> Result<PathBuf, LoggingError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()?;

    Ok(path)
}
