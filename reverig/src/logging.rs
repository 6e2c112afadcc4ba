//! Tracing subscriber setup.
//!
//! Diagnostics always go to stderr. An optional log file receives the same
//! events without ANSI colors through a non-blocking writer; the returned
//! [`WorkerGuard`] must be held until exit so buffered lines get flushed.
//!
//! `RUST_LOG` overrides the configured level when set.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub use tracing_appender::non_blocking::WorkerGuard;

/// Default level for the crate's own targets.
pub const DEFAULT_LEVEL: &str = "info";

/// Errors while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("failed to open log file {}: {reason}", path.display())]
    FileOpen { path: PathBuf, reason: String },

    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level for `reverig*` targets.
    pub level: String,
    /// Optional log file; events are appended.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LogConfig {
    /// Override the level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Also write to `path`.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> Result<String, LoggingError> {
        let level: LevelFilter = self
            .level
            .trim()
            .parse()
            .map_err(|_| LoggingError::InvalidLevel(self.level.clone()))?;
        Ok(format!("reverig={}", level))
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let directive = config.directive()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let (file_layer, guard) = match config.file {
        Some(ref path) => {
            let appender = file_appender(path)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guard)
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LoggingError::FileOpen {
            path: path.to_path_buf(),
            reason: "path has no file name".to_string(),
        })?;

    fs::create_dir_all(&dir).map_err(|e| LoggingError::CreateDir {
        path: dir.clone(),
        source: e,
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(&dir)
        .map_err(|e| LoggingError::FileOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
