//! Logging configuration and initialization
//!
//! Sets up a `tracing-subscriber` registry for the engine. Device lifecycle
//! (context open, buffer allocation, program compilation) is logged at
//! `debug`, every enqueue on an execution sequence at `trace`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g., "info", "neuroforge=trace")
//! - `NEUROFORGE_LOG_LEVEL`: Simple log level (error, warn, info, debug, trace)
//! - `NEUROFORGE_LOG_FORMAT`: Output format ("human" or "json")
//! - `NEUROFORGE_LOG_FILE`: Optional file path, always written as JSON

use once_cell::sync::OnceCell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "NEUROFORGE_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "NEUROFORGE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "NEUROFORGE_LOG_FILE";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("failed to create log directory: {0}")]
    DirectoryCreationFailed(String),

    #[error("failed to open log file: {0}")]
    FileOpenFailed(String),

    #[error("failed to install subscriber: {0}")]
    SubscriberInstall(String),
}

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    /// Convert to EnvFilter string
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(LoggingError::InvalidLogLevel(other.to_string())),
        }
    }
}

/// Log format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable colored output
    #[default]
    Human,
    /// JSON structured output
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" | "console" => Ok(LogFormat::Human),
            "json" | "structured" => Ok(LogFormat::Json),
            other => Err(LoggingError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include file/line in console output
    pub with_file_info: bool,
    /// Emit span close events (with busy/idle timings)
    pub with_span_events: bool,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self, with_file_info: bool) -> Self {
        self.with_file_info = with_file_info;
        self
    }

    pub fn with_span_events(mut self, with_span_events: bool) -> Self {
        self.with_span_events = with_span_events;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Build a configuration from the `NEUROFORGE_LOG_*` variables.
    ///
    /// Unparseable values fall back to the defaults rather than failing.
    pub fn from_env() -> Self {
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let mut config = LoggingConfig::new().with_level(level).with_format(format);
        if let Ok(file) = std::env::var(LOG_FILE_ENV) {
            if !file.trim().is_empty() {
                config = config.with_log_file(file);
            }
        }
        config
    }
}

/// Initialize logging from the environment, ignoring failures.
///
/// Idempotent: only the first call installs a subscriber.
///
/// ```ignore
/// neuroforge::logging::init_logging_default();
/// tracing::info!("training started");
/// ```
pub fn init_logging_default() {
    let _ = init_with_config(&LoggingConfig::from_env());
}

/// Initialize logging with a custom configuration.
///
/// Idempotent. Returns the error from the first (installing) call only;
/// later calls return `Ok(())`.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    let mut outcome = Ok(());
    TRACING_INITIALIZED.get_or_init(|| {
        outcome = install(config);
    });
    outcome
}

/// Check if tracing has been initialized
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}

fn install(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(config.level)?;
    let file = match &config.log_file {
        Some(path) => Some(open_log_file(path)?),
        None => None,
    };

    let console = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
            .with_span_events(span_events(config.with_span_events))
            .boxed(),
        LogFormat::Human => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
            .with_span_events(span_events(config.with_span_events))
            .boxed(),
    };

    let file_layer = file.map(|file| {
        fmt::layer()
            .json()
            .with_writer(std::sync::Mutex::new(file))
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_span_events(span_events(config.with_span_events))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInstall(e.to_string()))
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LoggingError::DirectoryCreationFailed(e.to_string()))?;
        }
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggingError::FileOpenFailed(format!("{}: {}", path.display(), e)))
}

/// RUST_LOG wins, then NEUROFORGE_LOG_LEVEL, then the configured level.
fn build_env_filter(default_level: LogLevel) -> Result<EnvFilter, LoggingError> {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(rust_log)
            .map_err(|e| LoggingError::InvalidLogLevel(e.to_string()));
    }

    if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
        if let Ok(level) = level.parse::<LogLevel>() {
            return Ok(EnvFilter::new(level.as_filter_str()));
        }
    }

    Ok(EnvFilter::new(default_level.as_filter_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_default_idempotent() {
        init_logging_default();
        init_logging_default();
        assert!(is_initialized());
        assert!(init_with_config(&LoggingConfig::new()).is_ok());
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("error".parse::<LogLevel>().ok(), Some(LogLevel::Error));
        assert_eq!("WARNING".parse::<LogLevel>().ok(), Some(LogLevel::Warn));
        assert_eq!(" info ".parse::<LogLevel>().ok(), Some(LogLevel::Info));
        assert_eq!("debug".parse::<LogLevel>().ok(), Some(LogLevel::Debug));
        assert_eq!("trace".parse::<LogLevel>().ok(), Some(LogLevel::Trace));
        assert!(matches!(
            "verbose".parse::<LogLevel>(),
            Err(LoggingError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().ok(), Some(LogFormat::Human));
        assert_eq!("json".parse::<LogFormat>().ok(), Some(LogFormat::Json));
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::new()
            .with_level(LogLevel::Trace)
            .with_format(LogFormat::Json)
            .with_file_info(true)
            .with_log_file("/tmp/neuroforge.log");

        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.with_file_info);
        assert!(!config.with_span_events);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/neuroforge.log")));
    }

    #[test]
    fn test_default_level_is_warn() {
        assert_eq!(LoggingConfig::new().level, LogLevel::Warn);
        assert_eq!(LogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_open_log_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs").join("engine.log");

        let file = open_log_file(&path);
        assert!(file.is_ok());
        assert!(path.exists());
    }
}
