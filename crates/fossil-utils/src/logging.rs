//! # Logging Utilities
//!
//! Logging setup for Fossil binaries using `tracing`.
//!
//! Events go to stderr so that command output on stdout stays clean, and
//! optionally to a daily-rolling log file as well.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fossil_utils::init_logging;
//!
//! // Reads RUST_LOG, FOSSIL_LOG_FORMAT and FOSSIL_LOG_FILE
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `debug`, `fossil_core=trace`)
//! - `FOSSIL_LOG_FORMAT`: `pretty` (default) or `json`
//! - `FOSSIL_LOG_FILE`: also write to this file, rolled daily
//!
//! An explicit level (the CLI's `--log-level`) replaces `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt, io};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const FORMAT_VAR: &str = "FOSSIL_LOG_FORMAT";
const FILE_VAR: &str = "FOSSIL_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable, coloured on the console
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Most verbose; includes per-read memory detail
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", Level::from(*self))
    }
}

/// Keeps the file writer alive
///
/// Buffered file output is flushed when the guard is dropped, so hold it
/// until the program exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

impl fmt::Debug for LoggingGuard
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("LoggingGuard")
            .field("file", &self._file.is_some())
            .finish()
    }
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// Returns an error if:
/// - a global subscriber is already installed
/// - `FOSSIL_LOG_FORMAT` is set to an unknown format
/// - `FOSSIL_LOG_FILE` cannot be opened
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var(FORMAT_VAR) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    init(format, None)
}

/// Initialize logging with an explicit level, ignoring `RUST_LOG`
///
/// ## Example
///
/// ```rust,no_run
/// use fossil_utils::{init_logging_with_level, LogFormat, LogLevel};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init(format, Some(level))
}

/// Filter directives: the explicit level if any, else `RUST_LOG`, else `info`.
fn filter_directives(explicit: Option<LogLevel>, rust_log: Option<&str>) -> String
{
    match (explicit, rust_log) {
        (Some(level), _) => level.to_string().to_lowercase(),
        (None, Some(directives)) if !directives.trim().is_empty() => directives.to_string(),
        (None, _) => "info".to_string(),
    }
}

fn build_filter(explicit: Option<LogLevel>) -> Result<EnvFilter, LoggingError>
{
    let rust_log = env::var("RUST_LOG").ok();
    let directives = filter_directives(explicit, rust_log.as_deref());
    EnvFilter::try_new(&directives).map_err(|err| LoggingError::InvalidLevel(format!("{directives}: {err}")))
}

fn console_layer(format: LogFormat) -> BoxedLayer
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);
    match format {
        LogFormat::Pretty => layer.with_ansi(true).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

fn file_layer(format: LogFormat, path: &Path) -> Result<(BoxedLayer, WorkerGuard), LoggingError>
{
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let Some(file_name) = path.file_name() else {
        return Err(LoggingError::FileError(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )));
    };
    std::fs::create_dir_all(directory)?;

    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false);
    let layer = match format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
    };
    Ok((layer, guard))
}

fn init(format: LogFormat, level: Option<LogLevel>) -> Result<LoggingGuard, LoggingError>
{
    let filter = build_filter(level)?;
    let mut layers = vec![console_layer(format)];
    let mut file_guard = None;
    if let Some(path) = env::var_os(FILE_VAR).map(PathBuf::from) {
        let (layer, guard) = file_layer(format, &path)?;
        layers.push(layer);
        file_guard = Some(guard);
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(LoggingGuard { _file: file_guard })
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("Info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        let err = LogLevel::from_str("loud").unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
        assert!(LogLevel::Trace > LogLevel::Info);
    }

    #[test]
    fn test_filter_directives_precedence()
    {
        assert_eq!(filter_directives(Some(LogLevel::Debug), Some("fossil_core=trace")), "debug");
        assert_eq!(filter_directives(None, Some("fossil_core=trace")), "fossil_core=trace");
        assert_eq!(filter_directives(None, Some("  ")), "info");
        assert_eq!(filter_directives(None, None), "info");
    }
}
