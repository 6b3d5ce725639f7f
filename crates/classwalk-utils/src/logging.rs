//! # Logging Utilities
//!
//! Logging infrastructure for classwalk using `tracing`.
//!
//! Rendered dumps and summary reports go to stdout, so every layer configured
//! here writes to stderr (or to a file). That keeps `classwalk dump > out.txt`
//! free of log noise.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use classwalk_utils::init_logging;
//!
//! // Initialize with default settings (reads from RUST_LOG env var)
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=classwalk_core=trace`)
//! - `CLASSWALK_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `CLASSWALK_LOG_LEVEL`: Default level when `RUST_LOG` is unset (default: `warn`)
//! - `CLASSWALK_LOG_FILE`: Optional log file (if not set, logs only to stderr).
//!   A path ending in a separator, or an existing directory, gets a
//!   date-stamped `classwalk-YYYY-MM-DD.log` inside it.

use std::path::{self, Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::{env, fs, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Keeps the file appender's worker alive for the life of the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    Pretty,
    /// JSON format, one event per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level (default for the CLI)
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level (logs every expanded node)
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
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: Log level filter (e.g., `debug`, `classwalk_core=trace`)
/// - `CLASSWALK_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
/// - `CLASSWALK_LOG_LEVEL`: Default level (`error` through `trace`)
/// - `CLASSWALK_LOG_FILE`: Optional log file or log directory
///
/// Faults and structural violations are logged at `warn`, so that is the
/// default level when neither `RUST_LOG` nor `CLASSWALK_LOG_LEVEL` is set.
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `CLASSWALK_LOG_FORMAT` holds an unknown format
/// - `CLASSWALK_LOG_LEVEL` holds an unknown level
/// - The log directory cannot be created
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = match env::var("CLASSWALK_LOG_FORMAT") {
        Ok(raw) => LogFormat::from_str(&raw).map_err(LoggingError::InvalidFormat)?,
        Err(_) => LogFormat::Pretty,
    };
    let default_level = default_level(env::var("CLASSWALK_LOG_LEVEL").ok().as_deref())?;

    init_logging_internal(format, default_level)
}

fn default_level(raw: Option<&str>) -> Result<Level, LoggingError>
{
    match raw {
        Some(raw) => raw.parse::<LogLevel>().map(Into::into).map_err(LoggingError::InvalidLevel),
        None => Ok(Level::WARN),
    }
}

/// Date-stamped log file inside `dir`, e.g. `classwalk-2026-10-16.log`
pub fn dated_log_file(dir: &Path) -> PathBuf
{
    let today = Utc::now().format("%Y-%m-%d");
    dir.join(format!("classwalk-{today}.log"))
}

/// Initialize logging with explicit level and format
///
/// ## Example
///
/// ```rust,no_run
/// use classwalk_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if logging is already initialized.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_internal(format, level.into())
}

fn init_logging_internal(format: LogFormat, default_level: Level) -> Result<(), LoggingError>
{
    // RUST_LOG can override the default level with more specific filters
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let log_file = env::var("CLASSWALK_LOG_FILE").ok().map(PathBuf::from);

    match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr)
                .with_filter(env_filter.clone());

            if let Some(file_path) = log_file {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(&file_path)?);
                let _ = FILE_GUARD.set(guard);
                let file_layer = fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false) // No ANSI in files
                    .with_filter(env_filter);

                Registry::default()
                    .with(console_layer)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
            } else {
                Registry::default()
                    .with(console_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
            }
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stderr)
                .with_filter(env_filter.clone());

            if let Some(file_path) = log_file {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(&file_path)?);
                let _ = FILE_GUARD.set(guard);
                let file_layer = fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(env_filter);

                Registry::default()
                    .with(console_layer)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
            } else {
                Registry::default()
                    .with(console_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
            }
        }
    }

    Ok(())
}

fn names_directory(file_path: &Path) -> bool
{
    file_path.is_dir() || file_path.as_os_str().to_string_lossy().ends_with(path::MAIN_SEPARATOR)
}

fn file_appender(file_path: &Path) -> Result<RollingFileAppender, LoggingError>
{
    if names_directory(file_path) {
        fs::create_dir_all(file_path)?;
        let log_file = dated_log_file(file_path);
        // The date is already in the file name
        return Ok(tracing_appender::rolling::never(
            file_path,
            log_file.file_name().unwrap_or_default(),
        ));
    }
    Ok(tracing_appender::rolling::daily(
        file_path.parent().unwrap_or_else(|| Path::new(".")),
        file_path.file_name().unwrap_or_default(),
    ))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging (usually: a subscriber is already installed)
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
