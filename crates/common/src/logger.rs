//! Structured logging with correlation support.
//!
//! Entries are leveled (`error` > `warn` > `info` > `debug` in priority),
//! stamped with the ambient correlation context, and emitted to two sinks:
//! - colorized console output in development,
//! - newline-delimited JSON appended to a size-rotated file when file
//!   logging is enabled.
//!
//! Sink failures never propagate: a request must not fail because its log
//! line could not be written. In production the logger writes nothing to
//! the console under any circumstances, including sink failures.

use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::context::{self, LogContext};
use crate::mode::RuntimeMode;

const DEFAULT_LOG_FILE: &str = "./logs/app.log";
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;
const DEFAULT_MAX_FILES: u32 = 5;
const MAX_QUERY_DISPLAY_CHARS: usize = 200;

/// Log severity. Lower ordinal means higher priority; an entry is emitted
/// when its level is at or above the configured threshold priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    /// Lowercase level name as it appears in log output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Case-insensitive parse; unknown names are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error details attached to a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedError {
    /// Error type name, e.g. `DatabaseError`
    pub name: String,
    /// Original error message
    pub message: String,
    /// Stack trace, captured in development only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Driver or vendor error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl LoggedError {
    /// Create an error record from a name and message
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            code: None,
        }
    }

    /// Wrap any std error, losing no message text. The logged name is the
    /// generic `Error`; use [`LoggedError::new`] when a sharper name exists.
    pub fn from_error(error: &(dyn std::error::Error + '_)) -> Self {
        Self::new("Error", error.to_string())
    }

    /// Attach a vendor error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a captured stack trace
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// One structured log entry, serialized as a single NDJSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// RFC 3339 timestamp with milliseconds
    pub timestamp: String,
    /// Entry severity
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// Correlation id from the active request context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Merged contextual fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Attached error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LoggedError>,
}

/// Logger configuration, normally read from the environment.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum severity that gets emitted
    pub level: LogLevel,
    /// Whether entries are also appended to the log file
    pub to_file: bool,
    /// Active log file location
    pub file_path: PathBuf,
    /// Rotation threshold in bytes.
    pub max_file_size: u64,
    /// Number of rotated backups kept (`app.log.1` … `app.log.N`).
    pub max_files: u32,
    /// Runtime mode, controls console formatting and stack capture
    pub mode: RuntimeMode,
}

impl LoggerConfig {
    /// Read configuration from `LOG_LEVEL`, `LOG_TO_FILE`, `LOG_FILE_PATH`,
    /// `LOG_MAX_FILE_SIZE` (megabytes) and `LOG_MAX_FILES`. File logging
    /// requires both `LOG_TO_FILE=true` and production mode.
    pub fn from_env() -> Self {
        Self::from_env_with_mode(RuntimeMode::from_env())
    }

    /// Same as [`LoggerConfig::from_env`] with an explicit mode
    pub fn from_env_with_mode(mode: RuntimeMode) -> Self {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|value| LogLevel::parse(&value))
            .unwrap_or(LogLevel::Info);
        let to_file = std::env::var("LOG_TO_FILE")
            .map(|value| value == "true")
            .unwrap_or(false)
            && mode.is_production();
        let file_path = std::env::var("LOG_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_FILE));
        let max_file_size = std::env::var("LOG_MAX_FILE_SIZE")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB)
            * 1024
            * 1024;
        let max_files = std::env::var("LOG_MAX_FILES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_FILES);

        Self {
            level,
            to_file,
            file_path,
            max_file_size,
            max_files,
            mode,
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            to_file: false,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
            max_file_size: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            max_files: DEFAULT_MAX_FILES,
            mode: RuntimeMode::Development,
        }
    }
}

/// Console destination, injectable so the zero-console production contract
/// is assertable in tests.
pub trait ConsoleSink: Send + Sync {
    /// Write one line to standard output
    fn stdout_line(&self, line: &str);
    /// Write one line to standard error
    fn stderr_line(&self, line: &str);
}

/// Real process streams.
#[derive(Debug, Default)]
pub struct StdStreams;

impl ConsoleSink for StdStreams {
    fn stdout_line(&self, line: &str) {
        println!("{line}");
    }

    fn stderr_line(&self, line: &str) {
        eprintln!("{line}");
    }
}

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const GREEN: &str = "\x1b[32m";
    pub const GRAY: &str = "\x1b[90m";
    pub const BG_RED: &str = "\x1b[41m";
    pub const BG_YELLOW: &str = "\x1b[43m";
    pub const WHITE: &str = "\x1b[37m";
}

/// Structured logger writing to the console (development) and/or a rotated
/// NDJSON file. Cheap to share behind an [`Arc`].
pub struct Logger {
    config: LoggerConfig,
    console: Arc<dyn ConsoleSink>,
    // Serializes the stat/rotate/append sequence across tasks.
    file_guard: Mutex<()>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Logger writing to the real process streams
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_console_sink(config, Arc::new(StdStreams))
    }

    /// Logger configured from the environment
    pub fn from_env() -> Self {
        Self::new(LoggerConfig::from_env())
    }

    /// Logger with a custom console destination.
    pub fn with_console_sink(config: LoggerConfig, console: Arc<dyn ConsoleSink>) -> Self {
        Self {
            config,
            console,
            file_guard: Mutex::new(()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level <= self.config.level
    }

    /// Emit one entry at `level`, attaching the ambient correlation context
    /// merged with `context` (per-call values win).
    pub async fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error: Option<LoggedError>,
        context: Option<LogContext>,
    ) {
        if !self.enabled(level) {
            return;
        }
        let entry = self.assemble(level, message.into(), error, context);
        self.write(entry).await;
    }

    /// Error-level entry, optionally with attached error details
    pub async fn error(
        &self,
        message: impl Into<String>,
        error: Option<LoggedError>,
        context: Option<LogContext>,
    ) {
        self.log(LogLevel::Error, message, error, context).await;
    }

    /// Warn-level entry
    pub async fn warn(&self, message: impl Into<String>, context: Option<LogContext>) {
        self.log(LogLevel::Warn, message, None, context).await;
    }

    /// Info-level entry
    pub async fn info(&self, message: impl Into<String>, context: Option<LogContext>) {
        self.log(LogLevel::Info, message, None, context).await;
    }

    /// Debug-level entry
    pub async fn debug(&self, message: impl Into<String>, context: Option<LogContext>) {
        self.log(LogLevel::Debug, message, None, context).await;
    }

    /// Incoming request line, at info.
    pub async fn log_request(&self, method: &str, url: &str, context: Option<LogContext>) {
        let ctx = context.unwrap_or_default().set("type", "request");
        self.info(format!("{method} {url}"), Some(ctx)).await;
    }

    /// Completed response line: error for 5xx, warn for 4xx, info otherwise.
    pub async fn log_response(
        &self,
        method: &str,
        url: &str,
        status: u16,
        duration_ms: u64,
        context: Option<LogContext>,
    ) {
        let level = if status >= 500 {
            LogLevel::Error
        } else if status >= 400 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        let ctx = context
            .unwrap_or_default()
            .set("type", "response")
            .set("status", status)
            .set("duration", duration_ms);
        let message = format!("{method} {url} {status} ({duration_ms}ms)");
        self.log(level, message, None, Some(ctx)).await;
    }

    /// Query timing line at debug. Queries longer than 200 characters are
    /// truncated for readability.
    pub async fn log_database_query(
        &self,
        query: &str,
        duration_ms: u64,
        row_count: Option<u64>,
        context: Option<LogContext>,
    ) {
        let display_query = if query.chars().count() > MAX_QUERY_DISPLAY_CHARS {
            let head: String = query.chars().take(MAX_QUERY_DISPLAY_CHARS).collect();
            format!("{head}...")
        } else {
            query.to_owned()
        };

        let mut ctx = context
            .unwrap_or_default()
            .set("type", "database")
            .set("query", display_query.clone())
            .set("duration", duration_ms);
        if let Some(rows) = row_count {
            ctx.insert("rowCount", rows);
        }

        self.debug(format!("DB Query ({duration_ms}ms): {display_query}"), Some(ctx))
            .await;
    }

    fn assemble(
        &self,
        level: LogLevel,
        message: String,
        error: Option<LoggedError>,
        extra: Option<LogContext>,
    ) -> LogEntry {
        let mut merged = context::current().unwrap_or_default();
        if let Some(extra) = extra {
            merged.merge(extra);
        }

        let error = error.map(|mut err| {
            if self.config.mode.is_production() {
                err.stack = None;
            } else if err.stack.is_none() {
                err.stack = Some(Backtrace::force_capture().to_string());
            }
            err
        });

        let context_value = if merged.fields().is_empty() {
            None
        } else {
            Some(Value::Object(
                merged
                    .fields()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ))
        };

        LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            message,
            correlation_id: merged.correlation_id().map(str::to_owned),
            context: context_value,
            error,
        }
    }

    async fn write(&self, entry: LogEntry) {
        if self.config.mode.is_development() {
            self.write_console(&entry);
        }

        if !self.config.to_file {
            return;
        }
        if let Err(err) = self.write_file(&entry).await {
            // Logging must never fail the request: report in development,
            // stay silent in production.
            if self.config.mode.is_development() {
                self.console
                    .stderr_line(&format!("Failed to write log to file: {err}"));
                if let Ok(json) = serde_json::to_string(&entry) {
                    self.console.stderr_line(&format!("Original log entry: {json}"));
                }
            }
        }
    }

    fn write_console(&self, entry: &LogEntry) {
        let formatted = format_console_output(entry);
        match entry.level {
            LogLevel::Error | LogLevel::Warn => self.console.stderr_line(&formatted),
            LogLevel::Info | LogLevel::Debug => self.console.stdout_line(&formatted),
        }
    }

    async fn write_file(&self, entry: &LogEntry) -> std::io::Result<()> {
        let _guard = self.file_guard.lock().await;

        self.ensure_log_directory().await?;
        if self.should_rotate().await {
            if let Err(err) = self.rotate().await {
                // Rotation failure keeps appending to the active file.
                if self.config.mode.is_development() {
                    self.console
                        .stderr_line(&format!("Failed to rotate log file: {err}"));
                }
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.file_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn ensure_log_directory(&self) -> std::io::Result<()> {
        if let Some(dir) = self.config.file_path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        Ok(())
    }

    async fn should_rotate(&self) -> bool {
        tokio::fs::metadata(&self.config.file_path)
            .await
            .map(|meta| meta.len() >= self.config.max_file_size)
            .unwrap_or(false)
    }

    /// Shift `app.log.N` to `app.log.N+1` (dropping the oldest) and move the
    /// non-empty active file to `app.log.1`.
    async fn rotate(&self) -> std::io::Result<()> {
        let path = &self.config.file_path;

        let oldest = numbered_path(path, self.config.max_files);
        if file_exists(&oldest).await {
            tokio::fs::remove_file(&oldest).await?;
        }

        for index in (1..self.config.max_files).rev() {
            let current = numbered_path(path, index);
            if file_exists(&current).await {
                tokio::fs::rename(&current, &numbered_path(path, index + 1)).await?;
            }
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => {
                tokio::fs::rename(path, &numbered_path(path, 1)).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn numbered_path(path: &Path, index: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

fn format_console_output(entry: &LogEntry) -> String {
    let (color, badge) = match entry.level {
        LogLevel::Error => (ansi::RED, Some(ansi::BG_RED)),
        LogLevel::Warn => (ansi::YELLOW, Some(ansi::BG_YELLOW)),
        LogLevel::Info => (ansi::BLUE, None),
        LogLevel::Debug => (ansi::GREEN, None),
    };

    let mut output = format!("{}[{}]{} ", ansi::GRAY, entry.timestamp, ansi::RESET);

    let level_name = entry.level.as_str().to_uppercase();
    match badge {
        Some(bg) => {
            output.push_str(&format!("{bg}{} {level_name} {} ", ansi::WHITE, ansi::RESET))
        }
        None => output.push_str(&format!("{color}{level_name}{} ", ansi::RESET)),
    }

    if let Some(id) = &entry.correlation_id {
        output.push_str(&format!("{}[{id}]{} ", ansi::GRAY, ansi::RESET));
    }

    output.push_str(&format!("{color}{}{}", entry.message, ansi::RESET));

    if let Some(Value::Object(fields)) = &entry.context {
        if !fields.is_empty() {
            let pretty = serde_json::to_string_pretty(fields).unwrap_or_default();
            output.push_str(&format!("\n{}Context:{} {pretty}", ansi::GRAY, ansi::RESET));
        }
    }

    if let Some(error) = &entry.error {
        output.push_str(&format!(
            "\n{color}Error: {}: {}{}",
            error.name,
            error.message,
            ansi::RESET
        ));
        if let Some(stack) = &error.stack {
            output.push_str(&format!("\n{}{stack}{}", ansi::GRAY, ansi::RESET));
        }
    }

    output
}
