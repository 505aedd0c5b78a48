//! Host log forwarding.
//!
//! The core logs through `tracing`; a [`LoggerSink`] lets the embedding host
//! mirror those events into its own console or log pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured log record handed to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Emitting module path.
    pub target: String,
    pub message: String,
    /// Event fields, ordered by key.
    pub fields: BTreeMap<String, String>,
    /// Name of the innermost active span.
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

/// Receives log records from the core.
///
/// Called inline from the logging layer, so implementations should not block.
/// Sensitive fields are already redacted when redaction is enabled.
pub trait LoggerSink: Send + Sync {
    fn log(&self, entry: LogEntry);

    /// Records below this level are filtered before reaching the sink.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Sink writing single-line records to stderr.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

impl ConsoleLogger {
    /// Formats an entry the way the console sink prints it.
    pub fn format_entry(entry: &LogEntry) -> String {
        let mut line = format!(
            "[{}] {:>5} {}: {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.level.as_str().to_uppercase(),
            entry.target,
            entry.message
        );
        for (key, value) in &entry.fields {
            line.push_str(&format!(" {}={}", key, value));
        }
        line
    }
}

impl LoggerSink for ConsoleLogger {
    fn log(&self, entry: LogEntry) {
        if entry.level >= self.min_level {
            eprintln!("{}", Self::format_entry(&entry));
        }
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new(LogLevel::Info, "core_bridge", "module ready")
            .with_field("state", "ready")
            .with_span("call");

        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.target, "core_bridge");
        assert_eq!(entry.fields.get("state"), Some(&"ready".to_string()));
        assert_eq!(entry.span.as_deref(), Some("call"));
    }

    #[test]
    fn test_console_format_orders_fields() {
        let entry = LogEntry::new(LogLevel::Warn, "core_upload", "slow read")
            .with_field("offset", "10")
            .with_field("channel", "__zcn_upload_reader_1");
        let line = ConsoleLogger::format_entry(&entry);

        assert!(line.contains(" WARN core_upload: slow read"));
        assert!(line.ends_with("channel=__zcn_upload_reader_1 offset=10"));
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Debug);
    }
}
