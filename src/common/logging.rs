//! Logging and tracing configuration
//!
//! Scenario code reports through a [`LogSink`], the logging collaborator that
//! accepts `(message, category, priority)` entries. The sink decides where
//! entries end up; [`TracingSink`] forwards them to `tracing`, and
//! [`MemorySink`] keeps them for inspection.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("webscenario=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Kind of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Info,
    Warn,
    Exception,
}

/// How urgently a log entry should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPriority {
    Low,
    High,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Exception => write!(f, "exception"),
        }
    }
}

/// One message sent to the logging collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub category: LogCategory,
    pub priority: LogPriority,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, category: LogCategory, priority: LogPriority) -> Self {
        Self {
            message: message.into(),
            category,
            priority,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, LogCategory::Info, LogPriority::Low)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(message, LogCategory::Warn, LogPriority::Low)
    }

    /// Exception entries are always high priority
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(message, LogCategory::Exception, LogPriority::High)
    }
}

/// Receiver of scenario log entries
pub trait LogSink: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// Forwards entries to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, entry: &LogEntry) {
        let high = entry.priority == LogPriority::High;
        match entry.category {
            LogCategory::Exception => tracing::error!(high, "{}", entry.message),
            LogCategory::Warn => tracing::warn!(high, "{}", entry.message),
            LogCategory::Info => tracing::info!(high, "{}", entry.message),
        }
    }
}

/// Keeps every entry in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all entries logged so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries with the given priority
    pub fn with_priority(&self, priority: LogPriority) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.priority == priority)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().push(entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_filters_by_priority() {
        let sink = MemorySink::new();
        sink.log(&LogEntry::info("loaded"));
        sink.log(&LogEntry::exception("driver crashed"));
        sink.log(&LogEntry::warn("duplicate variable"));

        assert_eq!(sink.entries().len(), 3);
        let high = sink.with_priority(LogPriority::High);
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].category, LogCategory::Exception);
    }
}
