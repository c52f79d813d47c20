// Zenith Agent Engine — Console Log Buffer
// Bounded FIFO buffer of structured log entries forwarded from the live
// preview surface. Multiple writers (the preview pump), snapshot readers.

use crate::atoms::constants::MAX_CONSOLE_LOGS;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// What the model reads from read_console_logs when nothing was captured.
pub const NO_LOGS_SENTINEL: &str = "No console logs found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Error,
    Warn,
    Info,
}

impl LogLevel {
    /// Uppercase tag used in the `[TYPE] message` formatting.
    pub fn tag(&self) -> &'static str {
        match self {
            LogLevel::Log => "LOG",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleLog {
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ConsoleLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        ConsoleLog {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only ring of console entries with oldest-first eviction once
/// capacity is exceeded. Append and eviction happen as one step under the
/// lock, so readers never observe an over-capacity buffer.
#[derive(Debug, Clone)]
pub struct ConsoleLogBuffer {
    inner: Arc<Mutex<VecDeque<ConsoleLog>>>,
    capacity: usize,
}

impl Default for ConsoleLogBuffer {
    fn default() -> Self {
        Self::new(MAX_CONSOLE_LOGS)
    }
}

impl ConsoleLogBuffer {
    pub fn new(capacity: usize) -> Self {
        ConsoleLogBuffer {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity,
        }
    }

    pub fn push(&self, log: ConsoleLog) {
        let mut logs = self.inner.lock();
        logs.push_back(log);
        while logs.len() > self.capacity {
            logs.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<ConsoleLog> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// `[TYPE] message` lines joined by newline; an empty buffer yields an
    /// explicit sentinel so the model never receives an empty string.
    pub fn format_for_model(&self) -> String {
        let logs = self.inner.lock();
        if logs.is_empty() {
            return NO_LOGS_SENTINEL.to_string();
        }
        logs.iter()
            .map(|l| format!("[{}] {}", l.level.tag(), l.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
