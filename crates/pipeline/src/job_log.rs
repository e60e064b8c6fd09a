//! Append-only status log for bulk jobs.
//!
//! Each job kind keeps the lines of its most recent run. Writers append
//! under a mutex; readers take a snapshot copy.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use trickplay_core::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    /// Display color for admin UIs.
    pub fn color(self) -> &'static str {
        match self {
            Self::Info => "#5abbdd",
            Self::Success => "#5eb955",
            Self::Error => "#f58080",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: Timestamp,
    pub severity: Severity,
    pub color: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct JobLog {
    lines: Mutex<Vec<LogLine>>,
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        let line = LogLine {
            timestamp: chrono::Utc::now(),
            severity,
            color: severity.color().to_string(),
            message: message.into(),
        };
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.append(Severity::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(Severity::Error, message);
    }

    /// Drop every line; called when a new run starts.
    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
