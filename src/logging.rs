//! JSONL application log.
//!
//! Records append to a log file as one JSON object per line and a bounded
//! in-memory tail is kept for the diagnostics endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_TAIL_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub scope: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl LogRecord {
    pub fn new(level: LogLevel, scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            scope: scope.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

struct LogSink {
    tail: VecDeque<LogRecord>,
    writer: BufWriter<File>,
}

impl LogSink {
    fn open(file_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(file_path)?;

        Ok(Self {
            tail: VecDeque::with_capacity(MAX_TAIL_RECORDS),
            writer: BufWriter::new(file),
        })
    }

    fn write(&mut self, record: LogRecord) {
        if let Ok(json) = serde_json::to_string(&record) {
            let _ = writeln!(self.writer, "{json}");
            let _ = self.writer.flush();
        }
        if self.tail.len() >= MAX_TAIL_RECORDS {
            self.tail.pop_front();
        }
        self.tail.push_back(record);
    }
}

/// Cloneable handle shared across connection handlers.
#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<LogSink>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(LogSink::open(file_path.as_ref())?))))
    }

    pub fn log(&self, record: LogRecord) {
        if let Ok(mut sink) = self.0.lock() {
            sink.write(record);
        }
    }

    pub fn debug(&self, scope: impl Into<String>, message: impl Into<String>) {
        self.log(LogRecord::new(LogLevel::Debug, scope, message));
    }

    pub fn info(&self, scope: impl Into<String>, message: impl Into<String>) {
        self.log(LogRecord::new(LogLevel::Info, scope, message));
    }

    pub fn warn(&self, scope: impl Into<String>, message: impl Into<String>) {
        self.log(LogRecord::new(LogLevel::Warn, scope, message));
    }

    pub fn error(&self, scope: impl Into<String>, message: impl Into<String>) {
        self.log(LogRecord::new(LogLevel::Error, scope, message));
    }

    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        self.0
            .lock()
            .map(|sink| sink.tail.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
