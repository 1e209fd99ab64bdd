//! Request log: a bounded in-memory ring of recent entries, appended to a JSONL
//! file and mirrored to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            request_id: None,
            message: message.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, ctx: serde_json::Value) -> Self {
        self.context = Some(ctx);
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

pub struct Logger {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    writer: BufWriter<File>,
}

impl Logger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::with_capacity(file_path, DEFAULT_CAPACITY)
    }

    /// Open (or create) the log file and reload its most recent `capacity` entries.
    pub fn with_capacity(file_path: impl AsRef<Path>, capacity: usize) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();
        let capacity = capacity.max(1);

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut entries = VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY));

        if file_path.exists() {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    if entries.len() >= capacity {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            entries,
            capacity,
            writer: BufWriter::new(file),
        })
    }

    pub fn log(&mut self, entry: LogEntry) {
        if let Ok(json) = serde_json::to_string(&entry) {
            let _ = writeln!(self.writer, "{json}");
            let _ = self.writer.flush();
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<Logger>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Logger::new(file_path)?))))
    }

    pub fn with_capacity(file_path: impl AsRef<Path>, capacity: usize) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Logger::with_capacity(
            file_path, capacity,
        )?))))
    }

    pub fn log(&self, entry: LogEntry) {
        mirror_to_tracing(&entry);
        if let Ok(mut logger) = self.0.lock() {
            logger.log(entry);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    pub fn warn(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, component, message));
    }

    pub fn error(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, component, message));
    }

    pub fn debug(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, component, message));
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }

    /// A handle that stamps every entry with a fresh request id.
    #[must_use]
    pub fn for_request(&self) -> RequestLogger {
        RequestLogger {
            logger: self.clone(),
            request_id: uuid::Uuid::new_v4().simple().to_string()[..12].to_string(),
        }
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    let request_id = entry.request_id.as_deref().unwrap_or("-");
    match entry.level {
        LogLevel::Debug => {
            tracing::debug!(component = %entry.component, request_id, "{}", entry.message);
        }
        LogLevel::Info => {
            tracing::info!(component = %entry.component, request_id, "{}", entry.message);
        }
        LogLevel::Warn => {
            tracing::warn!(component = %entry.component, request_id, "{}", entry.message);
        }
        LogLevel::Error => {
            tracing::error!(component = %entry.component, request_id, "{}", entry.message);
        }
    }
}

/// Logger bound to one client request.
#[derive(Clone)]
pub struct RequestLogger {
    logger: SharedLogger,
    request_id: String,
}

impl RequestLogger {
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn log(&self, level: LogLevel, component: &str, message: impl Into<String>) {
        self.logger
            .log(LogEntry::new(level, component, message).with_request_id(&self.request_id));
    }

    pub fn log_with_context(
        &self,
        level: LogLevel,
        component: &str,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.logger.log(
            LogEntry::new(level, component, message)
                .with_request_id(&self.request_id)
                .with_context(context),
        );
    }

    pub fn info(&self, component: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, component, message);
    }

    pub fn warn(&self, component: &str, message: impl Into<String>) {
        self.log(LogLevel::Warn, component, message);
    }

    pub fn error(&self, component: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, component, message);
    }

    pub fn debug(&self, component: &str, message: impl Into<String>) {
        self.log(LogLevel::Debug, component, message);
    }
}
