//! Fuzz-data logging. `TracingLogger` emits structured `tracing`
//! spans/events the way the rest of the ambient stack does;
//! `RecordingLogger` keeps an in-memory record for tests and for any
//! status surface that wants to replay recent history.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    CheckOk,
    CheckFail,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub case_index: u64,
    pub level: LogLevel,
    pub message: String,
}

pub trait FuzzDataLogger {
    fn open_test_case(&mut self, case_index: u64, name: &str);
    fn log_check(&mut self, case_index: u64, ok: bool, message: &str);
    fn log_send(&mut self, case_index: u64, data: &[u8]);
    fn log_recv(&mut self, case_index: u64, data: &[u8]);
    fn log_error(&mut self, case_index: u64, message: &str);
    fn close_test_case(&mut self, case_index: u64);

    /// Mapping from mutation index to accumulated failure synopses. A
    /// logger with no retained history (`TracingLogger`) returns an
    /// empty map; `RecordingLogger` answers from its own entry log.
    fn failure_synopses(&self) -> std::collections::BTreeMap<u64, String> {
        std::collections::BTreeMap::new()
    }
}

/// Emits a `tracing` span per test case and events within it, the way
/// `logannye-tinyzkp`'s request handlers log per-request spans.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl FuzzDataLogger for TracingLogger {
    fn open_test_case(&mut self, case_index: u64, name: &str) {
        tracing::info!(case_index, name, "opening test case");
    }

    fn log_check(&mut self, case_index: u64, ok: bool, message: &str) {
        if ok {
            tracing::debug!(case_index, message, "check passed");
        } else {
            tracing::warn!(case_index, message, "check failed");
        }
    }

    fn log_send(&mut self, case_index: u64, data: &[u8]) {
        tracing::trace!(case_index, bytes = data.len(), "sent data");
    }

    fn log_recv(&mut self, case_index: u64, data: &[u8]) {
        tracing::trace!(case_index, bytes = data.len(), "received data");
    }

    fn log_error(&mut self, case_index: u64, message: &str) {
        tracing::error!(case_index, message, "test case error");
    }

    fn close_test_case(&mut self, case_index: u64) {
        tracing::info!(case_index, "closing test case");
    }
}

/// In-memory logger for tests and for any status surface that wants
/// recent history without re-parsing log output.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().expect("logger mutex poisoned").clone()
    }

    fn push(&self, case_index: u64, level: LogLevel, message: impl Into<String>) {
        self.entries
            .lock()
            .expect("logger mutex poisoned")
            .push(LogEntry {
                case_index,
                level,
                message: message.into(),
            });
    }
}

impl FuzzDataLogger for RecordingLogger {
    fn open_test_case(&mut self, case_index: u64, name: &str) {
        self.push(case_index, LogLevel::Info, format!("open {name}"));
    }

    fn log_check(&mut self, case_index: u64, ok: bool, message: &str) {
        let level = if ok { LogLevel::CheckOk } else { LogLevel::CheckFail };
        self.push(case_index, level, message);
    }

    fn log_send(&mut self, case_index: u64, data: &[u8]) {
        self.push(case_index, LogLevel::Info, format!("send {} bytes", data.len()));
    }

    fn log_recv(&mut self, case_index: u64, data: &[u8]) {
        self.push(case_index, LogLevel::Info, format!("recv {} bytes", data.len()));
    }

    fn log_error(&mut self, case_index: u64, message: &str) {
        self.push(case_index, LogLevel::Error, message);
    }

    fn close_test_case(&mut self, case_index: u64) {
        self.push(case_index, LogLevel::Info, "close".to_string());
    }

    fn failure_synopses(&self) -> std::collections::BTreeMap<u64, String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == LogLevel::Error)
            .map(|e| (e.case_index, e.message))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_logger_captures_entries_in_order() {
        let mut logger = RecordingLogger::new();
        logger.open_test_case(1, "login");
        logger.log_check(1, false, "unexpected response code");
        logger.close_test_case(1);

        let entries = logger.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].level, LogLevel::CheckFail);
    }

    #[test]
    fn failure_synopses_indexes_error_entries_by_case() {
        let mut logger = RecordingLogger::new();
        logger.open_test_case(1, "login");
        logger.log_error(1, "connection reset");
        logger.open_test_case(2, "login");
        logger.close_test_case(2);

        let synopses = logger.failure_synopses();
        assert_eq!(synopses.get(&1), Some(&"connection reset".to_string()));
        assert!(!synopses.contains_key(&2));
    }

    #[test]
    fn tracing_logger_has_no_retained_history() {
        let logger = TracingLogger;
        assert!(logger.failure_synopses().is_empty());
    }
}
