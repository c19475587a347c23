//! Injected collaborators of the monitor.
//!
//! This module provides traits for:
//! - `Clock`: Abstracting time access for deterministic testing
//! - `Reporter`: The presentation boundary (console line, tray tooltip)

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::MonitorError;
use crate::monitor::AttendanceReport;

// ==================== Clock Trait ====================

/// Trait for abstracting time access.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock().unwrap();
        *time += duration;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap()
    }
}

// ==================== Reporter Trait ====================

/// Receives the outcome of every attendance check.
///
/// Implementations are called from whichever task ran the check, possibly
/// several at once, so they must be cheap and thread-safe.
pub trait Reporter: Send + Sync {
    /// A check succeeded.
    fn report(&self, report: &AttendanceReport);

    /// A check failed; `error.reason()` gives the classified reason.
    fn report_error(&self, error: &MonitorError);
}

/// Reporter that records everything it is given, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<AttendanceReport>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<AttendanceReport> {
        self.reports.lock().unwrap().clone()
    }

    /// Classified reasons of every reported failure, in arrival order.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, report: &AttendanceReport) {
        self.reports.lock().unwrap().push(report.clone());
    }

    fn report_error(&self, error: &MonitorError) {
        self.errors.lock().unwrap().push(error.reason().to_string());
    }
}
