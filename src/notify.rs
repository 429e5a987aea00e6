//! User-facing reporting side channel
//!
//! Recoverable failures inside the store are handed to a [`Notifier`]
//! instead of being returned. The default sends them to `tracing`.

use std::cell::RefCell;

use tracing::{error, info};

pub trait Notifier {
    /// Report a successful operation.
    fn info(&self, title: &str, message: &str);

    /// Report a recoverable failure.
    fn error(&self, title: &str, message: &str);
}

/// Notifier that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, title: &str, message: &str) {
        info!(title = %title, "{}", message);
    }

    fn error(&self, title: &str, message: &str) {
        error!(title = %title, "{}", message);
    }
}

/// Severity of a recorded report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// A single report captured by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub level: Level,
    pub title: String,
    pub message: String,
}

/// Notifier that keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    reports: RefCell<Vec<Report>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.borrow().clone()
    }

    pub fn errors(&self) -> Vec<Report> {
        self.reports
            .borrow()
            .iter()
            .filter(|r| r.level == Level::Error)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.reports.borrow_mut().clear();
    }

    fn push(&self, level: Level, title: &str, message: &str) {
        self.reports.borrow_mut().push(Report {
            level,
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}

impl Notifier for MemoryNotifier {
    fn info(&self, title: &str, message: &str) {
        self.push(Level::Info, title, message);
    }

    fn error(&self, title: &str, message: &str) {
        self.push(Level::Error, title, message);
    }
}
