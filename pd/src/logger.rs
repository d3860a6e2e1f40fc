//! Component loggers
//!
//! Every long-lived component gets its own named [`Logger`]. All loggers built
//! by one prober share a [`FailureCounter`] so the total number of internal
//! failures is visible from a single place.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Prefix for every component logger name
pub const LOG_NAME_PREFIX: &str = "proberd";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoggerError {
    #[error("logger component name is empty")]
    EmptyName,

    #[error("invalid logger component name '{0}': must not contain whitespace")]
    InvalidName(String),
}

/// Thread-safe failure count shared by a family of loggers
#[derive(Debug, Clone, Default)]
pub struct FailureCounter(Arc<AtomicU64>);

impl FailureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Named logger for a single component (probe, surfacer, exporter, ...)
#[derive(Debug, Clone)]
pub struct Logger {
    name: Arc<str>,
    failures: FailureCounter,
}

impl Logger {
    /// Create a logger named `proberd.<component>`
    pub fn new(component: &str, failures: &FailureCounter) -> Result<Self, LoggerError> {
        if component.is_empty() {
            return Err(LoggerError::EmptyName);
        }
        if component.chars().any(char::is_whitespace) {
            return Err(LoggerError::InvalidName(component.to_string()));
        }
        let name: Arc<str> = format!("{}.{}", LOG_NAME_PREFIX, component).into();
        debug!(logger = %name, "Logger::new: created component logger");
        Ok(Self {
            name,
            failures: failures.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self, msg: impl Display) {
        debug!(component = %self.name, "{}", msg);
    }

    pub fn info(&self, msg: impl Display) {
        info!(component = %self.name, "{}", msg);
    }

    pub fn warn(&self, msg: impl Display) {
        warn!(component = %self.name, "{}", msg);
    }

    /// Log at error level and count the failure
    pub fn error(&self, msg: impl Display) {
        let total = self.failures.increment();
        error!(component = %self.name, failures = total, "{}", msg);
    }

    /// Failures recorded across every logger sharing this counter
    pub fn failures(&self) -> u64 {
        self.failures.get()
    }
}
