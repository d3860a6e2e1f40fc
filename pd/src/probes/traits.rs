//! Probe trait definition

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::GlobalTargetsOptions;
use crate::events::EventSink;
use crate::logger::{Logger, LoggerError};

/// Errors that can occur while building probes
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Unknown probe type '{probe_type}' for probe {name}")]
    UnknownType { name: String, probe_type: String },

    #[error("Duplicate probe name: {0}")]
    DuplicateName(String),

    #[error("Probe {0} has no targets")]
    NoTargets(String),

    #[error("Invalid options for probe {name}: {reason}")]
    InvalidOptions { name: String, reason: String },

    #[error("Failed to build client for probe {name}: {reason}")]
    Client { name: String, reason: String },

    #[error("Logger error: {0}")]
    Logger(#[from] LoggerError),
}

/// Everything a probe constructor gets besides its own definition
#[derive(Clone)]
pub struct ProbeContext {
    /// Global target resolution options, if configured
    pub targets_options: Option<GlobalTargetsOptions>,
    /// Sysvars map, read-only
    pub vars: Arc<HashMap<String, String>>,
    /// Logger named after the probe
    pub logger: Logger,
}

/// An active prober that emits records at its own cadence
#[async_trait]
pub trait Probe: Send + Sync {
    /// Unique probe name
    fn name(&self) -> &str;

    /// Run until `lifetime` is cancelled, emitting records onto `sink`
    ///
    /// Implementations must not close or otherwise invalidate the sink.
    async fn run(&self, lifetime: CancellationToken, sink: EventSink);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_name_message() {
        let err = ProbeError::DuplicateName("web".to_string());
        assert_eq!(err.to_string(), "Duplicate probe name: web");
    }

    #[test]
    fn test_unknown_type_message() {
        let err = ProbeError::UnknownType {
            name: "p1".to_string(),
            probe_type: "icmp".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("icmp"));
        assert!(msg.contains("p1"));
    }
}
