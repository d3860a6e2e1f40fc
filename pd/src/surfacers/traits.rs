//! Surfacer trait definition

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::metrics::EventRecord;

/// Errors that can occur while building or writing to a surfacer
#[derive(Debug, Error)]
pub enum SurfacerError {
    #[error("Unknown surfacer type: {0}")]
    UnknownType(String),

    #[error("Invalid options for surfacer {name}: {reason}")]
    InvalidOptions { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Surfacer write failed: {0}")]
    Write(String),
}

/// A reporting backend fed with every record the dispatcher sees
///
/// Each surfacer is driven by its own worker task and queue, so a
/// slow `write` only delays this surfacer.
#[async_trait]
pub trait Surfacer: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Consume one record
    async fn write(&self, lifetime: &CancellationToken, record: Arc<EventRecord>) -> Result<(), SurfacerError>;
}
