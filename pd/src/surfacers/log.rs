//! Log surfacer - re-emits every record through tracing

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::logger::Logger;
use crate::metrics::EventRecord;

use super::{Surfacer, SurfacerError};

pub struct LogSurfacer {
    name: String,
    logger: Logger,
}

impl LogSurfacer {
    pub fn new(name: &str, logger: Logger) -> Self {
        Self {
            name: name.to_string(),
            logger,
        }
    }
}

#[async_trait]
impl Surfacer for LogSurfacer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, _lifetime: &CancellationToken, record: Arc<EventRecord>) -> Result<(), SurfacerError> {
        self.logger.info(format!("{} {}", record.kind().as_str(), record));
        Ok(())
    }
}
