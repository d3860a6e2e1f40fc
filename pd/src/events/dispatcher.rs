//! Dispatcher - the single consumer of the event bus
//!
//! For every record, in the order it leaves the bus:
//! 1. stamp the next sequence id
//! 2. write `<prefix> <id> <record>` to the output sink
//! 3. hand the record to every surfacer queue (never waits on a surfacer)
//!
//! The id space is seeded once from the wall clock in nanoseconds and then
//! advances by exactly one per record. Ids are only unique within one run.

use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::logger::Logger;
use crate::metrics::EventRecord;
use crate::surfacers::SurfacerSet;

use super::bus::EventStream;

/// Destination of the raw record log
pub type OutputSink = Box<dyn Write + Send>;

/// Sequences records, writes the raw log and fans out to surfacers
pub struct Dispatcher {
    prefix: String,
    output: OutputSink,
    surfacers: SurfacerSet,
    logger: Logger,
    next_id: u64,
    id_exhausted: bool,
    write_failures: u64,
}

impl Dispatcher {
    /// Create a dispatcher whose first id is the current time in nanoseconds
    pub fn new(prefix: impl Into<String>, output: OutputSink, surfacers: SurfacerSet, logger: Logger) -> Self {
        Self {
            prefix: prefix.into(),
            output,
            surfacers,
            logger,
            next_id: clock_seed(),
            id_exhausted: false,
            write_failures: 0,
        }
    }

    /// Override the first sequence id
    ///
    /// Ids saturate at `u64::MAX` rather than wrap.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.next_id = seed;
        self
    }

    /// The id the next record will get
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of failed writes to the output sink so far
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Process one record
    pub fn dispatch(&mut self, record: EventRecord) {
        let id = self.next_id;
        match self.next_id.checked_add(1) {
            Some(next) => self.next_id = next,
            None if !self.id_exhausted => {
                self.id_exhausted = true;
                self.logger
                    .error(format!("sequence id space exhausted at {}, ids will repeat", id));
            }
            None => {}
        }

        let record = Arc::new(record);
        let line = format!("{} {} {}\n", self.prefix, id, record);
        if let Err(e) = self
            .output
            .write_all(line.as_bytes())
            .and_then(|_| self.output.flush())
        {
            self.write_failures += 1;
            self.logger
                .error(format!("failed to write record {} to output: {}", id, e));
        }

        self.surfacers.emit(record);
    }

    /// Drain `stream` until the lifetime is cancelled or every producer is gone
    ///
    /// In production neither happens, so this runs for the life of the process.
    pub async fn run(mut self, mut stream: EventStream, lifetime: CancellationToken) {
        debug!(first_id = self.next_id, surfacers = self.surfacers.len(), "Dispatcher::run: starting");
        loop {
            tokio::select! {
                _ = lifetime.cancelled() => {
                    debug!("Dispatcher::run: lifetime cancelled");
                    break;
                }
                next = stream.recv() => match next {
                    Some(record) => self.dispatch(record),
                    None => {
                        debug!("Dispatcher::run: all producers gone");
                        break;
                    }
                },
            }
        }
        let _ = self.output.flush();
        self.surfacers.shutdown().await;
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX / 2))
        .unwrap_or(0)
}
