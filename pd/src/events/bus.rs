//! Event Bus - bounded multi-producer, single-consumer record queue
//!
//! Every producer holds a cloned [`EventSink`]. The dispatcher owns the one
//! [`EventStream`]. A full bus suspends senders instead of dropping records.

use tokio::sync::mpsc;
use tracing::debug;

use crate::metrics::EventRecord;

/// Default number of pending records the bus holds before senders wait
pub const DEFAULT_BUS_CAPACITY: usize = 1000;

/// Returned by [`EventSink::send`] once the consuming side is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event bus closed")]
pub struct BusClosed;

/// Bounded conduit from many producers to the dispatcher
pub struct EventBus {
    tx: mpsc::Sender<EventRecord>,
    rx: mpsc::Receiver<EventRecord>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus holding at most `capacity` pending records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, rx, capacity }
    }

    /// Create a bus with [`DEFAULT_BUS_CAPACITY`]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a sending handle for a producer
    pub fn sink(&self) -> EventSink {
        EventSink { tx: self.tx.clone() }
    }

    /// Split into a producer handle and the single consuming stream
    pub fn split(self) -> (EventSink, EventStream) {
        (EventSink { tx: self.tx }, EventStream { rx: self.rx })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Producer handle; cheap to clone
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::Sender<EventRecord>,
}

impl EventSink {
    /// Hand a record to the bus, waiting while the bus is full
    pub async fn send(&self, record: EventRecord) -> Result<(), BusClosed> {
        self.tx.send(record).await.map_err(|_| BusClosed)
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The consuming end, owned by the dispatcher
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<EventRecord>,
}

impl EventStream {
    /// Wait for the next record; `None` once every sink is dropped
    pub async fn recv(&mut self) -> Option<EventRecord> {
        self.rx.recv().await
    }
}
