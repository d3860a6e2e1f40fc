//! Event pipeline: bus and dispatcher
//!
//! # Architecture
//!
//! ```text
//!   probes   sysvars   servers      (producers, one task each)
//!     │         │         │
//!     └────► EventSink::send ────►  EventBus (bounded mpsc, capacity 1000)
//!                                        │
//!                                        ▼
//!                                   Dispatcher (single consumer)
//!                                    ├─► output sink: "<prefix> <id> <record>"
//!                                    └─► SurfacerSet::emit ─► per-surfacer queues
//! ```
//!
//! Producers wait when the bus is full; nothing is dropped between a producer
//! and the dispatcher.

mod bus;
mod dispatcher;

pub use bus::{BusClosed, DEFAULT_BUS_CAPACITY, EventBus, EventSink, EventStream};
pub use dispatcher::{Dispatcher, OutputSink};
