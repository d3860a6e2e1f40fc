//! Metric data model
//!
//! [`EventRecord`] is the unit of telemetry that every producer (probes, the
//! sysvars exporter, servers) hands to the event bus. Once a record is on the
//! bus it is shared read-only between the dispatcher and every surfacer.

mod record;

pub use record::{EventRecord, MetricKind, MetricValue};
