//! proberd - probing and telemetry agent
//!
//! A long-running agent that runs a configured set of probes and telemetry
//! producers, sequences everything they emit through one dispatcher, writes a
//! raw record log and fans each record out to reporting backends.
//!
//! # Modules
//!
//! - [`prober`] - builds components from configuration and runs them
//! - [`events`] - bounded event bus and the dispatcher
//! - [`metrics`] - the `EventRecord` data model
//! - [`probes`] - active checks (`tcp`, `http`)
//! - [`surfacers`] - reporting backends (`file`, `log`)
//! - [`servers`] - inbound listeners (`udp`, `tcp`)
//! - [`sysvars`] - system variables and their exporter
//! - [`rtc`] - runtime-config reporter
//! - [`config`] - configuration parsing and discovery
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod metrics;
pub mod prober;
pub mod probes;
pub mod rtc;
pub mod servers;
pub mod surfacers;
pub mod sysvars;
pub mod targets;

pub use config::{ConfigError, ProberConfig};
pub use error::ProberError;
pub use events::{Dispatcher, EventBus, EventSink, EventStream};
pub use logger::{FailureCounter, Logger, LoggerError};
pub use metrics::{EventRecord, MetricKind, MetricValue};
pub use prober::{Prober, ProberBuilder};
pub use probes::{Probe, ProbeContext, ProbeError, ProbeRegistry};
pub use rtc::{ReporterError, RtcReporter};
pub use servers::{ServerError, ServerListener};
pub use surfacers::{Surfacer, SurfacerError, SurfacerRegistry};
pub use sysvars::SysVars;
