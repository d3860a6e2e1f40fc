//! Probes: active checks that produce records on their own schedule
//!
//! Each configured probe runs as its own task and writes to the shared
//! [`EventSink`](crate::events::EventSink). Built-in types:
//!
//! - `tcp`: connect latency to `target:port`
//! - `http`: GET `scheme://target[:port]/path`, success on 2xx

mod http;
mod registry;
mod runner;
mod tcp;
mod traits;

pub use registry::{ProbeFactory, ProbeRegistry};
pub use runner::{TargetCheck, TargetLoop, TargetStats};
pub use tcp::DEFAULT_TCP_PORT;
pub use traits::{Probe, ProbeContext, ProbeError};
