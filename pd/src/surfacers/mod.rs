//! Surfacers: reporting backends fed by the dispatcher
//!
//! ```text
//! Dispatcher ──► SurfacerSet::emit ──┬──► [queue] ─► FileSurfacer (JSONL)
//!                                    ├──► [queue] ─► LogSurfacer (tracing)
//!                                    └──► [queue] ─► <registered type>
//! ```
//!
//! Concrete surfacers are built by [`SurfacerRegistry`] from the `type` tag of
//! each `surfacers:` entry in the configuration.

mod file;
mod log;
mod registry;
mod set;
mod traits;

pub use file::{FileSurfacer, read_records};
pub use log::LogSurfacer;
pub use registry::{SurfacerFactory, SurfacerRegistry};
pub use set::{SurfacerEntry, SurfacerSet};
pub use traits::{Surfacer, SurfacerError};
