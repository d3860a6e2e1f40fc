//! Top-level error type for prober initialization

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::logger::LoggerError;
use crate::probes::ProbeError;
use crate::rtc::ReporterError;
use crate::servers::ServerError;
use crate::surfacers::SurfacerError;

#[derive(Debug, Error)]
pub enum ProberError {
    #[error(transparent)]
    Logger(#[from] LoggerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create output file {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Surfacer(#[from] SurfacerError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Reporter(#[from] ReporterError),
}
