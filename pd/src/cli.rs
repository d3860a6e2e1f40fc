//! CLI definition

use clap::Parser;
use std::path::PathBuf;

/// proberd - probing and telemetry agent
#[derive(Debug, Parser)]
#[command(
    name = "proberd",
    about = "Runs configured probes and fans their metrics out to surfacers",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long = "config-file", help = "Path to config file")]
    pub config_file: Option<PathBuf>,

    /// Parse the config with placeholder sysvars and exit
    #[arg(long, help = "Dry run to test the config file")]
    pub configtest: bool,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,
}
