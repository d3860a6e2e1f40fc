//! proberd - probing and telemetry agent
//!
//! CLI entry point: load the config, build the prober and run it until a
//! shutdown signal arrives.

use clap::Parser;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use proberd::cli::Cli;
use proberd::config::{self, read_config_text};
use proberd::prober::Prober;
use proberd::sysvars::config_test_vars;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    // stdout carries the record stream, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let text = read_config_text(cli.config_file.as_ref()).context("Failed to read configuration")?;

    if cli.configtest {
        debug!("main: configtest mode");
        config::parse(&text, &config_test_vars()).context("Error parsing config file")?;
        println!("Config OK");
        return Ok(());
    }

    let prober = Prober::init_from_config(&text).context("Error initializing prober")?;
    info!(probes = ?prober.probe_names(), surfacers = ?prober.surfacer_names(), "proberd starting");

    let lifetime = CancellationToken::new();
    let prober_task = tokio::spawn(prober.start(lifetime.clone()));

    wait_for_shutdown().await?;
    lifetime.cancel();
    prober_task.await.context("Prober task failed")?;

    info!("proberd stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Failed to wait for ctrl_c")?;
        warn!("ctrl_c received");
    }

    Ok(())
}
