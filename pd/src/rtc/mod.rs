//! Runtime-config reporter
//!
//! Periodically publishes a small JSON document with selected sysvars so that
//! external tooling can discover how this prober was configured:
//!
//! ```json
//! { "updated": "2026-01-01T00:00:00Z", "variables": { "hostname": "box-01" } }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RtcReportOptions;
use crate::logger::Logger;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("rtc-report-options: path must not be empty")]
    EmptyPath,

    #[error("rtc-report-options: unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Failed to write report {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    updated: String,
    variables: &'a BTreeMap<String, String>,
}

pub struct RtcReporter {
    path: PathBuf,
    interval: Duration,
    variables: BTreeMap<String, String>,
    logger: Logger,
}

impl RtcReporter {
    /// Every requested variable must exist in `vars`
    pub fn new(opts: &RtcReportOptions, vars: &HashMap<String, String>, logger: Logger) -> Result<Self, ReporterError> {
        if opts.path.as_os_str().is_empty() {
            return Err(ReporterError::EmptyPath);
        }
        let variables = opts
            .variables
            .iter()
            .map(|name| {
                vars.get(name)
                    .map(|value| (name.clone(), value.clone()))
                    .ok_or_else(|| ReporterError::UnknownVariable(name.clone()))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        debug!(path = %opts.path.display(), count = variables.len(), "RtcReporter::new: created");
        Ok(Self {
            path: opts.path.clone(),
            interval: opts.interval(),
            variables,
            logger,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the report once, replacing any previous one
    pub async fn write_report(&self) -> Result<(), ReporterError> {
        let report = Report {
            updated: Utc::now().to_rfc3339(),
            variables: &self.variables,
        };
        let json = serde_json::to_vec_pretty(&report)?;

        let write_err = |source: std::io::Error| ReporterError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }

    /// Publish every interval until `lifetime` is cancelled
    pub async fn run(&self, lifetime: CancellationToken) {
        self.logger.info(format!("reporting to {} every {:?}", self.path.display(), self.interval));
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = lifetime.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.write_report().await {
                self.logger.error(e);
            }
        }
        debug!("RtcReporter::run: stopped");
    }
}
