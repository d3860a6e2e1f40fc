//! System variables and the periodic sysvars exporter
//!
//! The variable map is built once at startup and is read-only afterwards. It
//! feeds config templating (`{{hostname}}`), probe construction and the
//! runtime-config reporter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::{self, Instant as TokioInstant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::EventSink;
use crate::logger::Logger;
use crate::metrics::{EventRecord, MetricKind};

/// Fixed variable map used by `--configtest`
pub const CONFIG_TEST_VARS: &[(&str, &str)] = &[
    ("zone", "us-central1-a"),
    ("project", "fake-domain.com:fake-project"),
    ("project_id", "12345678"),
    ("instance", "ig-us-central1-a-01-0000"),
    ("internal_ip", "192.168.0.10"),
    ("external_ip", "10.10.10.10"),
    ("instance_template", "ig-us-central1-a-01"),
];

/// Placeholder map for dry runs
pub fn config_test_vars() -> HashMap<String, String> {
    CONFIG_TEST_VARS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub struct SysVars {
    vars: Arc<HashMap<String, String>>,
    started: Instant,
    logger: Logger,
}

impl SysVars {
    /// Collect system variables
    ///
    /// With `overrides` the map is exactly the overrides and nothing is
    /// probed from the host.
    pub fn init(logger: Logger, overrides: Option<HashMap<String, String>>) -> Self {
        let vars = match overrides {
            Some(vars) => {
                logger.debug(format!("using {} override variables", vars.len()));
                vars
            }
            None => collect(&logger),
        };
        debug!(count = vars.len(), "SysVars::init: initialized");
        Self {
            vars: Arc::new(vars),
            started: Instant::now(),
            logger,
        }
    }

    pub fn vars(&self) -> Arc<HashMap<String, String>> {
        self.vars.clone()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn record(&self, env_var: Option<&str>) -> EventRecord {
        let uptime_msec = u64::try_from(self.uptime().as_millis()).unwrap_or(u64::MAX);
        let mut record = EventRecord::new(MetricKind::Cumulative)
            .with_label("ptype", "sysvars")
            .with_label("probe", "sysvars")
            .with_metric("uptime_msec", uptime_msec)
            .with_metric("hostname", self.get("hostname").unwrap_or_default())
            .with_metric("version", self.get("version").unwrap_or_default());

        if let Some(name) = env_var
            && let Ok(value) = std::env::var(name)
        {
            record = record.with_metric(name, value);
        }
        record
    }

    /// Emit a sysvars record every `interval` until `lifetime` is cancelled
    ///
    /// The first record goes out one full interval after start.
    pub async fn run(&self, lifetime: CancellationToken, sink: EventSink, interval: Duration, env_var: Option<String>) {
        self.logger.info(format!("exporting every {:?}", interval));
        let mut ticker = time::interval_at(TokioInstant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = lifetime.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if sink.send(self.record(env_var.as_deref())).await.is_err() {
                self.logger.warn("event bus closed, stopping exporter");
                return;
            }
        }
        debug!("SysVars::run: stopped");
    }
}

fn collect(logger: &Logger) -> HashMap<String, String> {
    let hostname = match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            logger.warn(format!("gethostname failed: {}", e));
            "unknown".to_string()
        }
    };

    HashMap::from([
        ("hostname".to_string(), hostname),
        ("pid".to_string(), std::process::id().to_string()),
        ("os".to_string(), std::env::consts::OS.to_string()),
        ("arch".to_string(), std::env::consts::ARCH.to_string()),
        ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ("start_time".to_string(), Utc::now().to_rfc3339()),
    ])
}
