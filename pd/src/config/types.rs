//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_output_prefix() -> String {
    "proberd".to_string()
}

fn default_sysvars_interval_msec() -> u64 {
    10_000
}

fn default_probe_interval_msec() -> u64 {
    2_000
}

fn default_probe_timeout_msec() -> u64 {
    1_000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_stats_interval_msec() -> u64 {
    10_000
}

fn default_resolve_interval_sec() -> u64 {
    300
}

fn default_rtc_interval_sec() -> u64 {
    10
}

/// Fully resolved prober configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProberConfig {
    /// Probes, in declared order
    pub probes: Vec<ProbeDef>,

    /// Surfacers, in declared order (this is also fan-out order)
    pub surfacers: Vec<SurfacerDef>,

    /// Inbound listeners
    pub servers: Vec<ServerDef>,

    /// Target resolution options applied to every probe
    #[serde(rename = "global-targets-options")]
    pub global_targets_options: Option<GlobalTargetsOptions>,

    /// Raw record log destination; stdout when unset
    #[serde(rename = "output-file")]
    pub output_file: Option<PathBuf>,

    /// First token of every raw record line
    #[serde(rename = "output-prefix")]
    pub output_prefix: String,

    /// How often the sysvars exporter emits a record
    #[serde(rename = "sysvars-interval-msec")]
    pub sysvars_interval_msec: u64,

    /// Environment variable whose value is exported with sysvars
    #[serde(rename = "sysvars-env-var")]
    pub sysvars_env_var: Option<String>,

    /// Runtime-config reporter; disabled when unset
    #[serde(rename = "rtc-report-options")]
    pub rtc_report_options: Option<RtcReportOptions>,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            probes: Vec::new(),
            surfacers: Vec::new(),
            servers: Vec::new(),
            global_targets_options: None,
            output_file: None,
            output_prefix: default_output_prefix(),
            sysvars_interval_msec: default_sysvars_interval_msec(),
            sysvars_env_var: None,
            rtc_report_options: None,
        }
    }
}

impl ProberConfig {
    pub fn sysvars_interval(&self) -> Duration {
        Duration::from_millis(self.sysvars_interval_msec)
    }
}

/// One probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeDef {
    /// Unique probe name
    pub name: String,

    /// Registry tag selecting the implementation
    #[serde(rename = "type")]
    pub probe_type: String,

    /// Hosts to probe
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(rename = "interval-msec", default = "default_probe_interval_msec")]
    pub interval_msec: u64,

    #[serde(rename = "timeout-msec", default = "default_probe_timeout_msec")]
    pub timeout_msec: u64,

    /// Destination port, where the probe type uses one
    #[serde(default)]
    pub port: Option<u16>,

    /// Type-specific options, decoded by the implementation
    #[serde(default)]
    pub options: serde_yaml::Value,
}

impl ProbeDef {
    pub fn new(name: impl Into<String>, probe_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probe_type: probe_type.into(),
            targets: Vec::new(),
            interval_msec: default_probe_interval_msec(),
            timeout_msec: default_probe_timeout_msec(),
            port: None,
            options: serde_yaml::Value::Null,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_msec)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_msec)
    }
}

/// Backlog policy of a surfacer queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Overflow {
    /// Keep every record; a backlog past `queue-capacity` is only reported
    #[default]
    Buffer,
    /// Drop new records for this surfacer while its backlog is full
    Drop,
}

/// One surfacer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurfacerDef {
    /// Registry tag selecting the implementation
    #[serde(rename = "type")]
    pub surfacer_type: String,

    /// Display name; defaults to the type tag
    #[serde(default)]
    pub name: Option<String>,

    /// Backlog size at which this surfacer is reported as lagging, or at
    /// which new records are dropped under `overflow: drop`
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// What happens to records beyond `queue-capacity`
    #[serde(default)]
    pub overflow: Overflow,

    /// Type-specific options, decoded by the implementation
    #[serde(default)]
    pub options: serde_yaml::Value,
}

impl SurfacerDef {
    pub fn new(surfacer_type: impl Into<String>) -> Self {
        Self {
            surfacer_type: surfacer_type.into(),
            name: None,
            queue_capacity: default_queue_capacity(),
            overflow: Overflow::default(),
            options: serde_yaml::Value::Null,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.surfacer_type)
    }
}

/// One inbound listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerDef {
    /// `udp` or `tcp`
    #[serde(rename = "type")]
    pub server_type: String,

    #[serde(default = "default_bind_address")]
    pub address: String,

    pub port: u16,

    #[serde(rename = "stats-interval-msec", default = "default_stats_interval_msec")]
    pub stats_interval_msec: u64,
}

impl ServerDef {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_msec)
    }
}

/// Target resolution options shared by all probes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalTargetsOptions {
    /// Cached addresses are re-resolved after this many seconds
    #[serde(rename = "resolve-interval-sec")]
    pub resolve_interval_sec: u64,

    /// Prefer IPv6 addresses
    pub ipv6: bool,
}

impl Default for GlobalTargetsOptions {
    fn default() -> Self {
        Self {
            resolve_interval_sec: default_resolve_interval_sec(),
            ipv6: false,
        }
    }
}

impl GlobalTargetsOptions {
    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.resolve_interval_sec)
    }
}

/// Runtime-config reporter options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RtcReportOptions {
    /// Report document path
    pub path: PathBuf,

    #[serde(rename = "interval-sec", default = "default_rtc_interval_sec")]
    pub interval_sec: u64,

    /// Sysvars copied into the report
    #[serde(default)]
    pub variables: Vec<String>,
}

impl RtcReportOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_sec)
    }
}
