//! Prober - builds every component from configuration and runs them
//!
//! # Lifecycle
//!
//! ```text
//! ProberBuilder::init(text)          Prober::start(lifetime)
//!   1. sysvars logger                  EventBus::new
//!   2. SysVars::init                   spawn Dispatcher (+ surfacer workers)
//!   3. config::parse                   spawn sysvars exporter
//!   4. output sink                     spawn servers
//!   5. probes                          spawn rtc reporter
//!   6. surfacers, servers              spawn probes
//!   7. rtc reporter                    wait for lifetime
//! ```
//!
//! Initialization is all-or-nothing: the first error is returned and nothing
//! has been spawned. A successfully initialized prober is idle until
//! [`Prober::start`].

use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{self, ProberConfig};
use crate::error::ProberError;
use crate::events::{DEFAULT_BUS_CAPACITY, Dispatcher, EventBus, OutputSink};
use crate::logger::{FailureCounter, Logger};
use crate::probes::{Probe, ProbeRegistry};
use crate::rtc::RtcReporter;
use crate::servers::{self, ServerListener};
use crate::surfacers::{SurfacerEntry, SurfacerRegistry, SurfacerSet};
use crate::sysvars::SysVars;

/// Configures how a [`Prober`] is built
pub struct ProberBuilder {
    probe_registry: ProbeRegistry,
    surfacer_registry: SurfacerRegistry,
    sysvars_overrides: Option<HashMap<String, String>>,
    output: Option<OutputSink>,
    bus_capacity: usize,
}

impl ProberBuilder {
    pub fn new() -> Self {
        Self {
            probe_registry: ProbeRegistry::standard(),
            surfacer_registry: SurfacerRegistry::standard(),
            sysvars_overrides: None,
            output: None,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }

    /// Replace the probe type registry
    pub fn with_probe_registry(mut self, registry: ProbeRegistry) -> Self {
        self.probe_registry = registry;
        self
    }

    /// Replace the surfacer type registry
    pub fn with_surfacer_registry(mut self, registry: SurfacerRegistry) -> Self {
        self.surfacer_registry = registry;
        self
    }

    /// Use exactly these sysvars instead of collecting them from the host
    pub fn with_sysvars(mut self, vars: HashMap<String, String>) -> Self {
        self.sysvars_overrides = Some(vars);
        self
    }

    /// Write the raw record log here, ignoring `output-file`
    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Build a prober from configuration text
    pub fn init(self, config_text: &str) -> Result<Prober, ProberError> {
        let failures = FailureCounter::new();

        let sysvars_logger = Logger::new("sysvars", &failures)?;
        let sysvars = SysVars::init(sysvars_logger, self.sysvars_overrides);
        let vars = sysvars.vars();

        let config = config::parse(config_text, &vars)?;

        let output: OutputSink = match (self.output, &config.output_file) {
            (Some(output), _) => output,
            (None, Some(path)) => {
                let file = File::create(path).map_err(|source| ProberError::Output {
                    path: path.clone(),
                    source,
                })?;
                debug!(path = %path.display(), "ProberBuilder::init: writing records to file");
                Box::new(file)
            }
            (None, None) => Box::new(std::io::stdout()),
        };

        let probes = self.probe_registry.init(
            &config.probes,
            config.global_targets_options.as_ref(),
            vars.clone(),
            &failures,
        )?;

        let surfacers = self.surfacer_registry.build_all(&config.surfacers, &failures)?;
        let servers = servers::build_all(&config.servers, &failures)?;

        let rtc = match &config.rtc_report_options {
            Some(opts) => {
                let logger = Logger::new("rtc", &failures)?;
                Some(RtcReporter::new(opts, &vars, logger)?)
            }
            None => None,
        };

        let dispatcher_logger = Logger::new("dispatcher", &failures)?;

        info!(
            probes = probes.len(),
            surfacers = surfacers.len(),
            servers = servers.len(),
            rtc = rtc.is_some(),
            "ProberBuilder::init: prober initialized"
        );
        Ok(Prober {
            config,
            sysvars,
            probes,
            surfacers,
            servers,
            rtc,
            output,
            failures,
            dispatcher_logger,
            bus_capacity: self.bus_capacity,
        })
    }
}

impl Default for ProberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully built, idle prober
pub struct Prober {
    config: ProberConfig,
    sysvars: SysVars,
    probes: HashMap<String, Arc<dyn Probe>>,
    surfacers: Vec<SurfacerEntry>,
    servers: Vec<Arc<dyn ServerListener>>,
    rtc: Option<RtcReporter>,
    output: OutputSink,
    failures: FailureCounter,
    dispatcher_logger: Logger,
    bus_capacity: usize,
}

impl Prober {
    /// Build with the standard registries and host sysvars
    pub fn init_from_config(config_text: &str) -> Result<Self, ProberError> {
        ProberBuilder::new().init(config_text)
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    pub fn vars(&self) -> Arc<HashMap<String, String>> {
        self.sysvars.vars()
    }

    /// Probe names, sorted
    pub fn probe_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.probes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Surfacer names in fan-out order
    pub fn surfacer_names(&self) -> Vec<&str> {
        self.surfacers.iter().map(SurfacerEntry::name).collect()
    }

    pub fn has_rtc_reporter(&self) -> bool {
        self.rtc.is_some()
    }

    /// Shared failure counter of every component logger
    pub fn failures(&self) -> FailureCounter {
        self.failures.clone()
    }

    /// Start every component and run until `lifetime` is cancelled
    ///
    /// Returns once every spawned task has finished.
    pub async fn start(self, lifetime: CancellationToken) {
        let Prober {
            config,
            sysvars,
            probes,
            surfacers,
            servers: listeners,
            rtc,
            output,
            failures: _,
            dispatcher_logger,
            bus_capacity,
        } = self;

        let (sink, stream) = EventBus::new(bus_capacity).split();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        let surfacers = SurfacerSet::spawn(surfacers, &lifetime);
        let dispatcher = Dispatcher::new(config.output_prefix.clone(), output, surfacers, dispatcher_logger);
        handles.push(tokio::spawn(dispatcher.run(stream, lifetime.clone())));

        {
            let lifetime = lifetime.clone();
            let sink = sink.clone();
            let interval = config.sysvars_interval();
            let env_var = config.sysvars_env_var.clone();
            handles.push(tokio::spawn(async move { sysvars.run(lifetime, sink, interval, env_var).await }));
        }

        handles.extend(servers::start(&lifetime, &listeners, &sink));

        if let Some(rtc) = rtc {
            let lifetime = lifetime.clone();
            handles.push(tokio::spawn(async move { rtc.run(lifetime).await }));
        }

        for (name, probe) in probes {
            debug!(probe = %name, "Prober::start: spawning probe");
            let lifetime = lifetime.clone();
            let sink = sink.clone();
            handles.push(tokio::spawn(async move { probe.run(lifetime, sink).await }));
        }
        drop(sink);

        info!(tasks = handles.len(), "Prober::start: running");
        lifetime.cancelled().await;
        info!("Prober::start: lifetime ended, waiting for tasks");

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Prober::start: task did not finish cleanly");
            }
        }
    }
}
