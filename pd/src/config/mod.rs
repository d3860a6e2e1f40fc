//! Prober configuration: parsing, templating and discovery
//!
//! Configuration text is a Handlebars template rendered against the sysvars
//! map (`{{hostname}}`, `{{version}}`, ...) and then parsed as YAML. Rendering
//! runs in strict mode, so a reference to an unknown variable is an error.

mod types;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use types::{GlobalTargetsOptions, Overflow, ProbeDef, ProberConfig, RtcReportOptions, ServerDef, SurfacerDef};

/// Config file searched last when nothing else is found
pub const DEFAULT_CONFIG_FILE: &str = "/etc/proberd.yml";

/// Errors raised while reading, rendering or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config template error: {0}")]
    Template(String),

    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Render `text` against `vars`, parse it and validate the result
pub fn parse(text: &str, vars: &HashMap<String, String>) -> Result<ProberConfig, ConfigError> {
    debug!(len = text.len(), vars = vars.len(), "config::parse: called");
    let rendered = render(text, vars)?;

    let config = if rendered.trim().is_empty() {
        debug!("config::parse: empty config, using defaults");
        ProberConfig::default()
    } else {
        serde_yaml::from_str::<ProberConfig>(&rendered)?
    };

    validate(&config)?;
    debug!(
        probes = config.probes.len(),
        surfacers = config.surfacers.len(),
        servers = config.servers.len(),
        "config::parse: config accepted"
    );
    Ok(config)
}

fn render(text: &str, vars: &HashMap<String, String>) -> Result<String, ConfigError> {
    let mut hbs = Handlebars::new();
    hbs.set_strict_mode(true);
    hbs.register_escape_fn(handlebars::no_escape);
    hbs.render_template(text, vars)
        .map_err(|e| ConfigError::Template(e.to_string()))
}

fn validate(config: &ProberConfig) -> Result<(), ConfigError> {
    if config.output_prefix.contains('\n') {
        return Err(ConfigError::Invalid("output-prefix must be a single line".to_string()));
    }
    if config.sysvars_interval_msec == 0 {
        return Err(ConfigError::Invalid("sysvars-interval-msec must be > 0".to_string()));
    }

    for probe in &config.probes {
        if probe.name.trim().is_empty() {
            return Err(ConfigError::Invalid("probe name must not be empty".to_string()));
        }
        if probe.name.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "probe name '{}' must not contain whitespace",
                probe.name
            )));
        }
        if probe.interval_msec == 0 {
            return Err(ConfigError::Invalid(format!("probe {}: interval-msec must be > 0", probe.name)));
        }
        if probe.timeout_msec == 0 || probe.timeout_msec > probe.interval_msec {
            return Err(ConfigError::Invalid(format!(
                "probe {}: timeout-msec must be in 1..=interval-msec ({})",
                probe.name, probe.interval_msec
            )));
        }
    }

    for surfacer in &config.surfacers {
        if surfacer.queue_capacity == 0 {
            return Err(ConfigError::Invalid(format!(
                "surfacer {}: queue-capacity must be > 0",
                surfacer.name()
            )));
        }
    }

    for server in &config.servers {
        if server.server_type != "udp" && server.server_type != "tcp" {
            return Err(ConfigError::Invalid(format!(
                "server type '{}' must be udp or tcp",
                server.server_type
            )));
        }
        if server.stats_interval_msec == 0 {
            return Err(ConfigError::Invalid(format!(
                "server {}:{}: stats-interval-msec must be > 0",
                server.server_type, server.port
            )));
        }
    }

    if let Some(rtc) = &config.rtc_report_options
        && rtc.interval_sec == 0
    {
        return Err(ConfigError::Invalid("rtc-report-options: interval-sec must be > 0".to_string()));
    }

    Ok(())
}

/// Read configuration text using the fallback chain:
/// explicit path, `./proberd.yml`, `<config_dir>/proberd/proberd.yml`, [`DEFAULT_CONFIG_FILE`]
pub fn read_config_text(explicit: Option<&PathBuf>) -> Result<String, ConfigError> {
    if let Some(path) = explicit {
        return read_file(path);
    }

    let local = PathBuf::from("proberd.yml");
    if local.exists() {
        match read_file(&local) {
            Ok(text) => return Ok(text),
            Err(e) => warn!("Failed to read config from {}: {}", local.display(), e),
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user_config = config_dir.join("proberd").join("proberd.yml");
        if user_config.exists() {
            match read_file(&user_config) {
                Ok(text) => return Ok(text),
                Err(e) => warn!("Failed to read config from {}: {}", user_config.display(), e),
            }
        }
    }

    read_file(Path::new(DEFAULT_CONFIG_FILE))
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Loaded config from: {}", path.display());
    Ok(text)
}
