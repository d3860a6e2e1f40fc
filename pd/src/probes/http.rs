//! HTTP probe - GET request, success on 2xx

use std::collections::HashMap;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProbeDef;
use crate::targets::Targets;

use super::runner::{TargetCheck, TargetLoop};
use super::{Probe, ProbeContext, ProbeError};

fn default_scheme() -> String {
    "http".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpOptions {
    #[serde(default = "default_scheme")]
    scheme: String,
    #[serde(default = "default_path")]
    path: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            path: default_path(),
        }
    }
}

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

pub struct HttpCheck {
    scheme: String,
    port: u16,
    path: String,
    timeout: Duration,
    user_agent: String,
    /// Used for IP literal targets
    direct: reqwest::Client,
    /// Host name targets, each pinned to its last resolved address
    pinned: Mutex<HashMap<String, (SocketAddr, reqwest::Client)>>,
}

impl HttpCheck {
    fn new(scheme: String, port: u16, path: String, timeout: Duration, user_agent: String) -> Result<Self, reqwest::Error> {
        let direct = client_builder(timeout, &user_agent).build()?;
        Ok(Self {
            scheme,
            port,
            path,
            timeout,
            user_agent,
            direct,
            pinned: Mutex::new(HashMap::new()),
        })
    }

    fn url_for(&self, target: &str) -> String {
        let host = match target.parse::<Ipv6Addr>() {
            Ok(_) => format!("[{}]", target),
            Err(_) => target.to_string(),
        };
        format!("{}://{}:{}{}", self.scheme, host, self.port, self.path)
    }

    /// Client that connects `target` to `addr`, keeping `target` as the URL host
    fn client_for(&self, target: &str, addr: SocketAddr) -> Result<reqwest::Client, String> {
        if target.parse::<IpAddr>().is_ok() {
            return Ok(self.direct.clone());
        }

        let mut pinned = self.pinned.lock().map_err(|e| e.to_string())?;
        if let Some((pinned_addr, client)) = pinned.get(target)
            && *pinned_addr == addr
        {
            return Ok(client.clone());
        }

        debug!(%target, %addr, "HttpCheck::client_for: pinning client");
        let client = client_builder(self.timeout, &self.user_agent)
            .resolve(target, addr)
            .build()
            .map_err(|e| e.to_string())?;
        pinned.insert(target.to_string(), (addr, client.clone()));
        Ok(client)
    }
}

fn client_builder(timeout: Duration, user_agent: &str) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .no_proxy()
}

#[async_trait]
impl TargetCheck for HttpCheck {
    fn probe_type(&self) -> &'static str {
        "http"
    }

    async fn check(&self, targets: &Targets, target: &str) -> Result<(), String> {
        let addr = targets.resolve(target, self.port).await.map_err(|e| e.to_string())?;
        let client = self.client_for(target, addr)?;
        let response = client
            .get(self.url_for(target))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("unexpected status {}", status))
        }
    }
}

/// Build an `http` probe
pub fn build(def: &ProbeDef, ctx: ProbeContext) -> Result<Arc<dyn Probe>, ProbeError> {
    if def.targets.is_empty() {
        return Err(ProbeError::NoTargets(def.name.clone()));
    }

    let opts: HttpOptions = if def.options.is_null() {
        HttpOptions::default()
    } else {
        serde_yaml::from_value(def.options.clone()).map_err(|e| ProbeError::InvalidOptions {
            name: def.name.clone(),
            reason: e.to_string(),
        })?
    };
    if opts.scheme != "http" && opts.scheme != "https" {
        return Err(ProbeError::InvalidOptions {
            name: def.name.clone(),
            reason: format!("unsupported scheme '{}'", opts.scheme),
        });
    }
    if !opts.path.starts_with('/') {
        return Err(ProbeError::InvalidOptions {
            name: def.name.clone(),
            reason: format!("path '{}' must start with '/'", opts.path),
        });
    }

    let version = ctx.vars.get("version").map(String::as_str).unwrap_or("dev");
    let port = def.port.unwrap_or(if opts.scheme == "https" {
        DEFAULT_HTTPS_PORT
    } else {
        DEFAULT_HTTP_PORT
    });
    let check = HttpCheck::new(opts.scheme, port, opts.path, def.timeout(), format!("proberd/{}", version)).map_err(
        |e| ProbeError::Client {
            name: def.name.clone(),
            reason: e.to_string(),
        },
    )?;
    let targets = Targets::new(def.targets.clone(), ctx.targets_options.as_ref());
    Ok(Arc::new(TargetLoop::new(def, targets, check, ctx.logger)))
}
