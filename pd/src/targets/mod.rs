//! Probe targets and address resolution
//!
//! A probe's targets are a static host list. When global target options are
//! configured, resolved addresses are cached per host and refreshed once the
//! resolve interval has passed; otherwise every probe round resolves afresh.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::lookup_host;
use tracing::debug;

use crate::config::GlobalTargetsOptions;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no {family} address for {host}")]
    NoAddress { host: String, family: &'static str },
}

struct CachedAddr {
    ip: IpAddr,
    resolved_at: Instant,
}

/// Hosts a probe runs against
pub struct Targets {
    hosts: Vec<String>,
    ipv6: bool,
    cache_ttl: Option<Duration>,
    cache: Mutex<HashMap<String, CachedAddr>>,
}

impl Targets {
    pub fn new(hosts: Vec<String>, opts: Option<&GlobalTargetsOptions>) -> Self {
        debug!(hosts = hosts.len(), ?opts, "Targets::new: called");
        Self {
            hosts,
            ipv6: opts.is_some_and(|o| o.ipv6),
            cache_ttl: opts.map(GlobalTargetsOptions::resolve_interval),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn list(&self) -> &[String] {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Resolve `host` to a socket address on `port`
    pub async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        if let Some(ip) = self.cached(host) {
            return Ok(SocketAddr::new(ip, port));
        }

        let addrs = lookup_host((host, port))
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;
        let addr = addrs
            .into_iter()
            .find(|a| a.is_ipv6() == self.ipv6)
            .ok_or_else(|| ResolveError::NoAddress {
                host: host.to_string(),
                family: if self.ipv6 { "IPv6" } else { "IPv4" },
            })?;

        if self.cache_ttl.is_some()
            && let Ok(mut cache) = self.cache.lock()
        {
            cache.insert(
                host.to_string(),
                CachedAddr {
                    ip: addr.ip(),
                    resolved_at: Instant::now(),
                },
            );
        }
        debug!(%host, %addr, "Targets::resolve: resolved");
        Ok(addr)
    }

    fn cached(&self, host: &str) -> Option<IpAddr> {
        let ttl = self.cache_ttl?;
        let cache = self.cache.lock().ok()?;
        cache
            .get(host)
            .filter(|c| c.resolved_at.elapsed() < ttl)
            .map(|c| c.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literal_skips_lookup() {
        let targets = Targets::new(vec!["127.0.0.1".to_string()], None);
        let addr = targets.resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn test_localhost_resolves_to_ipv4() {
        let targets = Targets::new(vec!["localhost".to_string()], None);
        let addr = targets.resolve("localhost", 80).await.unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 80);
    }

    #[tokio::test]
    async fn test_resolution_cached_with_global_options() {
        let opts = GlobalTargetsOptions::default();
        let targets = Targets::new(vec!["localhost".to_string()], Some(&opts));
        assert!(targets.cached("localhost").is_none());

        targets.resolve("localhost", 80).await.unwrap();
        assert!(targets.cached("localhost").is_some());

        let again = targets.resolve("localhost", 9000).await.unwrap();
        assert_eq!(again.port(), 9000);
    }

    #[tokio::test]
    async fn test_no_cache_without_global_options() {
        let targets = Targets::new(vec!["localhost".to_string()], None);
        targets.resolve("localhost", 80).await.unwrap();
        assert!(targets.cached("localhost").is_none());
    }

    #[test]
    fn test_list_keeps_order() {
        let targets = Targets::new(vec!["b".to_string(), "a".to_string()], None);
        assert_eq!(targets.list(), ["b".to_string(), "a".to_string()]);
        assert!(!targets.is_empty());
    }
}
