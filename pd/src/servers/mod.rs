//! Servers: inbound listeners that report traffic stats as records
//!
//! Each configured server binds when it starts running. A bind failure is
//! logged against the server's logger and ends only that server; the rest of
//! the prober keeps running.

mod tcp;
mod udp;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ServerDef;
use crate::events::EventSink;
use crate::logger::{FailureCounter, Logger, LoggerError};
use crate::metrics::{EventRecord, MetricKind};

pub use tcp::TcpServer;
pub use udp::UdpServer;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown server type: {0}")]
    UnknownType(String),

    #[error("Logger error: {0}")]
    Logger(#[from] LoggerError),
}

/// A listener that produces records about the traffic it serves
#[async_trait]
pub trait ServerListener: Send + Sync {
    /// `<type>-<port>`
    fn name(&self) -> &str;

    /// Bind and serve until `lifetime` is cancelled
    async fn run(&self, lifetime: CancellationToken, sink: EventSink);
}

/// Cumulative request and byte counters
#[derive(Debug, Default)]
pub struct ServerStats {
    req: AtomicU64,
    bytes: AtomicU64,
}

impl ServerStats {
    pub fn record(&self, bytes: usize) {
        self.req.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn req(&self) -> u64 {
        self.req.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn to_record(&self, server: &str) -> EventRecord {
        EventRecord::new(MetricKind::Cumulative)
            .with_label("ptype", "server")
            .with_label("server", server)
            .with_metric("req", self.req())
            .with_metric("bytes", self.bytes())
    }

    /// Emit a stats record every `interval`; returns when the bus closes
    async fn report(&self, server: &str, interval: Duration, sink: &EventSink, logger: &Logger) {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if sink.send(self.to_record(server)).await.is_err() {
                logger.warn("event bus closed, stopping stats");
                return;
            }
        }
    }
}

/// First pause after a failed accept or receive
const INITIAL_ERROR_BACKOFF_MS: u64 = 10;

/// Longest pause between retries of a failing accept or receive
const MAX_ERROR_BACKOFF_MS: u64 = 1000;

/// Doubling pause between retries of a socket call that keeps failing
#[derive(Debug, Default)]
pub(crate) struct ErrorBackoff {
    failures: u32,
}

impl ErrorBackoff {
    pub(crate) fn next_delay(&mut self) -> Duration {
        let ms = 2u64
            .checked_pow(self.failures)
            .and_then(|factor| INITIAL_ERROR_BACKOFF_MS.checked_mul(factor))
            .map_or(MAX_ERROR_BACKOFF_MS, |ms| ms.min(MAX_ERROR_BACKOFF_MS));
        self.failures = self.failures.saturating_add(1);
        Duration::from_millis(ms)
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
    }
}

fn server_name(def: &ServerDef) -> String {
    format!("{}-{}", def.server_type, def.port)
}

/// Build one listener; nothing is bound until it runs
pub fn build(def: &ServerDef, failures: &FailureCounter) -> Result<Arc<dyn ServerListener>, ServerError> {
    let name = server_name(def);
    let logger = Logger::new(&format!("server.{}", name), failures)?;
    debug!(%name, address = %def.address, "servers::build: called");
    match def.server_type.as_str() {
        "udp" => Ok(Arc::new(UdpServer::new(def, logger))),
        "tcp" => Ok(Arc::new(TcpServer::new(def, logger))),
        other => Err(ServerError::UnknownType(other.to_string())),
    }
}

/// Build every listener in declared order
pub fn build_all(defs: &[ServerDef], failures: &FailureCounter) -> Result<Vec<Arc<dyn ServerListener>>, ServerError> {
    defs.iter().map(|def| build(def, failures)).collect()
}

/// Spawn one task per listener
pub fn start(lifetime: &CancellationToken, servers: &[Arc<dyn ServerListener>], sink: &EventSink) -> Vec<JoinHandle<()>> {
    servers
        .iter()
        .map(|server| {
            info!(server = server.name(), "servers::start: spawning listener");
            let server = server.clone();
            let lifetime = lifetime.clone();
            let sink = sink.clone();
            tokio::spawn(async move { server.run(lifetime, sink).await })
        })
        .collect()
}
