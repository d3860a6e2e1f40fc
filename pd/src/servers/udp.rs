//! UDP echo server

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::ServerDef;
use crate::events::EventSink;
use crate::logger::Logger;

use super::{ErrorBackoff, ServerListener, ServerStats, server_name};

/// Largest datagram echoed back
const MAX_DATAGRAM_SIZE: usize = 65_535;

pub struct UdpServer {
    name: String,
    bind_addr: String,
    stats_interval: Duration,
    stats: Arc<ServerStats>,
    logger: Logger,
}

impl UdpServer {
    pub fn new(def: &ServerDef, logger: Logger) -> Self {
        Self {
            name: server_name(def),
            bind_addr: format!("{}:{}", def.address, def.port),
            stats_interval: def.stats_interval(),
            stats: Arc::new(ServerStats::default()),
            logger,
        }
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Serve on an already bound socket
    pub async fn serve(&self, socket: UdpSocket, lifetime: CancellationToken, sink: EventSink) {
        tokio::select! {
            _ = lifetime.cancelled() => {}
            _ = self.echo(&socket) => {}
            _ = self.stats.report(&self.name, self.stats_interval, &sink, &self.logger) => {}
        }
        self.logger.debug("stopped");
    }

    async fn echo(&self, socket: &UdpSocket) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut backoff = ErrorBackoff::default();
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(r) => {
                    backoff.reset();
                    r
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    self.logger.warn(format!("recv failed: {}, retrying in {:?}", e, delay));
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            self.stats.record(len);
            if let Err(e) = socket.send_to(&buf[..len], peer).await {
                self.logger.warn(format!("send to {} failed: {}", peer, e));
            }
        }
    }
}

#[async_trait]
impl ServerListener for UdpServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, lifetime: CancellationToken, sink: EventSink) {
        let socket = match UdpSocket::bind(&self.bind_addr).await {
            Ok(s) => s,
            Err(e) => {
                self.logger.error(format!("failed to bind {}: {}", self.bind_addr, e));
                return;
            }
        };
        self.logger.info(format!("listening on udp {}", self.bind_addr));
        self.serve(socket, lifetime, sink).await;
    }
}
