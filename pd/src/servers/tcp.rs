//! TCP line echo server

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::config::ServerDef;
use crate::events::EventSink;
use crate::logger::Logger;

use super::{ErrorBackoff, ServerListener, ServerStats, server_name};

pub struct TcpServer {
    name: String,
    bind_addr: String,
    stats_interval: Duration,
    stats: Arc<ServerStats>,
    logger: Logger,
}

impl TcpServer {
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

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener, lifetime: CancellationToken, sink: EventSink) {
        tokio::select! {
            _ = lifetime.cancelled() => {}
            _ = self.accept_loop(&listener, &lifetime) => {}
            _ = self.stats.report(&self.name, self.stats_interval, &sink, &self.logger) => {}
        }
        self.logger.debug("stopped");
    }

    async fn accept_loop(&self, listener: &TcpListener, lifetime: &CancellationToken) {
        let mut backoff = ErrorBackoff::default();
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => {
                    backoff.reset();
                    conn
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    self.logger.warn(format!("accept failed: {}, retrying in {:?}", e, delay));
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            self.logger.debug(format!("connection from {}", peer));

            let stats = self.stats.clone();
            let logger = self.logger.clone();
            let lifetime = lifetime.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = lifetime.cancelled() => {}
                    result = echo_lines(stream, &stats) => {
                        if let Err(e) = result {
                            logger.warn(format!("connection from {} failed: {}", peer, e));
                        }
                    }
                }
            });
        }
    }
}

/// Echo each line back until the peer closes
async fn echo_lines(stream: TcpStream, stats: &ServerStats) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(());
        }
        stats.record(n);
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
}

#[async_trait]
impl ServerListener for TcpServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, lifetime: CancellationToken, sink: EventSink) {
        let listener = match TcpListener::bind(&self.bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                self.logger.error(format!("failed to bind {}: {}", self.bind_addr, e));
                return;
            }
        };
        self.logger.info(format!("listening on tcp {}", self.bind_addr));
        self.serve(listener, lifetime, sink).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::logger::FailureCounter;

    fn server() -> TcpServer {
        let def = ServerDef {
            server_type: "tcp".to_string(),
            address: "127.0.0.1".to_string(),
            port: 0,
            stats_interval_msec: 20,
        };
        TcpServer::new(&def, Logger::new("server.tcp-0", &FailureCounter::new()).unwrap())
    }

    #[tokio::test]
    async fn test_line_echo_and_stats() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(server());
        let (sink, mut stream) = EventBus::new(16).split();
        let token = CancellationToken::new();

        let srv = server.clone();
        let run_token = token.clone();
        let handle = tokio::spawn(async move { srv.serve(listener, run_token, sink).await });

        let client = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = client.into_split();
        writer.write_all(b"hello\nworld\n").await.unwrap();
        let mut reader = BufReader::new(reader);
        let mut first = String::new();
        let mut second = String::new();
        reader.read_line(&mut first).await.unwrap();
        reader.read_line(&mut second).await.unwrap();
        assert_eq!(first, "hello\n");
        assert_eq!(second, "world\n");

        let record = loop {
            let record = stream.recv().await.unwrap();
            if record.metric("req").and_then(|v| v.as_i64()) == Some(2) {
                break record;
            }
        };
        token.cancel();
        handle.await.unwrap();

        assert_eq!(record.label("ptype"), Some("server"));
        assert_eq!(record.label("server"), Some("tcp-0"));
        assert_eq!(record.metric("bytes").and_then(|v| v.as_i64()), Some(12));
        assert_eq!(server.stats().bytes(), 12);
    }
}
