//! WebSocket connection manager with read-timeout liveness pings, bounded
//! reconnection, and dynamic subscription support.

use crate::error::{Error, Result};
use crate::messages::ControlCommand;
use crate::retry::RetryPolicy;
use crate::ws_handler::{FrameOutcome, WsHandler};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    client_async_tls_with_config,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    tungstenite::Error as WsError,
    Connector,
};
use tracing::{debug, error, info, warn};
use url::Url;

/// Configuration for the WebSocket manager.
#[derive(Debug, Clone)]
pub struct WsManagerConfig {
    /// How long to wait for a frame before sending a liveness ping.
    pub read_timeout: Duration,
    /// Pings sent without any frame in between before the session is dropped.
    pub max_missed_reads: u32,
    /// Consecutive malformed frames that force a reconnect.
    pub malformed_burst_limit: u32,
    /// Reconnect policy. Once exhausted the manager stops.
    pub reconnect: RetryPolicy,
    /// Label for metrics (e.g., "bithumb").
    pub platform_label: String,
}

impl Default for WsManagerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            max_missed_reads: 3,
            malformed_burst_limit: 50,
            reconnect: RetryPolicy::exponential(3, Duration::from_secs(2)),
            platform_label: "unknown".to_string(),
        }
    }
}

/// Lifecycle of the upstream stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
}

impl StreamPhase {
    fn as_gauge(self) -> f64 {
        match self {
            StreamPhase::Disconnected => 0.0,
            StreamPhase::Connecting => 1.0,
            StreamPhase::Subscribed => 2.0,
            StreamPhase::Streaming => 3.0,
        }
    }
}

/// WebSocket connection manager.
/// Owns the single upstream session; a failed session is dropped and a fresh one opened.
pub struct WsManager<H: WsHandler> {
    handler: Arc<H>,
    config: WsManagerConfig,
    command_rx: mpsc::Receiver<ControlCommand>,
    worker_id: String,
    phase: StreamPhase,
}

impl<H: WsHandler> WsManager<H> {
    /// Create a new WebSocket manager.
    pub fn new(
        handler: Arc<H>,
        config: WsManagerConfig,
        command_rx: mpsc::Receiver<ControlCommand>,
        worker_id: String,
    ) -> Self {
        Self {
            handler,
            config,
            command_rx,
            worker_id,
            phase: StreamPhase::Disconnected,
        }
    }

    fn set_phase(&mut self, phase: StreamPhase) {
        if self.phase != phase {
            debug!("[{}] {:?} -> {:?}", self.worker_id, self.phase, phase);
            self.phase = phase;
            gauge!("ingester_phase", "platform" => self.config.platform_label.clone())
                .set(phase.as_gauge());
        }
    }

    /// Run until shutdown or until the reconnect policy is exhausted.
    ///
    /// Only a session that delivered market data resets the failure count,
    /// so an upstream that accepts and then drops the socket still runs
    /// the policy out.
    pub async fn run(mut self) -> Result<()> {
        let mut failures = 0u32;

        loop {
            let mut streamed = false;
            let outcome = self.connect_and_run_loop(&mut streamed).await;
            self.set_phase(StreamPhase::Disconnected);

            let e = match outcome {
                Ok(()) => {
                    info!("[{}] WebSocket closed gracefully", self.worker_id);
                    return Ok(());
                }
                Err(e) => e,
            };

            counter!("ingester_errors_total", "platform" => self.config.platform_label.clone(), "error_type" => "disconnect").increment(1);
            self.handler.on_disconnect().await;

            if streamed {
                failures = 0;
            }
            failures += 1;

            if !self.config.reconnect.allows_retry(failures) {
                error!(
                    "[{}] WebSocket disconnected: {}, giving up after {} attempts",
                    self.worker_id, e, failures
                );
                return Err(Error::RetriesExhausted(failures));
            }

            let delay = self.config.reconnect.delay_after(failures);
            warn!(
                "[{}] WebSocket disconnected: {}, reconnecting in {:?}",
                self.worker_id, e, delay
            );

            if self.wait_before_reconnect(delay).await {
                info!("[{}] Shutdown requested while disconnected", self.worker_id);
                return Ok(());
            }
        }
    }

    /// Sleep out the backoff while still honouring commands.
    /// Returns true if a shutdown arrived.
    async fn wait_before_reconnect(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ControlCommand::Shutdown) | None => return true,
                        // Keeps the handler's symbol set current for the next session.
                        Some(cmd) => {
                            let _ = self.handler.handle_command(cmd).await;
                        }
                    }
                }
            }
        }
    }

    async fn connect_and_run_loop(&mut self, streamed: &mut bool) -> Result<()> {
        self.set_phase(StreamPhase::Connecting);

        let url_str = self.handler.url().to_string();
        info!("[{}] Connecting to WebSocket: {}", self.worker_id, url_str);

        let url = Url::parse(&url_str)?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Generic("No host in URL".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(443);
        let addr_str = format!("{}:{}", host, port);

        // Resolve DNS and prefer IPv4 to avoid IPv6 timeout issues
        let addrs: Vec<SocketAddr> = addr_str
            .to_socket_addrs()
            .map_err(|e| Error::Generic(format!("DNS resolution failed: {}", e)))?
            .collect();

        let mut sorted_addrs: Vec<SocketAddr> =
            addrs.iter().filter(|a| a.is_ipv4()).copied().collect();
        sorted_addrs.extend(addrs.iter().filter(|a| a.is_ipv6()).copied());

        let mut tcp_stream = None;
        for addr in &sorted_addrs {
            debug!("[{}] Trying to connect to {}", self.worker_id, addr);
            match timeout(Duration::from_secs(5), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    tcp_stream = Some(stream);
                    break;
                }
                Ok(Err(e)) => {
                    debug!("[{}] TCP connect to {} failed: {}", self.worker_id, addr, e);
                }
                Err(_) => {
                    debug!("[{}] TCP connect to {} timed out", self.worker_id, addr);
                }
            }
        }

        let tcp_stream = tcp_stream
            .ok_or_else(|| Error::Generic("All connection attempts failed".to_string()))?;

        let connector = if url.scheme() == "wss" {
            Some(tls_connector()?)
        } else {
            None
        };

        let (ws_stream, response) =
            client_async_tls_with_config(url_str.as_str(), tcp_stream, None, connector).await?;

        debug!(
            "[{}] WebSocket handshake complete, status: {:?}",
            self.worker_id,
            response.status()
        );
        let (mut write, mut read) = ws_stream.split();

        gauge!("ingester_active_connections", "platform" => self.config.platform_label.clone())
            .increment(1.0);
        info!("[{}] WebSocket connected", self.worker_id);

        let result = self.subscribe_and_stream(&mut read, &mut write, streamed).await;

        gauge!("ingester_active_connections", "platform" => self.config.platform_label.clone())
            .decrement(1.0);
        result
    }

    async fn subscribe_and_stream<R, W>(
        &mut self,
        read: &mut R,
        write: &mut W,
        streamed: &mut bool,
    ) -> Result<()>
    where
        R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
        W: Sink<Message, Error = WsError> + Unpin,
    {
        let batches = self.handler.on_connect_messages();
        for batch in &batches {
            debug!("[{}] Sending subscription: {}", self.worker_id, batch);
            write.send(Message::Text(batch.clone())).await?;
        }
        info!(
            "[{}] Subscribed to {} symbols in {} batches",
            self.worker_id,
            self.handler.subscription_count(),
            batches.len()
        );

        self.set_phase(StreamPhase::Subscribed);
        self.handler.on_reconnect().await;

        self.stream_loop(read, write, streamed).await
    }

    /// Read frames until the session fails or a shutdown arrives.
    /// `streamed` is set once a frame delivered market data.
    async fn stream_loop<R, W>(&mut self, read: &mut R, write: &mut W, streamed: &mut bool) -> Result<()>
    where
        R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
        W: Sink<Message, Error = WsError> + Unpin,
    {
        let label = self.config.platform_label.clone();
        let mut missed_reads = 0u32;
        let mut malformed_run = 0u32;

        loop {
            tokio::select! {
                frame = timeout(self.config.read_timeout, read.next()) => {
                    let msg = match frame {
                        Err(_) => {
                            if missed_reads >= self.config.max_missed_reads {
                                warn!("[{}] No frames after {} pings, dropping session", self.worker_id, missed_reads);
                                return Err(Error::ReadTimeout(missed_reads));
                            }
                            missed_reads += 1;
                            debug!("[{}] Read timeout, sending ping ({}/{})", self.worker_id, missed_reads, self.config.max_missed_reads);
                            write.send(Message::Ping(Vec::new())).await?;
                            continue;
                        }
                        Ok(None) => {
                            info!("[{}] WebSocket stream ended", self.worker_id);
                            return Err(Error::ConnectionClosed);
                        }
                        Ok(Some(Err(e))) => {
                            error!("[{}] WebSocket error: {:?}", self.worker_id, e);
                            return Err(Error::WebSocket(e));
                        }
                        Ok(Some(Ok(msg))) => msg,
                    };

                    missed_reads = 0;

                    match msg {
                        Message::Text(text) => {
                            counter!("ingester_messages_received_total", "platform" => label.clone()).increment(1);
                            match self.handler.on_message(&text).await {
                                Ok(FrameOutcome::Data) => {
                                    malformed_run = 0;
                                    *streamed = true;
                                    self.set_phase(StreamPhase::Streaming);
                                }
                                Ok(FrameOutcome::Control) => {
                                    malformed_run = 0;
                                }
                                Err(e) if e.is_malformed_frame() => {
                                    malformed_run += 1;
                                    counter!("ingester_malformed_frames_total", "platform" => label.clone()).increment(1);
                                    debug!("[{}] Dropped frame: {}", self.worker_id, e);
                                    if malformed_run >= self.config.malformed_burst_limit {
                                        warn!("[{}] {} malformed frames in a row, reconnecting", self.worker_id, malformed_run);
                                        return Err(Error::MalformedBurst(malformed_run));
                                    }
                                }
                                Err(e) => {
                                    error!("[{}] Error handling message: {:?}", self.worker_id, e);
                                    counter!("ingester_errors_total", "platform" => label.clone(), "error_type" => "handler").increment(1);
                                }
                            }
                        }
                        Message::Binary(data) => {
                            if let Err(e) = self.handler.on_binary_message(&data).await {
                                debug!("[{}] Error handling binary message: {:?}", self.worker_id, e);
                            }
                        }
                        Message::Ping(data) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Message::Pong(_) => {
                            debug!("[{}] Received pong", self.worker_id);
                        }
                        Message::Close(frame) => {
                            info!("[{}] Received close frame: {:?}", self.worker_id, frame);
                            return Err(Error::ConnectionClosed);
                        }
                        Message::Frame(_) => {}
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ControlCommand::Shutdown) | None => {
                            info!("[{}] Shutting down stream", self.worker_id);
                            let close_frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "Shutdown".into(),
                            };
                            let _ = write.send(Message::Close(Some(close_frame))).await;
                            return Ok(());
                        }
                        Some(cmd) => {
                            for msg in self.handler.handle_command(cmd).await {
                                debug!("[{}] Sending subscription update: {}", self.worker_id, msg);
                                write.send(Message::Text(msg)).await?;
                            }
                        }
                    }
                }
            }
        }
    }
}

fn tls_connector() -> Result<Connector> {
    let mut root_store = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = root_store.add(cert);
    }

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Generic(format!("TLS config error: {}", e)))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(Connector::Rustls(Arc::new(config)))
}
