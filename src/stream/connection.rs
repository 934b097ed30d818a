//! Resilient WebSocket client.
//!
//! Features:
//! - Handshake timeout
//! - Bounded, fixed-interval reconnection with a single-flight guard
//! - Events delivered over a channel instead of callbacks
//!
//! All socket I/O and every state transition happens on one spawned task.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::reconnect::{ReconnectDecision, ReconnectPolicy};
use super::types::{ConnectionEvent, ConnectionState, StateCell, StreamConfig};
use crate::error::ConnectionError;
use crate::metrics;
use crate::utils::ShutdownToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State shared between the handle and its I/O task.
#[derive(Debug)]
struct Shared {
    state: StateCell,
    policy: ReconnectPolicy,
}

/// A WebSocket connection that reconnects itself.
///
/// Create with [`StreamingConnection::new`], which also returns the event
/// receiver, then call [`connect`](Self::connect) from inside a tokio runtime.
pub struct StreamingConnection {
    config: StreamConfig,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    stop: ShutdownToken,
    close: ShutdownToken,
    io_task: Option<JoinHandle<()>>,
}

impl StreamingConnection {
    /// Create a disconnected connection and the receiver for its events.
    pub fn new(config: StreamConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: StateCell::new(),
            policy: ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_interval),
        });

        let connection = Self {
            config,
            shared,
            events,
            outbound: None,
            stop: ShutdownToken::new(),
            close: ShutdownToken::new(),
            io_task: None,
        };
        (connection, rx)
    }

    /// Start connecting to `uri` on a background task.
    ///
    /// Ignored while a previous connection is still active. The handshake
    /// result arrives as a [`ConnectionEvent`].
    pub fn connect(&mut self, uri: &str) -> Result<(), ConnectionError> {
        let uri = validate_uri(uri)?;

        if self.is_active() {
            warn!(uri = %uri, state = %self.state(), "Connection already active, ignoring connect");
            return Ok(());
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.stop = ShutdownToken::new();
        self.close = ShutdownToken::new();
        self.outbound = Some(outbound_tx);

        let worker = IoWorker {
            uri: uri.to_string(),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            outbound: outbound_rx,
            stop: self.stop.clone(),
            close: self.close.clone(),
        };

        info!(uri = %uri, "Starting streaming connection");
        self.io_task = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Queue a text message for sending.
    ///
    /// Returns `false` and drops the message unless the connection is open.
    pub fn send(&self, message: impl Into<String>) -> bool {
        if !self.is_connected() {
            debug!(state = %self.state(), "Not connected, dropping outbound message");
            return false;
        }

        match &self.outbound {
            Some(tx) => tx.send(message.into()).is_ok(),
            None => false,
        }
    }

    /// Close gracefully and wait for the I/O task to finish.
    ///
    /// Never triggers a reconnection.
    pub async fn close(&mut self) {
        self.close.cancel();
        self.join().await;
    }

    /// Cancel all pending work and wait for the I/O task to finish.
    pub async fn stop(&mut self) {
        self.stop.cancel();
        self.join().await;
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnection attempts since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.policy.attempts()
    }

    fn is_active(&self) -> bool {
        self.io_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn join(&mut self) {
        self.outbound = None;
        if let Some(task) = self.io_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Streaming I/O task failed");
                self.shared.state.set(ConnectionState::Disconnected);
            }
        }
    }
}

impl Drop for StreamingConnection {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.io_task.take() {
            if !task.is_finished() {
                task.abort();
            }
        }
    }
}

fn validate_uri(uri: &str) -> Result<Url, ConnectionError> {
    let url = Url::parse(uri).map_err(|e| ConnectionError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConnectionError::InvalidUri {
            uri: uri.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

enum Handshake {
    Open(Box<WsStream>),
    Failed(ConnectionError),
    Cancelled,
}

enum SessionEnd {
    Failed(ConnectionError),
    Closed,
    Stopped,
}

/// Owns the socket and drives the state machine.
struct IoWorker {
    uri: String,
    config: StreamConfig,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    stop: ShutdownToken,
    close: ShutdownToken,
}

impl IoWorker {
    async fn run(mut self) {
        self.shared.policy.reset();

        loop {
            self.shared.state.set(ConnectionState::Connecting);

            let failure = match self.handshake().await {
                Handshake::Cancelled => break,
                Handshake::Failed(err) => err,
                Handshake::Open(ws) => {
                    self.shared.policy.reset();
                    self.discard_outbound();
                    self.shared.state.set(ConnectionState::Connected);
                    info!(uri = %self.uri, "Streaming connection established");
                    self.emit(ConnectionEvent::Connected);

                    match self.session(*ws).await {
                        SessionEnd::Closed | SessionEnd::Stopped => break,
                        SessionEnd::Failed(err) => err,
                    }
                }
            };

            warn!(uri = %self.uri, error = %failure, "Streaming connection failed");
            self.emit(ConnectionEvent::Error(failure));

            let discarded = self.discard_outbound();
            if discarded > 0 {
                debug!(discarded = discarded, "Dropped messages queued for the failed session");
            }

            if !self.config.auto_reconnect || !self.schedule_reconnect().await {
                break;
            }
        }

        self.shared.state.set(ConnectionState::Disconnected);
        self.emit(ConnectionEvent::Disconnected);
        debug!(uri = %self.uri, "Streaming I/O task finished");
    }

    /// Wait out the next reconnection delay.
    ///
    /// Returns `false` when the worker should exit instead of retrying.
    async fn schedule_reconnect(&self) -> bool {
        let max_attempts = self.config.max_reconnect_attempts;

        loop {
            match self.shared.policy.begin() {
                ReconnectDecision::Retry { attempt, delay } => {
                    self.shared.state.set(ConnectionState::Reconnecting);
                    metrics::inc_ws_reconnects();
                    info!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnection"
                    );
                    self.emit(ConnectionEvent::Reconnecting {
                        attempt,
                        max_attempts,
                    });

                    let interrupted = self.pause(delay).await;
                    self.shared.policy.finish();
                    return !interrupted;
                }
                ReconnectDecision::AlreadyPending => {
                    // Someone else holds the guard; retry once it is released.
                    self.shared.state.set(ConnectionState::Reconnecting);
                    debug!("Reconnection already pending, waiting for it to clear");
                    if self.pause(self.config.reconnect_interval).await {
                        return false;
                    }
                }
                ReconnectDecision::Exhausted { attempts } => {
                    error!(attempts = attempts, uri = %self.uri, "Reconnection attempts exhausted");
                    metrics::inc_ws_reconnect_exhausted();
                    self.emit(ConnectionEvent::Error(ConnectionError::ReconnectExhausted {
                        attempts,
                    }));
                    self.emit(ConnectionEvent::ReconnectExhausted { attempts });
                    return false;
                }
            }
        }
    }

    /// Sleep for `delay`. Returns `true` if stop or close interrupted it.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.stop.cancelled() => true,
            _ = self.close.cancelled() => true,
        }
    }

    /// Drop messages queued for a session that no longer exists.
    fn discard_outbound(&mut self) -> usize {
        let mut discarded = 0;
        while self.outbound.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    async fn handshake(&self) -> Handshake {
        let timeout = self.config.connection_timeout;
        let attempt = tokio::time::timeout(timeout, connect_async(self.uri.as_str()));

        tokio::select! {
            _ = self.stop.cancelled() => Handshake::Cancelled,
            _ = self.close.cancelled() => Handshake::Cancelled,
            result = attempt => match result {
                Ok(Ok((ws, _response))) => Handshake::Open(Box::new(ws)),
                Ok(Err(e)) => Handshake::Failed(ConnectionError::Handshake(e.to_string())),
                Err(_) => Handshake::Failed(ConnectionError::Timeout(timeout.as_millis() as u64)),
            },
        }
    }

    async fn session(&mut self, ws: WsStream) -> SessionEnd {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return SessionEnd::Stopped,
                _ = self.close.cancelled() => {
                    self.shared.state.set(ConnectionState::Closing);
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Failed to send close frame");
                        return SessionEnd::Closed;
                    }

                    // Wait briefly for the peer to acknowledge.
                    let drain = async {
                        while let Some(Ok(frame)) = read.next().await {
                            if frame.is_close() {
                                break;
                            }
                        }
                    };
                    if tokio::time::timeout(self.config.connection_timeout, drain).await.is_err() {
                        debug!("Peer did not acknowledge close");
                    }
                    return SessionEnd::Closed;
                }
                Some(text) = self.outbound.recv() => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return SessionEnd::Failed(ConnectionError::Write(e.to_string()));
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        metrics::inc_ws_messages_received();
                        self.emit(ConnectionEvent::Message(text));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        metrics::inc_ws_messages_received();
                        self.emit(ConnectionEvent::Message(String::from_utf8_lossy(&bytes).into_owned()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        return SessionEnd::Failed(ConnectionError::ClosedByPeer { code, reason });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Failed(ConnectionError::Read(e.to_string())),
                    None => {
                        return SessionEnd::Failed(ConnectionError::ClosedByPeer {
                            code: None,
                            reason: "stream ended".to_string(),
                        });
                    }
                },
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}
