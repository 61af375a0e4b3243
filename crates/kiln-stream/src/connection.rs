//! Connection lifecycle: connect, read, reconnect.
//!
//! One manager owns one WebSocket. Its `run` loop drives the state
//! machine `Disconnected → Connecting → Connected → Closing →
//! Disconnected`, feeding decoded frames to the router and reconnecting
//! with capped exponential backoff on transport failure. Every suspension
//! point (handshake, next frame, backoff sleep) is interruptible by the
//! cancellation token, so a stop request never waits on the network.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use kiln_core::constants::MAX_CONNECTIONS;
use kiln_core::errors::ConnectError;
use kiln_core::events::PromptEvent;
use kiln_core::retry::backoff_delay;

use crate::codec::EnvelopeCodec;
use crate::config::StreamConfig;
use crate::endpoint::Endpoint;
use crate::router::EventRouter;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observable lifecycle state of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No transport; the client is idle or between reconnect attempts.
    Disconnected = 0,
    /// A handshake is in flight.
    Connecting = 1,
    /// The receive loop is live.
    Connected = 2,
    /// Shutdown was requested and the transport is being released.
    Closing = 3,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Lock-free cell holding the current [`ConnectionState`].
///
/// Written only by the manager task; read from anywhere.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Closing,
            _ => ConnectionState::Disconnected,
        }
    }
}

static LIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Slot in the process-wide live-connection budget.
///
/// Held for the lifetime of a manager task; released on drop.
pub(crate) struct ConnectionPermit {
    counter: &'static AtomicUsize,
}

impl ConnectionPermit {
    pub(crate) fn acquire() -> Result<Self, ConnectError> {
        Self::acquire_from(&LIVE_CONNECTIONS, MAX_CONNECTIONS)
    }

    fn acquire_from(counter: &'static AtomicUsize, limit: usize) -> Result<Self, ConnectError> {
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current >= limit {
                return Err(ConnectError::TooManyConnections { limit });
            }
            match counter.compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Ok(Self { counter }),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let _ = self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

enum ConnectAttempt {
    Cancelled,
    Failed(ConnectError),
}

enum ReadOutcome {
    Cancelled,
    TransportLost(String),
    TooManyBadFrames,
}

/// Owns the WebSocket and drives the connect-and-maintain loop.
pub struct ConnectionManager {
    endpoint: Endpoint,
    config: StreamConfig,
    codec: EnvelopeCodec,
    router: EventRouter,
    state: Arc<StateCell>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    pub(crate) fn new(
        endpoint: Endpoint,
        config: StreamConfig,
        router: EventRouter,
        state: Arc<StateCell>,
        cancel: CancellationToken,
    ) -> Self {
        let codec = EnvelopeCodec::new(config.effective_message_limit());
        Self {
            endpoint,
            config,
            codec,
            router,
            state,
            cancel,
        }
    }

    /// Connect-and-maintain loop.
    ///
    /// Retries are unlimited while the stop signal has not fired; the
    /// backoff attempt counter resets after `healthy_reset_secs` of
    /// connected uptime. Exits only on cancellation, always leaving the
    /// state at `Disconnected`.
    pub(crate) async fn run(self, permit: ConnectionPermit) {
        let _permit = permit;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.state.set(ConnectionState::Connecting);

            match self.connect_once().await {
                Ok(ws) => {
                    self.state.set(ConnectionState::Connected);
                    info!(endpoint = %self.endpoint, "connected");
                    self.router.route(&PromptEvent::connection_open());
                    let connected_at = Instant::now();

                    let outcome = self.read_loop(ws).await;
                    self.state.set(ConnectionState::Disconnected);
                    self.router.route(&PromptEvent::connection_lost());
                    match outcome {
                        ReadOutcome::Cancelled => break,
                        ReadOutcome::TransportLost(reason) => {
                            warn!(reason, "connection lost");
                        }
                        ReadOutcome::TooManyBadFrames => {
                            warn!(
                                threshold = self.config.bad_frame_threshold,
                                "too many consecutive bad frames, reconnecting"
                            );
                        }
                    }

                    if connected_at.elapsed() >= Duration::from_secs(self.config.healthy_reset_secs)
                    {
                        attempt = 0;
                    }
                }
                Err(ConnectAttempt::Cancelled) => break,
                Err(ConnectAttempt::Failed(err)) => {
                    self.state.set(ConnectionState::Disconnected);
                    warn!(error = %err, attempt, "connect attempt failed");
                }
            }

            let delay = backoff_delay(attempt, &self.config.backoff, rand::random());
            attempt = attempt.saturating_add(1);
            debug!(delay_ms = delay, attempt, "backing off before reconnect");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
        }

        self.state.set(ConnectionState::Disconnected);
        debug!(endpoint = %self.endpoint, "connection manager stopped");
    }

    /// One handshake attempt, bounded by the connect timeout and the stop
    /// signal. Cancellation abandons the in-flight attempt outright: a
    /// handshake that would have succeeded is discarded unopened.
    async fn connect_once(&self) -> Result<WsStream, ConnectAttempt> {
        let secs = self.config.connect_timeout_secs;
        let connecting = connect_async(self.endpoint.as_str());
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.state.set(ConnectionState::Closing);
                Err(ConnectAttempt::Cancelled)
            }
            outcome = timeout(Duration::from_secs(secs), connecting) => match outcome {
                Err(_) => Err(ConnectAttempt::Failed(ConnectError::Timeout { secs })),
                Ok(Err(e)) => Err(ConnectAttempt::Failed(ConnectError::Transport(e.to_string()))),
                Ok(Ok((ws, _response))) => Ok(ws),
            }
        }
    }

    /// Pull frames until the transport fails, the bad-frame threshold
    /// trips, or the stop signal fires.
    async fn read_loop(&self, mut ws: WsStream) -> ReadOutcome {
        let mut consecutive_bad: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.state.set(ConnectionState::Closing);
                    let _ = ws.close(None).await;
                    return ReadOutcome::Cancelled;
                }
                frame = ws.next() => match frame {
                    None => return ReadOutcome::TransportLost("stream ended".into()),
                    Some(Err(e)) => return ReadOutcome::TransportLost(e.to_string()),
                    Some(Ok(Message::Text(text))) => {
                        match self.codec.decode(text.as_str()) {
                            Ok(event) => {
                                consecutive_bad = 0;
                                self.router.route(&event);
                            }
                            Err(err) => {
                                consecutive_bad += 1;
                                warn!(
                                    error = %err,
                                    consecutive_bad,
                                    frame_len = text.len(),
                                    "dropping undecodable frame"
                                );
                                if consecutive_bad >= self.config.bad_frame_threshold {
                                    return ReadOutcome::TooManyBadFrames;
                                }
                            }
                        }
                    }
                    // Binary frames carry preview blobs outside the text
                    // envelope; they are not part of the event stream.
                    Some(Ok(Message::Binary(bytes))) => {
                        trace!(len = bytes.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) => {
                        return ReadOutcome::TransportLost("server closed the connection".into());
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
