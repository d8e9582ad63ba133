//! Subscriber connection lifecycle
//!
//! A `SubscriberConnection` relays engine messages from the broadcast
//! channel to a remote peer over a pluggable transport. It owns the
//! reconnect policy (exponential backoff with optional jitter) and the
//! heartbeat that detects half-open connections.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info, warn};

use super::EngineMessage;
use crate::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Wire frames exchanged with a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(EngineMessage),
    Ping,
    Pong,
    Close,
}

/// Transport seam so the connection logic can be driven by anything that
/// moves frames: a websocket, a TCP stream, or an in-memory pair in tests.
#[async_trait]
pub trait MessageTransport: Send {
    async fn connect(&mut self) -> Result<()>;
    async fn send(&mut self, frame: Frame) -> Result<()>;
    /// Receive the next inbound frame, `None` when the peer closed cleanly
    async fn recv(&mut self) -> Result<Option<Frame>>;
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub heartbeat_interval: Duration,
    /// Grace period after a ping before the peer is considered gone
    pub pong_timeout: Duration,
    pub jitter: bool,
    /// `None` retries forever
    pub max_reconnects: Option<u32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(10),
            jitter: true,
            max_reconnects: None,
        }
    }
}

/// What the event loop decided to do after one select round
enum Step {
    Relay(EngineMessage),
    SendPing,
    SendPong,
    PeerClosed,
    ChannelClosed,
    Lagged(u64),
    Noop,
}

pub struct SubscriberConnection<T: MessageTransport> {
    transport: T,
    config: ConnectionConfig,
    receiver: broadcast::Receiver<EngineMessage>,
    state: ConnectionState,
}

impl<T: MessageTransport> SubscriberConnection<T> {
    pub fn new(
        transport: T,
        config: ConnectionConfig,
        receiver: broadcast::Receiver<EngineMessage>,
    ) -> Self {
        Self { transport, config, receiver, state: ConnectionState::Disconnected }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drive the connection until the broadcast channel closes or the
    /// reconnect budget is exhausted.
    pub async fn run(&mut self) -> Result<()> {
        let mut backoff = self.config.base_backoff;
        let mut reconnects: u32 = 0;

        loop {
            self.state = if reconnects == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            };

            match self.transport.connect().await {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    backoff = self.config.base_backoff;
                    info!("subscriber connected");

                    match self.message_loop().await {
                        Ok(()) => {
                            self.state = ConnectionState::Disconnected;
                            return Ok(());
                        }
                        Err(error) => {
                            warn!(%error, "subscriber connection dropped");
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "subscriber connect failed");
                }
            }

            reconnects += 1;
            if let Some(max) = self.config.max_reconnects {
                if reconnects > max {
                    self.state = ConnectionState::Disconnected;
                    return Err(EngineError::Broadcast(format!(
                        "gave up after {max} reconnect attempts"
                    )));
                }
            }

            let wait = self.jittered(backoff);
            debug!(wait_ms = wait.as_millis() as u64, "backing off before reconnect");
            sleep(wait).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    /// Pump frames until the channel closes or the connection errors
    async fn message_loop(&mut self) -> Result<()> {
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.tick().await; // first tick fires immediately
        let mut last_pong = Instant::now();
        let deadline = self.config.heartbeat_interval + self.config.pong_timeout;

        loop {
            // Arms only pick a step; sends happen below so the transport is
            // not borrowed by the select and a handler at the same time.
            let step = tokio::select! {
                outbound = self.receiver.recv() => match outbound {
                    Ok(message) => Step::Relay(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => Step::Lagged(skipped),
                    Err(broadcast::error::RecvError::Closed) => Step::ChannelClosed,
                },
                inbound = self.transport.recv() => match inbound? {
                    Some(Frame::Pong) => {
                        last_pong = Instant::now();
                        Step::Noop
                    }
                    Some(Frame::Ping) => Step::SendPong,
                    Some(Frame::Close) | None => Step::PeerClosed,
                    Some(Frame::Message(_)) => Step::Noop,
                },
                _ = heartbeat.tick() => {
                    if last_pong.elapsed() > deadline {
                        return Err(EngineError::Broadcast(
                            "heartbeat timed out waiting for pong".into(),
                        ));
                    }
                    Step::SendPing
                }
            };

            match step {
                Step::Relay(message) => self.transport.send(Frame::Message(message)).await?,
                Step::SendPing => self.transport.send(Frame::Ping).await?,
                Step::SendPong => self.transport.send(Frame::Pong).await?,
                Step::Lagged(skipped) => {
                    warn!(skipped, "subscriber lagged behind the broadcast channel");
                }
                Step::PeerClosed => {
                    return Err(EngineError::Broadcast("peer closed the connection".into()))
                }
                Step::ChannelClosed => {
                    let _ = self.transport.send(Frame::Close).await;
                    return Ok(());
                }
                Step::Noop => {}
            }
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter {
            base.mul_f64(1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            base
        }
    }
}
