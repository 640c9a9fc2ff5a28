//! Broker connection boundary.
//!
//! Transports never block the engine: every call only queues work for an
//! I/O task, and outcomes come back as [`TransportEvent`]s on the engine's
//! event channel.

pub mod stomp;
pub mod websocket;

use std::time::Duration;

use crate::domain::{
    error::TransportError,
    events::{ConnectionId, SubscriptionId},
};

pub use crate::domain::events::TransportEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Wait between a lost link and the next attempt.
    pub reconnect_delay: Duration,
    pub heartbeat_incoming: Duration,
    pub heartbeat_outgoing: Duration,
    /// Bound on one CONNECT/CONNECTED handshake.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            reconnect_delay: Duration::from_millis(500),
            heartbeat_incoming: Duration::from_millis(10_000),
            heartbeat_outgoing: Duration::from_millis(10_000),
            connect_timeout: Duration::from_millis(10_000),
        }
    }
}

impl ConnectOptions {
    pub fn heartbeat(&self) -> stomp::HeartbeatConfig {
        stomp::HeartbeatConfig {
            outgoing: self.heartbeat_outgoing,
            incoming: self.heartbeat_incoming,
        }
    }
}

pub trait Transport {
    /// Starts a connection attempt, replacing any previous link.
    fn connect(&mut self, url: &str, options: &ConnectOptions) -> ConnectionId;

    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, TransportError>;

    fn publish(&mut self, destination: &str, body: &str) -> Result<(), TransportError>;

    /// Releases the link. Safe to call when nothing is connected.
    fn disconnect(&mut self);
}
