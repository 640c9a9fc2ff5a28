//! Connection lifecycle.
//!
//! Pure state machine: it decides what should happen next and the engine
//! carries it out against the transport.

use std::{fmt::Display, time::Duration};

use log::info;

use crate::domain::events::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// What the engine should do after a failed or lost link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    After(Duration),
    GiveUp { attempts: u32 },
}

#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    current: Option<ConnectionId>,
    failed_attempts: u32,
    max_attempts: u32,
    reconnect_delay: Duration,
    closed: bool,
}

impl ConnectionManager {
    pub fn new(max_attempts: u32, reconnect_delay: Duration) -> Self {
        ConnectionManager {
            state: ConnectionState::Disconnected,
            current: None,
            failed_attempts: 0,
            max_attempts: max_attempts.max(1),
            reconnect_delay,
            closed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_current(&self, connection: ConnectionId) -> bool {
        self.current == Some(connection)
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("Connection {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Returns true if a connection attempt should start now.
    pub fn begin(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                self.transition(ConnectionState::Connecting);
                true
            }
            _ => false,
        }
    }

    /// Records the id the transport assigned to the attempt just started.
    pub fn attach(&mut self, connection: ConnectionId) {
        self.current = Some(connection);
    }

    /// Returns true if `connection` is the attempt we were waiting on.
    pub fn on_connected(&mut self, connection: ConnectionId) -> bool {
        if !self.is_current(connection) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.failed_attempts = 0;
        self.transition(ConnectionState::Connected);
        true
    }

    pub fn on_connect_failed(&mut self, connection: ConnectionId) -> Option<Retry> {
        if !self.is_current(connection) || self.state != ConnectionState::Connecting {
            return None;
        }
        self.failed_attempts += 1;
        if self.failed_attempts >= self.max_attempts {
            self.current = None;
            self.transition(ConnectionState::Disconnected);
            return Some(Retry::GiveUp {
                attempts: self.failed_attempts,
            });
        }
        self.transition(ConnectionState::Reconnecting);
        Some(Retry::After(self.reconnect_delay))
    }

    pub fn on_lost(&mut self, connection: ConnectionId) -> Option<Retry> {
        if !self.is_current(connection) || self.state != ConnectionState::Connected {
            return None;
        }
        self.transition(ConnectionState::Reconnecting);
        Some(Retry::After(self.reconnect_delay))
    }

    /// Starts teardown. Returns the state it was torn down from, or `None`
    /// if teardown already happened. No attempt starts after this.
    pub fn begin_teardown(&mut self) -> Option<ConnectionState> {
        if self.closed {
            return None;
        }
        self.closed = true;
        let previous = self.state;
        self.transition(ConnectionState::Disconnecting);
        Some(previous)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn finish_teardown(&mut self) {
        self.current = None;
        self.transition(ConnectionState::Disconnected);
    }
}
