use std::fmt::Display;

/// Identifies one connection attempt. Events tagged with an older id are
/// stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the transport reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake and heart-beat negotiation succeeded.
    Connected { connection: ConnectionId },
    /// The attempt never reached `Connected`.
    ConnectFailed {
        connection: ConnectionId,
        reason: String,
    },
    /// An established link went away.
    ConnectionLost {
        connection: ConnectionId,
        reason: String,
    },
    /// A MESSAGE frame on one of our subscriptions.
    Frame {
        connection: ConnectionId,
        subscription: SubscriptionId,
        destination: String,
        body: String,
    },
}

impl TransportEvent {
    pub fn connection(&self) -> ConnectionId {
        match self {
            TransportEvent::Connected { connection }
            | TransportEvent::ConnectFailed { connection, .. }
            | TransportEvent::ConnectionLost { connection, .. }
            | TransportEvent::Frame { connection, .. } => *connection,
        }
    }
}
