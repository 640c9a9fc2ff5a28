//! Engine error types.

use thiserror::Error;

/// Errors surfaced by the session engine. None of these are fatal to the
/// host process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Handshake or heartbeat failure.
    #[error("connection error: {reason}")]
    Connection {
        /// Description of the failure.
        reason: String,
    },

    /// Undecodable or schema-violating inbound payload.
    #[error("malformed frame on {destination}: {reason}")]
    MalformedFrame {
        /// Destination the frame arrived on.
        destination: String,
        /// What was wrong with it.
        reason: String,
    },

    /// User action attempted in a state that does not allow it.
    #[error("invalid intent: {reason}")]
    InvalidIntent {
        /// Why the intent was rejected.
        reason: String,
    },

    /// The transport could not carry out a request.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl EngineError {
    pub(crate) fn invalid_intent(reason: impl Into<String>) -> Self {
        Self::InvalidIntent {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(destination: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            destination: destination.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No live connection to carry the request.
    #[error("transport is not connected")]
    NotConnected,

    /// The I/O task has exited and dropped its command channel.
    #[error("transport channel closed")]
    ChannelClosed,

    /// The broker rejected or failed the STOMP handshake.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Description of the failure.
        reason: String,
    },

    /// A frame could not be decoded.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Description of the failure.
        reason: String,
    },
}
