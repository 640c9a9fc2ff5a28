use log::debug;

use super::{config::Destinations, connection::ConnectionState};
use crate::{
    domain::{
        chat_log::{ChatEvent, MessageLog, Origin},
        error::EngineError,
        session::Session,
        user::User,
        wire::WireMessage,
    },
    transport::Transport,
};

/// Builds outgoing messages and publishes them.
#[derive(Debug, Clone)]
pub struct OutboundDispatcher {
    destinations: Destinations,
}

impl OutboundDispatcher {
    pub fn new(destinations: Destinations) -> Self {
        Self { destinations }
    }

    pub fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    fn publish<T: Transport>(
        transport: &mut T,
        destination: &str,
        msg: &WireMessage,
    ) -> Result<(), EngineError> {
        let body = msg.to_json()?;
        transport.publish(destination, &body)?;
        debug!("Published {:?} to {destination}", msg.kind);
        Ok(())
    }

    fn check_sendable(state: ConnectionState, text: &str) -> Result<(), EngineError> {
        if state != ConnectionState::Connected {
            return Err(EngineError::invalid_intent(format!(
                "cannot send while {state}"
            )));
        }
        if text.trim().is_empty() {
            return Err(EngineError::invalid_intent("message is empty"));
        }
        Ok(())
    }

    pub fn join<T: Transport>(&self, transport: &mut T, user: &User) -> Result<(), EngineError> {
        Self::publish(transport, &self.destinations.join, &WireMessage::join(&user.name))
    }

    pub fn send_room<T: Transport>(
        &self,
        transport: &mut T,
        state: ConnectionState,
        user: &User,
        text: &str,
    ) -> Result<(), EngineError> {
        Self::check_sendable(state, text)?;
        Self::publish(
            transport,
            &self.destinations.send,
            &WireMessage::chat(&user.name, text),
        )
    }

    /// Publishes a private message and echoes it into `log` straight away.
    pub fn send_private<T: Transport>(
        &self,
        transport: &mut T,
        state: ConnectionState,
        session: &Session,
        text: &str,
        log: &mut MessageLog,
    ) -> Result<(), EngineError> {
        Self::check_sendable(state, text)?;
        let Some(peer) = session.selected_peer() else {
            return Err(EngineError::invalid_intent("no peer selected"));
        };

        let sender = &session.user.name;
        Self::publish(
            transport,
            &self.destinations.private_send,
            &WireMessage::private(sender, peer, text),
        )?;
        log.append(ChatEvent::private(sender, peer, text, Origin::LocalEcho));
        Ok(())
    }

    pub fn leave<T: Transport>(&self, transport: &mut T, user: &User) -> Result<(), EngineError> {
        Self::publish(transport, &self.destinations.leave, &WireMessage::leave(&user.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::error::TransportError, test_helpers::RecordingTransport};

    fn dispatcher() -> OutboundDispatcher {
        OutboundDispatcher::new(Destinations::default())
    }

    fn session_with_peer(peer: Option<&str>) -> Session {
        let mut session = Session::new(User::new("alice").unwrap());
        if let Some(peer) = peer {
            session.select_peer(peer).unwrap();
        }
        session
    }

    #[test]
    fn join_carries_username() {
        let mut transport = RecordingTransport::default();
        dispatcher()
            .join(&mut transport, &User::new("alice").unwrap())
            .unwrap();
        let sent = transport.published_to("/app/join");
        let body = &sent[0];
        assert!(body.contains(r#""type":"JOIN""#));
        assert!(body.contains(r#""username":"alice""#));
    }

    #[test]
    fn room_send_requires_connection() {
        let mut transport = RecordingTransport::default();
        let user = User::new("alice").unwrap();
        let err = dispatcher()
            .send_room(&mut transport, ConnectionState::Reconnecting, &user, "hi")
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidIntent { .. }));
        assert!(transport.calls().published.is_empty());
    }

    #[test]
    fn private_send_publishes_then_echoes() {
        let mut transport = RecordingTransport::default();
        let mut log = MessageLog::new();
        dispatcher()
            .send_private(
                &mut transport,
                ConnectionState::Connected,
                &session_with_peer(Some("bob")),
                "psst",
                &mut log,
            )
            .unwrap();

        let sent = transport.published_to("/app/privateMessage");
        let body = &sent[0];
        assert!(body.contains(r#""receiver":"bob""#));
        assert_eq!(log.len(), 1);
        assert!(log.get(0).unwrap().is_local_echo());
    }

    #[test]
    fn failed_publish_leaves_no_echo() {
        let mut transport = RecordingTransport::refusing();
        let mut log = MessageLog::new();
        let err = dispatcher()
            .send_private(
                &mut transport,
                ConnectionState::Connected,
                &session_with_peer(Some("bob")),
                "psst",
                &mut log,
            )
            .unwrap_err();
        assert_eq!(err, EngineError::Transport(TransportError::NotConnected));
        assert!(log.is_empty());
    }

    #[test]
    fn private_send_without_peer() {
        let mut transport = RecordingTransport::default();
        let mut log = MessageLog::new();
        assert!(dispatcher()
            .send_private(
                &mut transport,
                ConnectionState::Connected,
                &session_with_peer(None),
                "psst",
                &mut log,
            )
            .is_err());
        assert!(transport.calls().published.is_empty());
    }
}
