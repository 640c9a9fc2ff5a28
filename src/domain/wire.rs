//! JSON bodies carried in STOMP frames.

use serde::{Deserialize, Serialize};

use super::{
    chat_log::{ChatEvent, Origin},
    error::{EngineError, TransportError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireKind {
    Join,
    Leave,
    Chat,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: WireKind,
    /// Read by the broker's join and leave endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// The subscribed channel a frame arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Room,
    Presence,
    Private,
}

impl WireMessage {
    pub fn join(name: &str) -> Self {
        WireMessage {
            sender: name.into(),
            receiver: None,
            content: String::new(),
            kind: WireKind::Join,
            username: Some(name.into()),
        }
    }

    pub fn leave(name: &str) -> Self {
        WireMessage {
            sender: name.into(),
            receiver: None,
            content: String::new(),
            kind: WireKind::Leave,
            username: Some(name.into()),
        }
    }

    pub fn chat(sender: &str, content: &str) -> Self {
        WireMessage {
            sender: sender.into(),
            receiver: None,
            content: content.into(),
            kind: WireKind::Chat,
            username: None,
        }
    }

    pub fn private(sender: &str, receiver: &str, content: &str) -> Self {
        WireMessage {
            sender: sender.into(),
            receiver: Some(receiver.into()),
            content: content.into(),
            kind: WireKind::Private,
            username: None,
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(|e| {
            EngineError::from(TransportError::Protocol {
                reason: e.to_string(),
            })
        })
    }

    /// Checks the message against the channel it arrived on and turns it
    /// into a log event.
    pub fn into_event(self, channel: Channel, destination: &str) -> Result<ChatEvent, EngineError> {
        if self.sender.is_empty() {
            return Err(EngineError::malformed(destination, "empty sender"));
        }

        // Presence notices are about `username` when the broker names one.
        let subject = self
            .username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.sender);

        match (channel, self.kind, self.receiver) {
            (Channel::Room, WireKind::Join, None) => Ok(ChatEvent::join(subject, &self.content)),
            (Channel::Room, WireKind::Leave, None) => Ok(ChatEvent::leave(subject, &self.content)),
            (Channel::Room, WireKind::Chat, None) => Ok(ChatEvent::room(&self.sender, &self.content)),
            (Channel::Private, WireKind::Private, Some(receiver)) if !receiver.is_empty() => Ok(
                ChatEvent::private(&self.sender, &receiver, &self.content, Origin::Remote),
            ),
            (Channel::Private, WireKind::Private, _) => Err(EngineError::malformed(
                destination,
                "private message without receiver",
            )),
            (Channel::Room, kind, Some(_)) if kind != WireKind::Private => Err(
                EngineError::malformed(destination, format!("{kind:?} message carries a receiver")),
            ),
            (channel, kind, _) => Err(EngineError::malformed(
                destination,
                format!("{kind:?} message not accepted on {channel:?} channel"),
            )),
        }
    }
}

/// Decodes a chat frame body.
pub fn decode_message(body: &str, destination: &str) -> Result<WireMessage, EngineError> {
    serde_json::from_str::<WireMessage>(body).map_err(|e| EngineError::malformed(destination, e.to_string()))
}

/// Decodes a presence snapshot. Any bad entry rejects the whole list.
pub fn decode_roster(body: &str, destination: &str) -> Result<Vec<String>, EngineError> {
    let names = serde_json::from_str::<Vec<String>>(body)
        .map_err(|e| EngineError::malformed(destination, e.to_string()))?;

    if names.iter().any(|name| name.trim().is_empty()) {
        return Err(EngineError::malformed(destination, "blank name in roster"));
    }

    Ok(names)
}
