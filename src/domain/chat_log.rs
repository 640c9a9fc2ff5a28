use std::fmt::Display;

use chrono::{DateTime, Utc};

/// What a chat event is. The receiver lives inside `Private`, so a room,
/// join or leave event cannot carry one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    Leave,
    Room,
    Private { receiver: String },
}

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Delivered by the broker.
    Remote,
    /// Inserted locally before the broker confirmed it.
    LocalEcho,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub sender: String,
    pub content: String,
    pub kind: EventKind,
    pub origin: Origin,
    /// Local arrival time. Display only, never used for ordering.
    pub received_at: DateTime<Utc>,
}

impl ChatEvent {
    pub fn join(sender: &str, content: &str) -> Self {
        Self::new(sender, content, EventKind::Join, Origin::Remote)
    }

    pub fn leave(sender: &str, content: &str) -> Self {
        Self::new(sender, content, EventKind::Leave, Origin::Remote)
    }

    pub fn room(sender: &str, content: &str) -> Self {
        Self::new(sender, content, EventKind::Room, Origin::Remote)
    }

    pub fn private(sender: &str, receiver: &str, content: &str, origin: Origin) -> Self {
        Self::new(
            sender,
            content,
            EventKind::Private {
                receiver: receiver.into(),
            },
            origin,
        )
    }

    fn new(sender: &str, content: &str, kind: EventKind, origin: Origin) -> Self {
        ChatEvent {
            sender: sender.into(),
            content: content.into(),
            kind,
            origin,
            received_at: Utc::now(),
        }
    }

    pub fn receiver(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Private { receiver } => Some(receiver),
            EventKind::Join | EventKind::Leave | EventKind::Room => None,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self.kind, EventKind::Private { .. })
    }

    pub fn is_local_echo(&self) -> bool {
        self.origin == Origin::LocalEcho
    }
}

impl Display for ChatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ts = self.received_at.format("%H-%M-%S");
        match &self.kind {
            EventKind::Join | EventKind::Leave => write!(f, "[ {} ] * {}", ts, self.content),
            EventKind::Room => write!(f, "[ {} | {} ]: {}", self.sender, ts, self.content),
            EventKind::Private { receiver } => write!(
                f,
                "[ {} -> {} | {} ]: {}",
                self.sender, receiver, ts, self.content
            ),
        }
    }
}

/// Append-only record of every chat event seen during a session.
///
/// Positions never change once assigned; there is no removal.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    entries: Vec<ChatEvent>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` and returns its position.
    pub fn append(&mut self, event: ChatEvent) -> usize {
        self.entries.push(event);
        self.entries.len() - 1
    }

    /// Every event in append order.
    ///
    /// The iterator borrows the log, so it reflects the log as it stood when
    /// iteration began; it can be cloned to restart from the same point.
    pub fn all(&self) -> std::slice::Iter<'_, ChatEvent> {
        self.entries.iter()
    }

    pub fn get(&self, position: usize) -> Option<&ChatEvent> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
