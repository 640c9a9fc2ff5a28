use std::fmt::Display;

use super::chat_log::{ChatEvent, EventKind, MessageLog};

/// Which conversation the presentation is showing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ActiveView {
    #[default]
    Room,
    PrivateWith(String),
}

impl ActiveView {
    pub fn peer(&self) -> Option<&str> {
        match self {
            ActiveView::Room => None,
            ActiveView::PrivateWith(peer) => Some(peer),
        }
    }

    /// Whether `event` belongs to this view when seen by `local_user`.
    pub fn shows(&self, event: &ChatEvent, local_user: &str) -> bool {
        match (self, &event.kind) {
            (ActiveView::Room, EventKind::Join | EventKind::Leave | EventKind::Room) => true,
            (ActiveView::Room, EventKind::Private { .. }) => false,
            (ActiveView::PrivateWith(peer), EventKind::Private { receiver }) => {
                is_pair(&event.sender, receiver, local_user, peer)
            }
            (ActiveView::PrivateWith(_), EventKind::Join | EventKind::Leave | EventKind::Room) => {
                false
            }
        }
    }
}

impl Display for ActiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveView::Room => write!(f, "room"),
            ActiveView::PrivateWith(peer) => write!(f, "private with {peer}"),
        }
    }
}

// unordered pair equality
fn is_pair(sender: &str, receiver: &str, a: &str, b: &str) -> bool {
    (sender == a && receiver == b) || (sender == b && receiver == a)
}

/// Events of `log` visible in `view`, in log order.
pub fn route<'a>(
    log: &'a MessageLog,
    view: &'a ActiveView,
    local_user: &'a str,
) -> impl Iterator<Item = &'a ChatEvent> + 'a {
    log.all().filter(move |event| view.shows(event, local_user))
}

/// Whether the local user sent `event`.
pub fn is_own(event: &ChatEvent, local_user: &str) -> bool {
    event.sender == local_user
}
