use super::{conversation::ActiveView, error::EngineError, user::User};

/// One logged-in user. Created at join, dropped at logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub active_view: ActiveView,
}

impl Session {
    pub fn new(user: User) -> Self {
        Session {
            user,
            active_view: ActiveView::Room,
        }
    }

    pub fn select_peer(&mut self, peer: &str) -> Result<(), EngineError> {
        let peer = peer.trim();
        if peer.is_empty() {
            return Err(EngineError::invalid_intent("peer name must not be blank"));
        }
        if self.user.is(peer) {
            return Err(EngineError::invalid_intent("cannot open a private thread with yourself"));
        }
        self.active_view = ActiveView::PrivateWith(peer.into());
        Ok(())
    }

    pub fn select_room(&mut self) {
        self.active_view = ActiveView::Room;
    }

    pub fn selected_peer(&self) -> Option<&str> {
        self.active_view.peer()
    }
}
