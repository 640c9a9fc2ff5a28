/// User intents forwarded from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    SelectPeer(String),
    SelectRoom,
    SendRoom(String),
    SendPrivate(String),
    Logout,
}

impl Command {
    /// Parses one line typed into the terminal front end.
    ///
    /// `/pm <peer>` selects a peer, `/room` returns to the room and `/quit`
    /// logs out. Anything else is text for the current view, so
    /// `is_private_view` decides between room and private sends.
    pub fn from_line(line: &str, is_private_view: bool) -> Option<Self> {
        let trimmed = line.trim();
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        match parts.next() {
            Some("/pm") => parts
                .next()
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(|peer| Command::SelectPeer(peer.into())),
            Some("/room") => Some(Command::SelectRoom),
            Some("/quit") => Some(Command::Logout),
            Some(cmd) if cmd.starts_with('/') => None,
            _ if is_private_view => Some(Command::SendPrivate(line.into())),
            _ => Some(Command::SendRoom(line.into())),
        }
    }
}
