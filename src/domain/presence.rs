use std::collections::BTreeSet;

use super::{error::EngineError, wire::decode_roster};

/// Who is online, as of the last roster snapshot.
///
/// Snapshots replace the set wholesale. A snapshot that fails to decode
/// leaves the previous set untouched.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    occupants: BTreeSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_users(&self) -> &BTreeSet<String> {
        &self.occupants
    }

    /// Online users other than `local`.
    pub fn peers<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.occupants.iter().filter(move |name| name.as_str() != local)
    }

    pub fn is_online(&self, name: &str) -> bool {
        self.occupants.contains(name)
    }

    pub fn apply_snapshot(&mut self, body: &str, destination: &str) -> Result<(), EngineError> {
        let names = decode_roster(body, destination)?;
        self.replace(names);
        Ok(())
    }

    pub fn replace(&mut self, names: impl IntoIterator<Item = String>) {
        self.occupants = names.into_iter().collect();
    }

    pub fn clear(&mut self) {
        self.occupants.clear();
    }
}
