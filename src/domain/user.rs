use std::fmt::Display;

use super::error::EngineError;

/// A non-empty, trimmed display name. Immutable once the session exists.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct User {
    pub name: String,
}

impl User {
    pub fn new(name: &str) -> Result<Self, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidIntent {
                reason: "display name must not be blank".into(),
            });
        }

        Ok(User { name: name.into() })
    }

    pub fn is(&self, other: &str) -> bool {
        self.name == other
    }
}

impl Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
