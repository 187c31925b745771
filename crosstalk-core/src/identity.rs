//! Peer identity and the local role in a session.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Peer identity: display name plus a per-process random id.
/// Two devices with the same name stay distinct; the name is what users see.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PeerId {
    name: String,
    id: Uuid,
}

impl PeerId {
    /// Create a fresh identity for this process.
    pub fn generate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Role of the local peer in the current session.
/// Set once by start_hosting or the join invite; cleared only by disconnect.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Role {
    #[default]
    None,
    Host,
    Joiner,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_distinct_identity() {
        let a = PeerId::generate("iPad");
        let b = PeerId::generate("iPad");
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
        assert_eq!(a, a.clone());
    }
}
