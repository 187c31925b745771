//! Session state as shown to the front end.

use std::fmt::Display;

/// Current session state. Owned by the session; the front end only reads it.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum SessionState {
    #[default]
    Inactive,
    SearchingForChat,
    ConnectedToHost,
    HostingAwaitingPeers,
    HostingWithPeers,
}

impl SessionState {
    /// Label for the title bar / prompt.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Inactive => "Inactive",
            SessionState::SearchingForChat => "Searching for Chat",
            SessionState::ConnectedToHost => "Connected to Host",
            SessionState::HostingAwaitingPeers => "Waiting for Peers",
            SessionState::HostingWithPeers => "Hosting Chat",
        }
    }

    /// True when there is someone to talk to.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::ConnectedToHost | SessionState::HostingWithPeers
        )
    }

    pub fn is_active(&self) -> bool {
        *self != SessionState::Inactive
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
