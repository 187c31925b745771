//! Host-driven API: ChatSession receives commands and discovery/transport events,
//! updates state and the message store, and returns actions for the host to perform.

use crate::codec;
use crate::identity::{PeerId, Role};
use crate::message::{self, Message};
use crate::sequencer::{DeliveryOrder, Sequencer};
use crate::state::SessionState;
use crate::store::MessageStore;

/// Default target language for translation mode.
pub const DEFAULT_TRANSLATION_LANGUAGE: &str = "nl";

/// Connection state of a remote peer as reported by the transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerConnection {
    Connecting,
    Connected,
    NotConnected,
}

/// Inbound events from discovery, transport and translation.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Browsing found an advertiser.
    PeerFound(PeerId),
    /// Browsing lost an advertiser.
    PeerLost(PeerId),
    /// A remote peer's connection state changed.
    PeerStateChanged(PeerId, PeerConnection),
    /// A joiner asked to enter our session.
    InvitationReceived(PeerId),
    /// A connected peer sent a codec payload.
    PayloadReceived { from: PeerId, payload: Vec<u8> },
    /// A translation requested via `Action::Translate` settled.
    TranslationSettled { seq: u64, message: Message },
}

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartAdvertising,
    StartBrowsing,
    /// Stop both advertising and browsing.
    StopDiscovery,
    /// Connect to a discovered host and ask to join.
    Invite(PeerId),
    AcceptInvitation(PeerId),
    /// Send a codec payload reliably to every connected peer.
    Broadcast(Vec<u8>),
    /// Forward a joiner's payload to every other connected peer.
    Relay { from: PeerId, payload: Vec<u8> },
    /// Close all connections and pending invitations.
    TearDown,
    /// Run the translation pipeline, then report `SessionEvent::TranslationSettled`.
    Translate {
        seq: u64,
        message: Message,
        target: String,
    },
}

/// Session coordinator. Sole owner of state, role and the message store.
pub struct ChatSession {
    local: PeerId,
    state: SessionState,
    role: Role,
    host: Option<PeerId>,
    connected: Vec<PeerId>,
    store: MessageStore,
    draft: String,
    translating: bool,
    translation_language: String,
    order: DeliveryOrder,
    sequencer: Sequencer,
}

impl ChatSession {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            state: SessionState::Inactive,
            role: Role::None,
            host: None,
            connected: Vec::new(),
            store: MessageStore::new(),
            draft: String::new(),
            translating: false,
            translation_language: DEFAULT_TRANSLATION_LANGUAGE.to_string(),
            order: DeliveryOrder::default(),
            sequencer: Sequencer::new(),
        }
    }

    pub fn with_delivery_order(mut self, order: DeliveryOrder) -> Self {
        self.order = order;
        self
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Display name stamped on outgoing messages.
    pub fn username(&self) -> &str {
        self.local.name()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Recorded host: the local peer when hosting, the invited advertiser when joining.
    pub fn host_peer(&self) -> Option<&PeerId> {
        self.host.as_ref()
    }

    pub fn connected_peers(&self) -> &[PeerId] {
        &self.connected
    }

    pub fn messages(&self) -> &MessageStore {
        &self.store
    }

    pub fn is_from_local_user(&self, message: &Message) -> bool {
        message.is_from(self.username())
    }

    pub fn is_translating(&self) -> bool {
        self.translating
    }

    pub fn set_translating(&mut self, on: bool) {
        self.translating = on;
    }

    pub fn translation_language(&self) -> &str {
        &self.translation_language
    }

    pub fn set_translation_language(&mut self, code: impl Into<String>) {
        self.translation_language = code.into();
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::info!("session: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    // Commands

    /// Begin advertising and host a session. No-op unless inactive.
    pub fn start_hosting(&mut self) -> Vec<Action> {
        if self.state.is_active() {
            log::debug!("start_hosting ignored in state {}", self.state);
            return vec![];
        }
        self.role = Role::Host;
        self.host = Some(self.local.clone());
        self.transition(SessionState::HostingAwaitingPeers);
        vec![Action::StartAdvertising]
    }

    /// Begin browsing for a host. No-op unless inactive.
    pub fn start_joining(&mut self) -> Vec<Action> {
        if self.state.is_active() {
            log::debug!("start_joining ignored in state {}", self.state);
            return vec![];
        }
        self.transition(SessionState::SearchingForChat);
        vec![Action::StartBrowsing]
    }

    /// Stop discovery, tear down the session and return to Inactive. Safe from any state.
    pub fn disconnect(&mut self) -> Vec<Action> {
        self.host = None;
        self.role = Role::None;
        self.connected.clear();
        self.transition(SessionState::Inactive);
        vec![Action::StopDiscovery, Action::TearDown]
    }

    /// Post `text` locally and broadcast it. Whitespace-only text does nothing.
    pub fn send(&mut self, text: &str) -> Vec<Action> {
        if text.trim().is_empty() {
            return vec![];
        }
        let message = Message::new(self.username(), text, message::timestamp_now());
        let encoded = codec::encode_message(&message);
        self.store.insert(message);
        match encoded {
            Ok(payload) => vec![Action::Broadcast(payload)],
            Err(e) => {
                log::warn!("message not broadcast: {}", e);
                vec![]
            }
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Whether the draft has something worth sending.
    pub fn can_send(&self) -> bool {
        !self.draft.trim().is_empty()
    }

    /// Discard the draft.
    pub fn clear(&mut self) {
        self.draft.clear();
    }

    /// Send the draft; it is cleared only when a message was produced.
    pub fn send_draft(&mut self) -> Vec<Action> {
        if !self.can_send() {
            return vec![];
        }
        let text = std::mem::take(&mut self.draft);
        self.send(&text)
    }

    // Events

    /// Dispatch one inbound event.
    pub fn handle_event(&mut self, event: SessionEvent) -> Vec<Action> {
        match event {
            SessionEvent::PeerFound(peer) => self.on_peer_found(peer),
            SessionEvent::PeerLost(peer) => self.on_peer_lost(&peer),
            SessionEvent::PeerStateChanged(peer, state) => {
                self.on_peer_state_changed(peer, state);
                vec![]
            }
            SessionEvent::InvitationReceived(peer) => self.on_invitation(peer),
            SessionEvent::PayloadReceived { from, payload } => {
                self.on_payload_received(from, &payload)
            }
            SessionEvent::TranslationSettled { seq, message } => {
                self.on_translation_settled(seq, message);
                vec![]
            }
        }
    }

    /// First advertiser found while searching becomes our host.
    pub fn on_peer_found(&mut self, peer: PeerId) -> Vec<Action> {
        if self.state != SessionState::SearchingForChat {
            return vec![];
        }
        log::info!("found host {}; inviting", peer);
        self.role = Role::Joiner;
        self.host = Some(peer.clone());
        self.transition(SessionState::ConnectedToHost);
        vec![Action::Invite(peer)]
    }

    /// Losing the recorded host ends the session.
    pub fn on_peer_lost(&mut self, peer: &PeerId) -> Vec<Action> {
        if self.host.as_ref() != Some(peer) {
            return vec![];
        }
        log::info!("lost host {}", peer);
        self.disconnect()
    }

    pub fn on_peer_state_changed(&mut self, peer: PeerId, state: PeerConnection) {
        if peer == self.local {
            return;
        }
        match state {
            PeerConnection::Connecting => return,
            PeerConnection::Connected => {
                if !self.connected.contains(&peer) {
                    self.connected.push(peer);
                }
            }
            PeerConnection::NotConnected => self.connected.retain(|p| *p != peer),
        }
        if self.role != Role::Host {
            return;
        }
        if self.connected.is_empty() {
            self.transition(SessionState::HostingAwaitingPeers);
        } else {
            self.transition(SessionState::HostingWithPeers);
        }
    }

    /// Invitations are accepted while hosting and dropped otherwise.
    pub fn on_invitation(&mut self, peer: PeerId) -> Vec<Action> {
        if self.role != Role::Host {
            log::debug!("dropping invitation from {} in state {}", peer, self.state);
            return vec![];
        }
        log::info!("accepting invitation from {}", peer);
        self.transition(SessionState::HostingWithPeers);
        vec![Action::AcceptInvitation(peer)]
    }

    /// Decode a payload and route it to the store, possibly through translation.
    pub fn on_payload_received(&mut self, from: PeerId, payload: &[u8]) -> Vec<Action> {
        let message = match codec::decode_message(payload) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("dropping payload from {}: {}", from, e);
                return vec![];
            }
        };
        let mut actions = Vec::new();
        if self.role == Role::Host && self.connected.iter().any(|p| *p != from) {
            actions.push(Action::Relay {
                from,
                payload: payload.to_vec(),
            });
        }
        let seq = self.sequencer.assign();
        if self.translating {
            actions.push(Action::Translate {
                seq,
                message,
                target: self.translation_language.clone(),
            });
        } else {
            self.on_translation_settled(seq, message);
        }
        actions
    }

    /// Insert a settled message (translated or not).
    pub fn on_translation_settled(&mut self, seq: u64, message: Message) {
        match self.order {
            DeliveryOrder::Settled => self.store.insert(message),
            DeliveryOrder::Arrival => {
                for m in self.sequencer.settle(seq, message) {
                    self.store.insert(m);
                }
            }
        }
    }
}
