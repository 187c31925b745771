//! Coordinator: the single task that owns the chat session, discovery and transport.
//!
//! Commands from the front end, discovery and transport events, and translation
//! completions all arrive on one channel and are applied one at a time. Translation
//! calls run on their own tasks and report back through the same channel.

use std::net::SocketAddr;
use std::sync::Arc;

use crosstalk_core::{
    Action, ChatSession, Message, PeerId, SessionEvent, SessionState, TranslationClient,
    TranslationPipeline,
};
use tokio::sync::{mpsc, watch};

use crate::discovery::Discovery;
use crate::transport::Transport;

/// Front-end commands.
#[derive(Debug, Clone)]
pub enum Command {
    StartHosting,
    StartJoining,
    Disconnect,
    Send(String),
    SetDraft(String),
    Clear,
    SendDraft,
    SetTranslating(bool),
    SetTranslationLanguage(String),
}

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub enum Inbound {
    Command(Command),
    /// Leave the session and stop the coordinator.
    Shutdown,
    /// Browsing saw an advertiser at `addr`.
    Discovered { peer: PeerId, addr: SocketAddr },
    Session(SessionEvent),
}

pub type InboundTx = mpsc::UnboundedSender<Inbound>;

/// Collaborator-facing handle: commands in, observable state and messages out.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: InboundTx,
    state: watch::Receiver<SessionState>,
    messages: watch::Receiver<Vec<Message>>,
    draft: watch::Receiver<String>,
}

impl CoordinatorHandle {
    fn command(&self, c: Command) {
        if self.tx.send(Inbound::Command(c)).is_err() {
            log::warn!("coordinator stopped; command dropped");
        }
    }

    pub fn start_hosting(&self) {
        self.command(Command::StartHosting);
    }

    pub fn start_joining(&self) {
        self.command(Command::StartJoining);
    }

    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    pub fn send(&self, text: impl Into<String>) {
        self.command(Command::Send(text.into()));
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.command(Command::SetDraft(text.into()));
    }

    pub fn clear(&self) {
        self.command(Command::Clear);
    }

    pub fn send_draft(&self) {
        self.command(Command::SendDraft);
    }

    pub fn set_translating(&self, on: bool) {
        self.command(Command::SetTranslating(on));
    }

    pub fn set_translation_language(&self, code: impl Into<String>) {
        self.command(Command::SetTranslationLanguage(code.into()));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Inbound::Shutdown);
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Messages, newest first.
    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages.clone()
    }

    pub fn draft(&self) -> watch::Receiver<String> {
        self.draft.clone()
    }
}

pub struct Coordinator<C> {
    session: ChatSession,
    discovery: Discovery,
    transport: Transport,
    pipeline: Arc<TranslationPipeline<C>>,
    tx: InboundTx,
    rx: mpsc::UnboundedReceiver<Inbound>,
    state_tx: watch::Sender<SessionState>,
    messages_tx: watch::Sender<Vec<Message>>,
    draft_tx: watch::Sender<String>,
}

/// Ports the coordinator binds.
#[derive(Debug, Clone, Copy)]
pub struct Ports {
    pub discovery: u16,
    pub transport: u16,
}

impl<C: TranslationClient + 'static> Coordinator<C> {
    pub fn new(session: ChatSession, ports: Ports, client: C) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let local = session.local_peer().clone();
        let (state_tx, state) = watch::channel(session.state());
        let (messages_tx, messages) = watch::channel(session.messages().snapshot());
        let (draft_tx, draft) = watch::channel(session.draft().to_string());
        let handle = CoordinatorHandle {
            tx: tx.clone(),
            state,
            messages,
            draft,
        };
        let coordinator = Self {
            discovery: Discovery::new(local.clone(), ports.discovery, ports.transport, tx.clone()),
            transport: Transport::new(local, ports.transport, tx.clone()),
            session,
            pipeline: Arc::new(TranslationPipeline::new(client)),
            tx,
            rx,
            state_tx,
            messages_tx,
            draft_tx,
        };
        (coordinator, handle)
    }

    /// Process inbound work until shutdown, then leave the session.
    pub async fn run(mut self) {
        while let Some(inbound) = self.rx.recv().await {
            if matches!(inbound, Inbound::Shutdown) {
                break;
            }
            let actions = self.dispatch(inbound);
            self.apply(actions).await;
            self.publish();
        }
        let actions = self.session.disconnect();
        self.apply(actions).await;
        self.publish();
    }

    fn dispatch(&mut self, inbound: Inbound) -> Vec<Action> {
        match inbound {
            Inbound::Command(c) => self.on_command(c),
            Inbound::Discovered { peer, addr } => {
                self.transport.remember(peer.clone(), addr);
                self.session.handle_event(SessionEvent::PeerFound(peer))
            }
            Inbound::Session(event) => self.session.handle_event(event),
            Inbound::Shutdown => vec![],
        }
    }

    fn on_command(&mut self, c: Command) -> Vec<Action> {
        match c {
            Command::StartHosting => self.session.start_hosting(),
            Command::StartJoining => self.session.start_joining(),
            Command::Disconnect => self.session.disconnect(),
            Command::Send(text) => self.session.send(&text),
            Command::SetDraft(text) => {
                self.session.set_draft(text);
                vec![]
            }
            Command::Clear => {
                self.session.clear();
                vec![]
            }
            Command::SendDraft => self.session.send_draft(),
            Command::SetTranslating(on) => {
                log::info!("translation mode {}", if on { "on" } else { "off" });
                self.session.set_translating(on);
                vec![]
            }
            Command::SetTranslationLanguage(code) => {
                log::info!("translating into {}", code);
                self.session.set_translation_language(code);
                vec![]
            }
        }
    }

    async fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::StartAdvertising => {
                    if let Err(e) = self.transport.listen().await {
                        log::warn!("cannot accept invitations: {}", e);
                    }
                    if let Err(e) = self.discovery.advertise().await {
                        log::warn!("cannot advertise: {}", e);
                    }
                }
                Action::StartBrowsing => {
                    if let Err(e) = self.discovery.browse().await {
                        log::warn!("cannot browse: {}", e);
                    }
                }
                Action::StopDiscovery => self.discovery.stop().await,
                Action::Invite(peer) => self.transport.invite(peer),
                Action::AcceptInvitation(peer) => self.transport.accept(peer).await,
                Action::Broadcast(payload) => self.transport.broadcast(payload).await,
                Action::Relay { from, payload } => self.transport.relay(&from, payload).await,
                Action::TearDown => self.transport.teardown().await,
                Action::Translate {
                    seq,
                    message,
                    target,
                } => {
                    let pipeline = self.pipeline.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let message = pipeline.translate(&message, &target).await;
                        let _ = tx.send(Inbound::Session(SessionEvent::TranslationSettled {
                            seq,
                            message,
                        }));
                    });
                }
            }
        }
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|s| {
            let next = self.session.state();
            let changed = *s != next;
            *s = next;
            changed
        });
        self.messages_tx.send_if_modified(|m| {
            let store = self.session.messages();
            let changed = m.len() != store.len() || m.first() != store.latest();
            if changed {
                *m = store.snapshot();
            }
            changed
        });
        self.draft_tx.send_if_modified(|d| {
            let changed = d.as_str() != self.session.draft();
            if changed {
                *d = self.session.draft().to_string();
            }
            changed
        });
    }
}
