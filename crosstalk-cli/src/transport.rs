//! Session transport: TCP listener while hosting, outbound connection when joining,
//! invite/accept handshake, then length-prefixed frames in both directions.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crosstalk_core::wire::{self, encode_frame, FrameDecodeError, LEN_SIZE};
use crosstalk_core::{Frame, PeerConnection, PeerId, SessionEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};

use crate::coordinator::{Inbound, InboundTx};

/// How long an invitation may take, from connect to accept. Unanswered invitations
/// are dropped after the same delay.
const INVITATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Connected peer: writer queue plus the reader task.
struct Link {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

impl Link {
    /// Stop reading; the writer drains what is queued, then closes its half.
    fn close(self) {
        self.reader.abort();
    }
}

type Links = Arc<Mutex<HashMap<PeerId, Link>>>;
type Pending = Arc<Mutex<HashMap<PeerId, Invitation>>>;

/// Joiner connection that sent a valid invite and waits for an answer.
struct Invitation {
    ticket: u64,
    stream: TcpStream,
}

struct Listener {
    task: JoinHandle<()>,
    addr: SocketAddr,
}

/// Owned by the coordinator; the only holder of session connections.
pub struct Transport {
    local: PeerId,
    port: u16,
    events: InboundTx,
    links: Links,
    pending: Pending,
    /// Bumped on teardown; handshakes from an older listener are discarded.
    epoch: Arc<AtomicU64>,
    invitation_timeout: Duration,
    addresses: HashMap<PeerId, SocketAddr>,
    listener: Option<Listener>,
    connecting: Vec<JoinHandle<()>>,
}

impl Transport {
    pub fn new(local: PeerId, port: u16, events: InboundTx) -> Self {
        Self {
            local,
            port,
            events,
            links: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            epoch: Arc::new(AtomicU64::new(0)),
            invitation_timeout: INVITATION_TIMEOUT,
            addresses: HashMap::new(),
            listener: None,
            connecting: Vec::new(),
        }
    }

    /// Remember where a discovered host accepts connections.
    pub fn remember(&mut self, peer: PeerId, addr: SocketAddr) {
        self.addresses.insert(peer, addr);
    }

    /// Accept incoming invitations; returns the bound address. No-op if already listening.
    pub async fn listen(&mut self) -> std::io::Result<SocketAddr> {
        if let Some(l) = &self.listener {
            return Ok(l.addr);
        }
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port)).await?;
        let addr = listener.local_addr()?;
        log::info!("listening for invitations on {}", addr);
        let gate = Gate {
            epoch: self.epoch.clone(),
            at: self.epoch.load(Ordering::SeqCst),
            pending: self.pending.clone(),
            events: self.events.clone(),
            timeout: self.invitation_timeout,
        };
        let task = tokio::spawn(accept_loop(listener, gate));
        self.listener = Some(Listener { task, addr });
        Ok(addr)
    }

    /// Accept a pending invitation and bring the link up.
    pub async fn accept(&mut self, peer: PeerId) {
        let Some(Invitation { mut stream, .. }) = self.pending.lock().await.remove(&peer) else {
            log::debug!("no pending invitation from {}", peer);
            return;
        };
        let reply = Frame::Accept {
            peer: self.local.clone(),
        };
        if let Err(e) = write_frame(&mut stream, &reply).await {
            log::warn!("accepting {} failed: {}", peer, e);
            self.notify(peer, PeerConnection::NotConnected);
            return;
        }
        start_link(stream, peer, self.links.clone(), self.events.clone()).await;
    }

    /// Connect to a discovered host and ask to join. Failures leave the peer unconnected.
    pub fn invite(&mut self, peer: PeerId) {
        let Some(addr) = self.addresses.get(&peer).copied() else {
            log::warn!("no address for {}", peer);
            return;
        };
        self.connecting.retain(|t| !t.is_finished());
        let local = self.local.clone();
        let links = self.links.clone();
        let events = self.events.clone();
        let timeout = self.invitation_timeout;
        self.notify(peer.clone(), PeerConnection::Connecting);
        self.connecting.push(tokio::spawn(async move {
            match tokio::time::timeout(timeout, connect_and_invite(addr, local)).await {
                Ok(Ok(stream)) => start_link(stream, peer, links, events).await,
                Ok(Err(e)) => log::warn!("invitation to {} failed: {}", peer, e),
                Err(_) => log::warn!("invitation to {} timed out", peer),
            }
        }));
    }

    /// Send a message payload to every connected peer.
    pub async fn broadcast(&self, payload: Vec<u8>) {
        self.send_all(payload, None).await;
    }

    /// Forward a payload to every connected peer except its origin.
    pub async fn relay(&self, from: &PeerId, payload: Vec<u8>) {
        self.send_all(payload, Some(from)).await;
    }

    async fn send_all(&self, payload: Vec<u8>, except: Option<&PeerId>) {
        let frame = match encode_frame(&Frame::Payload { data: payload }) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("payload not framed: {}", e);
                return;
            }
        };
        let links = self.links.lock().await;
        if links.is_empty() {
            log::debug!("no connected peers; message stays local");
        }
        for (peer, link) in links.iter() {
            if Some(peer) == except {
                continue;
            }
            if link.tx.send(frame.clone()).is_err() {
                log::warn!("send to {} failed: link closed", peer);
            }
        }
    }

    /// Say goodbye to every peer and drop all links, pending invitations and the listener.
    pub async fn teardown(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(l) = self.listener.take() {
            l.task.abort();
        }
        for t in self.connecting.drain(..) {
            t.abort();
        }
        self.pending.lock().await.clear();
        let leave = encode_frame(&Frame::Leave {
            peer: self.local.clone(),
        });
        let links: Vec<(PeerId, Link)> = self.links.lock().await.drain().collect();
        for (peer, link) in links {
            if let Ok(frame) = &leave {
                let _ = link.tx.send(frame.clone());
            }
            link.close();
            log::debug!("closed link to {}", peer);
        }
    }

    fn notify(&self, peer: PeerId, state: PeerConnection) {
        let _ = self
            .events
            .send(Inbound::Session(SessionEvent::PeerStateChanged(peer, state)));
    }
}

#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameDecodeError),
    #[error("incompatible service or protocol version")]
    Incompatible,
    #[error("unexpected frame during handshake")]
    Unexpected,
}

/// What a handshake task needs to hand a valid invitation to the coordinator.
#[derive(Clone)]
struct Gate {
    epoch: Arc<AtomicU64>,
    /// Epoch when the listener started.
    at: u64,
    pending: Pending,
    events: InboundTx,
    timeout: Duration,
}

async fn accept_loop(listener: TcpListener, gate: Gate) {
    // Aborting this task drops the set, which aborts handshakes still in flight.
    let mut handshakes = JoinSet::new();
    let mut ticket = 0u64;
    loop {
        tokio::select! {
            r = listener.accept() => match r {
                Ok((stream, from)) => {
                    ticket += 1;
                    handshakes.spawn(handshake(stream, from, ticket, gate.clone()));
                }
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    break;
                }
            },
            Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
        }
    }
}

/// Read the invite, park the stream as pending, and drop it if nobody answers in time.
async fn handshake(stream: TcpStream, from: SocketAddr, ticket: u64, gate: Gate) {
    let peer = match tokio::time::timeout(gate.timeout, read_invite(stream)).await {
        Ok(Ok((peer, stream))) => {
            let mut pending = gate.pending.lock().await;
            if gate.epoch.load(Ordering::SeqCst) != gate.at {
                log::debug!("discarding invitation from {}: session closed", peer);
                return;
            }
            pending.insert(peer.clone(), Invitation { ticket, stream });
            peer
        }
        Ok(Err(e)) => {
            log::debug!("rejected connection from {}: {}", from, e);
            return;
        }
        Err(_) => {
            log::debug!("invitation from {} timed out", from);
            return;
        }
    };
    let _ = gate
        .events
        .send(Inbound::Session(SessionEvent::InvitationReceived(peer.clone())));
    tokio::time::sleep(gate.timeout).await;
    let mut pending = gate.pending.lock().await;
    if pending.get(&peer).is_some_and(|i| i.ticket == ticket) {
        pending.remove(&peer);
        log::debug!("invitation from {} expired", peer);
    }
}

async fn read_invite(mut stream: TcpStream) -> Result<(PeerId, TcpStream), HandshakeError> {
    match read_frame(&mut stream).await? {
        Frame::Invite {
            protocol_version,
            service,
            peer,
        } => {
            if !Frame::is_compatible(protocol_version, &service) {
                return Err(HandshakeError::Incompatible);
            }
            Ok((peer, stream))
        }
        _ => Err(HandshakeError::Unexpected),
    }
}

async fn connect_and_invite(addr: SocketAddr, local: PeerId) -> Result<TcpStream, HandshakeError> {
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(&mut stream, &Frame::invite(local)).await?;
    match read_frame(&mut stream).await? {
        Frame::Accept { .. } => Ok(stream),
        _ => Err(HandshakeError::Unexpected),
    }
}

async fn write_frame<W: AsyncWriteExt + Unpin>(w: &mut W, frame: &Frame) -> std::io::Result<()> {
    let bytes =
        encode_frame(frame).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    w.write_all(&bytes).await?;
    w.flush().await
}

async fn read_frame<R: AsyncReadExt + Unpin>(r: &mut R) -> Result<Frame, HandshakeError> {
    let mut len_buf = [0u8; LEN_SIZE];
    r.read_exact(&mut len_buf).await?;
    let len = wire::frame_len(len_buf)?;
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;
    Ok(wire::decode_body(&body)?)
}

/// Register the link, report it connected, and serve it until it closes.
async fn start_link(stream: TcpStream, peer: PeerId, links: Links, events: InboundTx) {
    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                log::warn!("write to {} failed: {}", writer_peer, e);
                break;
            }
            let _ = writer.flush().await;
        }
    });
    // Hold the map while spawning so the reader cannot deregister before we register.
    let mut guard = links.lock().await;
    let read_task = tokio::spawn(read_loop(reader, peer.clone(), links.clone(), events.clone()));
    if let Some(old) = guard.insert(
        peer.clone(),
        Link {
            tx,
            reader: read_task,
        },
    ) {
        old.close();
    }
    drop(guard);
    log::info!("connected to {}", peer);
    let _ = events.send(Inbound::Session(SessionEvent::PeerStateChanged(
        peer,
        PeerConnection::Connected,
    )));
}

async fn read_loop(mut reader: OwnedReadHalf, peer: PeerId, links: Links, events: InboundTx) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Frame::Payload { data }) => {
                let _ = events.send(Inbound::Session(SessionEvent::PayloadReceived {
                    from: peer.clone(),
                    payload: data,
                }));
            }
            Ok(Frame::Leave { .. }) => {
                log::info!("{} left", peer);
                break;
            }
            Ok(other) => log::debug!("ignoring {:?} from {}", other, peer),
            Err(e) => {
                log::debug!("link to {} closed: {}", peer, e);
                break;
            }
        }
    }
    links.lock().await.remove(&peer);
    let _ = events.send(Inbound::Session(SessionEvent::PeerStateChanged(
        peer,
        PeerConnection::NotConnected,
    )));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosstalk_core::{PROTOCOL_VERSION, SERVICE_TYPE};

    type Events = mpsc::UnboundedReceiver<Inbound>;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(300);

    async fn hosting() -> (Transport, Events, SocketAddr) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut host = Transport::new(PeerId::generate("host"), 0, tx);
        let bound = host.listen().await.unwrap();
        (host, rx, SocketAddr::from((Ipv4Addr::LOCALHOST, bound.port())))
    }

    async fn next(rx: &mut Events) -> SessionEvent {
        match tokio::time::timeout(WAIT, rx.recv()).await {
            Ok(Some(Inbound::Session(event))) => event,
            other => panic!("expected a session event, got {other:?}"),
        }
    }

    async fn expect_state(rx: &mut Events, peer: &PeerId, want: PeerConnection) {
        match next(rx).await {
            SessionEvent::PeerStateChanged(p, state) => {
                assert_eq!(&p, peer);
                assert_eq!(state, want);
            }
            other => panic!("expected {want:?} for {peer}, got {other:?}"),
        }
    }

    async fn expect_quiet(rx: &mut Events) {
        if let Ok(event) = tokio::time::timeout(QUIET, rx.recv()).await {
            panic!("unexpected event {event:?}");
        }
    }

    /// Connect a bare socket, send an invite and return the stream once the host sees it.
    async fn invite_raw(addr: SocketAddr, name: &str, rx: &mut Events) -> (PeerId, TcpStream) {
        let peer = PeerId::generate(name);
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, &Frame::invite(peer.clone()))
            .await
            .unwrap();
        match next(rx).await {
            SessionEvent::InvitationReceived(p) => assert_eq!(p, peer),
            other => panic!("expected invitation, got {other:?}"),
        }
        (peer, stream)
    }

    async fn join_raw(
        host: &mut Transport,
        addr: SocketAddr,
        name: &str,
        rx: &mut Events,
    ) -> (PeerId, TcpStream) {
        let (peer, mut stream) = invite_raw(addr, name, rx).await;
        host.accept(peer.clone()).await;
        match read_frame(&mut stream).await.unwrap() {
            Frame::Accept { peer: p } => assert_eq!(&p, &host.local),
            other => panic!("expected accept, got {other:?}"),
        }
        expect_state(rx, &peer, PeerConnection::Connected).await;
        (peer, stream)
    }

    #[tokio::test]
    async fn invite_accept_then_payload() {
        let (mut host, mut host_rx, addr) = hosting().await;
        let (tx, mut joiner_rx) = mpsc::unbounded_channel();
        let joiner_peer = PeerId::generate("joiner");
        let mut joiner = Transport::new(joiner_peer.clone(), 0, tx);
        let host_peer = host.local.clone();
        joiner.remember(host_peer.clone(), addr);
        joiner.invite(host_peer.clone());
        expect_state(&mut joiner_rx, &host_peer, PeerConnection::Connecting).await;

        match next(&mut host_rx).await {
            SessionEvent::InvitationReceived(p) => assert_eq!(p, joiner_peer),
            other => panic!("expected invitation, got {other:?}"),
        }
        host.accept(joiner_peer.clone()).await;
        expect_state(&mut host_rx, &joiner_peer, PeerConnection::Connected).await;
        expect_state(&mut joiner_rx, &host_peer, PeerConnection::Connected).await;

        host.broadcast(b"hello".to_vec()).await;
        match next(&mut joiner_rx).await {
            SessionEvent::PayloadReceived { from, payload } => {
                assert_eq!(from, host_peer);
                assert_eq!(payload, b"hello");
            }
            other => panic!("expected payload, got {other:?}"),
        }
        joiner.teardown().await;
        host.teardown().await;
    }

    #[tokio::test]
    async fn incompatible_invite_rejected() {
        let (_host, mut rx, addr) = hosting().await;
        let peer = PeerId::generate("old");
        for (protocol_version, service) in [
            (PROTOCOL_VERSION + 1, SERVICE_TYPE.to_string()),
            (PROTOCOL_VERSION, "other-chat".to_string()),
        ] {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let invite = Frame::Invite {
                protocol_version,
                service,
                peer: peer.clone(),
            };
            write_frame(&mut stream, &invite).await.unwrap();
            let mut buf = [0u8; 16];
            let closed = tokio::time::timeout(WAIT, stream.read(&mut buf)).await.unwrap();
            assert!(matches!(closed, Ok(0) | Err(_)));
        }
        expect_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn relay_skips_origin() {
        let (mut host, mut rx, addr) = hosting().await;
        let (a, mut a_stream) = join_raw(&mut host, addr, "a", &mut rx).await;
        let (_b, mut b_stream) = join_raw(&mut host, addr, "b", &mut rx).await;

        host.relay(&a, b"from a".to_vec()).await;
        match read_frame(&mut b_stream).await.unwrap() {
            Frame::Payload { data } => assert_eq!(data, b"from a"),
            other => panic!("expected payload, got {other:?}"),
        }
        assert!(tokio::time::timeout(QUIET, read_frame(&mut a_stream))
            .await
            .is_err());
        host.teardown().await;
    }

    #[tokio::test]
    async fn teardown_sends_leave_and_clears() {
        let (mut host, mut rx, addr) = hosting().await;
        let (_a, mut a_stream) = join_raw(&mut host, addr, "a", &mut rx).await;
        let (b, mut b_stream) = invite_raw(addr, "b", &mut rx).await;

        host.teardown().await;
        match read_frame(&mut a_stream).await.unwrap() {
            Frame::Leave { peer } => assert_eq!(peer, host.local),
            other => panic!("expected leave, got {other:?}"),
        }
        assert!(read_frame(&mut a_stream).await.is_err());
        assert!(read_frame(&mut b_stream).await.is_err());
        assert!(host.links.lock().await.is_empty());
        assert!(host.pending.lock().await.is_empty());

        host.accept(b).await;
        assert!(host.links.lock().await.is_empty());
    }

    #[tokio::test]
    async fn leave_and_eof_report_not_connected() {
        let (mut host, mut rx, addr) = hosting().await;
        let (a, mut a_stream) = join_raw(&mut host, addr, "a", &mut rx).await;
        let (b, b_stream) = join_raw(&mut host, addr, "b", &mut rx).await;

        write_frame(&mut a_stream, &Frame::Leave { peer: a.clone() })
            .await
            .unwrap();
        expect_state(&mut rx, &a, PeerConnection::NotConnected).await;

        drop(b_stream);
        expect_state(&mut rx, &b, PeerConnection::NotConnected).await;
        assert!(host.links.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invite_after_teardown_never_links() {
        let (mut host, mut rx, addr) = hosting().await;
        let joiner = PeerId::generate("late");
        let mut stream = TcpStream::connect(addr).await.unwrap();
        // Let the listener hand the connection to a handshake task.
        tokio::time::sleep(Duration::from_millis(100)).await;

        host.teardown().await;
        let _ = write_frame(&mut stream, &Frame::invite(joiner.clone())).await;
        expect_quiet(&mut rx).await;
        assert!(host.pending.lock().await.is_empty());

        host.accept(joiner).await;
        assert!(host.links.lock().await.is_empty());
        assert!(read_frame(&mut stream).await.is_err());
    }

    #[tokio::test]
    async fn unanswered_invitation_expires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut host = Transport::new(PeerId::generate("host"), 0, tx);
        host.invitation_timeout = Duration::from_millis(100);
        let bound = host.listen().await.unwrap();
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, bound.port()));

        let (peer, mut stream) = invite_raw(addr, "idle", &mut rx).await;
        assert!(host.pending.lock().await.contains_key(&peer));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(host.pending.lock().await.is_empty());
        assert!(read_frame(&mut stream).await.is_err());
        host.teardown().await;
    }
}
