//! LAN discovery: UDP multicast beacons. Hosts advertise; joiners browse and report found/lost hosts.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crosstalk_core::wire::{decode_frame, encode_frame};
use crosstalk_core::{Frame, PeerId, SessionEvent};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::coordinator::{Inbound, InboundTx};

/// Multicast group (same subnet).
const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 60, 61);
/// Beacon interval.
const BEACON_INTERVAL: Duration = Duration::from_secs(2);
/// Advertiser considered lost if no beacon for this long.
const PEER_TIMEOUT: Duration = Duration::from_secs(8);

struct Advertiser {
    socket: Arc<UdpSocket>,
    task: JoinHandle<()>,
}

/// Advertising and browsing, each started and stopped by the coordinator.
pub struct Discovery {
    local: PeerId,
    discovery_port: u16,
    transport_port: u16,
    events: InboundTx,
    advertiser: Option<Advertiser>,
    browser: Option<JoinHandle<()>>,
}

impl Discovery {
    pub fn new(local: PeerId, discovery_port: u16, transport_port: u16, events: InboundTx) -> Self {
        Self {
            local,
            discovery_port,
            transport_port,
            events,
            advertiser: None,
            browser: None,
        }
    }

    /// Start sending beacons. No-op if already advertising.
    pub async fn advertise(&mut self) -> std::io::Result<()> {
        if self.advertiser.is_some() {
            return Ok(());
        }
        let socket = Arc::new(make_send_socket().await?);
        let frame = encode_frame(&Frame::beacon(self.local.clone(), self.transport_port))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let dest = SocketAddr::from((MULTICAST_GROUP, self.discovery_port));
        let task = tokio::spawn(beacon_loop(socket.clone(), frame, dest));
        log::info!("advertising on {}", dest);
        self.advertiser = Some(Advertiser { socket, task });
        Ok(())
    }

    /// Start listening for beacons. No-op if already browsing.
    pub async fn browse(&mut self) -> std::io::Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }
        let socket = make_multicast_socket(self.discovery_port).await?;
        let task = tokio::spawn(recv_loop(socket, self.local.clone(), self.events.clone()));
        log::info!("browsing on port {}", self.discovery_port);
        self.browser = Some(task);
        Ok(())
    }

    /// Stop advertising (announcing withdrawal) and browsing.
    pub async fn stop(&mut self) {
        if let Some(adv) = self.advertiser.take() {
            adv.task.abort();
            let dest = SocketAddr::from((MULTICAST_GROUP, self.discovery_port));
            match encode_frame(&Frame::Withdraw {
                peer: self.local.clone(),
            }) {
                Ok(frame) => {
                    if let Err(e) = adv.socket.send_to(&frame, dest).await {
                        log::debug!("withdraw not sent: {}", e);
                    }
                }
                Err(e) => log::debug!("withdraw not encoded: {}", e),
            }
        }
        if let Some(task) = self.browser.take() {
            task.abort();
        }
    }
}

async fn make_send_socket() -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_multicast_ttl_v4(1)?;
    Ok(socket)
}

async fn make_multicast_socket(discovery_port: u16) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, discovery_port))?;
    std_sock.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

async fn beacon_loop(socket: Arc<UdpSocket>, frame: Vec<u8>, dest: SocketAddr) {
    let mut interval = tokio::time::interval(BEACON_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = socket.send_to(&frame, dest).await {
            log::debug!("beacon not sent: {}", e);
        }
    }
}

/// Tracks advertisers seen by the browser.
#[derive(Default)]
struct SeenPeers {
    peers: HashMap<PeerId, Instant>,
}

impl SeenPeers {
    /// Record a beacon; true if the peer was not known.
    fn saw(&mut self, peer: &PeerId, now: Instant) -> bool {
        self.peers.insert(peer.clone(), now).is_none()
    }

    fn withdraw(&mut self, peer: &PeerId) -> bool {
        self.peers.remove(peer).is_some()
    }

    fn expire(&mut self, now: Instant) -> Vec<PeerId> {
        let gone: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, t)| now.duration_since(**t) >= PEER_TIMEOUT)
            .map(|(p, _)| p.clone())
            .collect();
        for p in &gone {
            self.peers.remove(p);
        }
        gone
    }
}

async fn recv_loop(socket: UdpSocket, local: PeerId, events: InboundTx) {
    let mut buf = vec![0u8; 65536];
    let mut seen = SeenPeers::default();
    let mut sweep = tokio::time::interval(PEER_TIMEOUT / 2);
    loop {
        tokio::select! {
            r = socket.recv_from(&mut buf) => {
                let (n, from) = match r {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("discovery receive failed: {}", e);
                        return;
                    }
                };
                let Ok((frame, _)) = decode_frame(&buf[..n]) else {
                    continue;
                };
                match frame {
                    Frame::Beacon { protocol_version, service, peer, listen_port } => {
                        if !Frame::is_compatible(protocol_version, &service) || peer == local {
                            continue;
                        }
                        if seen.saw(&peer, Instant::now()) {
                            log::debug!("discovered {} at {}", peer, from.ip());
                            let addr = SocketAddr::new(from.ip(), listen_port);
                            let _ = events.send(Inbound::Discovered { peer, addr });
                        }
                    }
                    Frame::Withdraw { peer } => {
                        if seen.withdraw(&peer) {
                            let _ = events.send(Inbound::Session(SessionEvent::PeerLost(peer)));
                        }
                    }
                    _ => {}
                }
            }
            _ = sweep.tick() => {
                for peer in seen.expire(Instant::now()) {
                    log::debug!("{} timed out", peer);
                    let _ = events.send(Inbound::Session(SessionEvent::PeerLost(peer)));
                }
            }
        }
    }
}
