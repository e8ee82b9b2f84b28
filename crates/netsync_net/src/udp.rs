//! UDP transport.
//!
//! A thin connection layer over a non-blocking tokio [`UdpSocket`]. Every
//! datagram starts with a six-byte header:
//!
//! ```text
//! [kind: u8][channel: u8][sequence: u32 LE][payload ...]
//! ```
//!
//! Connection control is a three-message handshake (`CONNECT` → `ACCEPT` or
//! `FULL`), heartbeats keep idle links alive, and a peer that stays silent for
//! [`UdpConfig::timeout`] is reported as [`TransportEvent::ConnectionLost`].
//!
//! Each `(peer, reliability, channel)` stream carries its own sequence
//! counter. A datagram whose sequence is not newer than the last one delivered
//! on its stream is dropped, so both delivery classes arrive in order.
//! Reliable-ordered traffic is not retransmitted.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::error::NetError;
use crate::transport::{Recipient, Reliability, Transport, TransportEvent};

/// Size of the datagram header.
pub const HEADER_LEN: usize = 6;

/// Largest datagram the transport will read.
const MAX_DATAGRAM: usize = 65_507;

const KIND_CONNECT: u8 = 1;
const KIND_ACCEPT: u8 = 2;
const KIND_FULL: u8 = 3;
const KIND_DISCONNECT: u8 = 4;
const KIND_HEARTBEAT: u8 = 5;
const KIND_RELIABLE: u8 = 6;
const KIND_SEQUENCED: u8 = 7;

/// Configuration for a [`UdpTransport`].
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address to bind.
    pub bind: SocketAddr,
    /// Maximum number of incoming connections accepted.
    pub max_connections: usize,
    /// Idle time after which a heartbeat is sent.
    pub heartbeat_interval: Duration,
    /// Silence after which a connected peer is considered lost.
    pub timeout: Duration,
    /// How long an outgoing connection attempt may remain unanswered.
    pub connect_timeout: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            max_connections: 32,
            heartbeat_interval: Duration::from_millis(250),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl UdpConfig {
    /// Set the local bind address.
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Set the incoming connection limit.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the silence timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the outgoing connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    /// We sent `CONNECT` and are waiting for an answer.
    Connecting { started: Instant },
    Connected,
}

#[derive(Debug)]
struct Link {
    state: LinkState,
    last_heard: Instant,
    last_sent: Instant,
    outgoing: HashMap<(u8, u8), u32>,
    incoming: HashMap<(u8, u8), u32>,
}

impl Link {
    fn new(state: LinkState, now: Instant) -> Self {
        Self {
            state,
            last_heard: now,
            last_sent: now,
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    fn next_sequence(&mut self, kind: u8, channel: u8) -> u32 {
        let counter = self.outgoing.entry((kind, channel)).or_insert(0);
        *counter = counter.wrapping_add(1);
        *counter
    }

    /// Record `sequence` on its stream; `false` if it is stale.
    fn accept_sequence(&mut self, kind: u8, channel: u8, sequence: u32) -> bool {
        match self.incoming.get_mut(&(kind, channel)) {
            Some(last) if !is_newer(sequence, *last) => false,
            Some(last) => {
                *last = sequence;
                true
            }
            None => {
                self.incoming.insert((kind, channel), sequence);
                true
            }
        }
    }
}

/// `true` if `a` comes after `b` in wrapping sequence space.
fn is_newer(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < u32::MAX / 2
}

fn header(kind: u8, channel: u8, sequence: u32) -> [u8; HEADER_LEN] {
    let seq = sequence.to_le_bytes();
    [kind, channel, seq[0], seq[1], seq[2], seq[3]]
}

fn data_kind(reliability: Reliability) -> u8 {
    match reliability {
        Reliability::ReliableOrdered => KIND_RELIABLE,
        Reliability::UnreliableSequenced => KIND_SEQUENCED,
    }
}

/// Connection-oriented transport over a single UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    config: UdpConfig,
    links: HashMap<SocketAddr, Link>,
    indices: HashMap<SocketAddr, u32>,
    next_index: u32,
    events: VecDeque<TransportEvent>,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind a socket per `config`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Io`] if the address cannot be bound.
    pub async fn bind(config: UdpConfig) -> Result<Self, NetError> {
        let socket = UdpSocket::bind(config.bind).await?;
        let local_addr = socket.local_addr()?;
        // Prime write readiness so the first non-blocking send goes out.
        socket.writable().await?;
        info!(%local_addr, max_connections = config.max_connections, "udp transport bound");
        Ok(Self {
            socket,
            local_addr,
            config,
            links: HashMap::new(),
            indices: HashMap::new(),
            next_index: 0,
            events: VecDeque::new(),
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Returns the configuration in use.
    #[must_use]
    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Number of established connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.links
            .values()
            .filter(|link| link.state == LinkState::Connected)
            .count()
    }

    fn raw_send(&self, bytes: &[u8], to: SocketAddr) -> Result<(), NetError> {
        match self.socket.try_send_to(bytes, to) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(%to, len = bytes.len(), "socket busy, datagram dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn send_control(&mut self, kind: u8, to: SocketAddr) {
        if let Err(e) = self.raw_send(&header(kind, 0, 0), to) {
            warn!(%to, kind, error = %e, "control datagram failed");
        }
        if let Some(link) = self.links.get_mut(&to) {
            link.last_sent = Instant::now();
        }
    }

    fn drop_link(&mut self, peer: SocketAddr) {
        self.links.remove(&peer);
        self.indices.remove(&peer);
    }

    fn incoming_count(&self) -> usize {
        self.indices.len()
    }

    /// Read every datagram currently queued on the socket.
    fn pump(&mut self) {
        loop {
            let (len, from) = match self.socket.try_recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // ICMP port-unreachable and similar surface here; the
                    // silence timeout handles the affected peer.
                    debug!(error = %e, "udp receive error");
                    break;
                }
            };
            if len < HEADER_LEN {
                trace!(%from, len, "runt datagram dropped");
                continue;
            }
            let kind = self.buf[0];
            let channel = self.buf[1];
            let sequence = u32::from_le_bytes([self.buf[2], self.buf[3], self.buf[4], self.buf[5]]);
            let payload = self.buf[HEADER_LEN..len].to_vec();
            self.handle_datagram(from, kind, channel, sequence, payload);
        }
    }

    fn handle_datagram(
        &mut self,
        from: SocketAddr,
        kind: u8,
        channel: u8,
        sequence: u32,
        payload: Vec<u8>,
    ) {
        let now = Instant::now();
        if let Some(link) = self.links.get_mut(&from) {
            link.last_heard = now;
        }

        match kind {
            KIND_CONNECT => {
                if self.links.contains_key(&from) {
                    // Our ACCEPT was lost; answer again.
                    self.send_control(KIND_ACCEPT, from);
                    return;
                }
                if self.incoming_count() >= self.config.max_connections {
                    debug!(%from, "refusing connection, no free slots");
                    self.send_control(KIND_FULL, from);
                    return;
                }
                let index = self.next_index;
                self.next_index = self.next_index.wrapping_add(1);
                self.links.insert(from, Link::new(LinkState::Connected, now));
                self.indices.insert(from, index);
                self.send_control(KIND_ACCEPT, from);
                info!(peer = %from, index, "incoming connection");
                self.events
                    .push_back(TransportEvent::NewIncomingConnection { peer: from, index });
            }
            KIND_ACCEPT => {
                if let Some(link) = self.links.get_mut(&from) {
                    if matches!(link.state, LinkState::Connecting { .. }) {
                        link.state = LinkState::Connected;
                        info!(peer = %from, "connection accepted");
                        self.events
                            .push_back(TransportEvent::ConnectionAccepted { peer: from });
                    }
                }
            }
            KIND_FULL => {
                if self.links.remove(&from).is_some() {
                    self.events
                        .push_back(TransportEvent::NoFreeIncomingConnections { peer: from });
                }
            }
            KIND_DISCONNECT => {
                if self.links.contains_key(&from) {
                    self.drop_link(from);
                    info!(peer = %from, "peer disconnected");
                    self.events
                        .push_back(TransportEvent::Disconnected { peer: from });
                }
            }
            KIND_HEARTBEAT => {}
            KIND_RELIABLE | KIND_SEQUENCED => {
                let Some(link) = self.links.get_mut(&from) else {
                    trace!(%from, "datagram from unknown peer dropped");
                    return;
                };
                if link.state != LinkState::Connected {
                    return;
                }
                if !link.accept_sequence(kind, channel, sequence) {
                    trace!(%from, channel, sequence, "stale datagram dropped");
                    return;
                }
                self.events
                    .push_back(TransportEvent::Message { from, payload });
            }
            other => trace!(%from, kind = other, "unknown datagram kind"),
        }
    }

    /// Expire silent peers, give up on stale connects and send heartbeats.
    fn maintain(&mut self) {
        let now = Instant::now();
        let mut lost = Vec::new();
        let mut failed = Vec::new();
        let mut idle = Vec::new();
        for (addr, link) in &self.links {
            match link.state {
                LinkState::Connecting { started } => {
                    if now.duration_since(started) >= self.config.connect_timeout {
                        failed.push(*addr);
                    } else if now.duration_since(link.last_sent) >= self.config.heartbeat_interval
                    {
                        idle.push((*addr, KIND_CONNECT));
                    }
                }
                LinkState::Connected => {
                    if now.duration_since(link.last_heard) >= self.config.timeout {
                        lost.push(*addr);
                    } else if now.duration_since(link.last_sent) >= self.config.heartbeat_interval
                    {
                        idle.push((*addr, KIND_HEARTBEAT));
                    }
                }
            }
        }

        for peer in lost {
            warn!(%peer, "connection lost");
            self.drop_link(peer);
            self.events.push_back(TransportEvent::ConnectionLost { peer });
        }
        for peer in failed {
            warn!(%peer, "connection attempt failed");
            self.drop_link(peer);
            self.events
                .push_back(TransportEvent::ConnectionAttemptFailed { peer });
        }
        for (peer, kind) in idle {
            self.send_control(kind, peer);
        }
    }
}

impl Transport for UdpTransport {
    fn connect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        if self.links.contains_key(&addr) {
            return Err(NetError::AlreadyConnected(addr));
        }
        let now = Instant::now();
        self.links
            .insert(addr, Link::new(LinkState::Connecting { started: now }, now));
        debug!(peer = %addr, "connecting");
        self.raw_send(&header(KIND_CONNECT, 0, 0), addr)
    }

    fn send(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
        recipient: Recipient,
    ) -> Result<(), NetError> {
        if let Recipient::To(target) = recipient {
            let connected = self
                .links
                .get(&target)
                .is_some_and(|link| link.state == LinkState::Connected);
            if !connected {
                return Err(NetError::UnknownPeer(target));
            }
        }

        let kind = data_kind(reliability);
        let targets: Vec<SocketAddr> = self
            .links
            .iter()
            .filter(|(addr, link)| link.state == LinkState::Connected && recipient.includes(**addr))
            .map(|(addr, _)| *addr)
            .collect();

        let mut datagram = Vec::with_capacity(HEADER_LEN + payload.len());
        for peer in targets {
            let Some(link) = self.links.get_mut(&peer) else {
                continue;
            };
            let sequence = link.next_sequence(kind, channel);
            link.last_sent = Instant::now();
            datagram.clear();
            datagram.extend_from_slice(&header(kind, channel, sequence));
            datagram.extend_from_slice(payload);
            self.raw_send(&datagram, peer)?;
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if self.events.is_empty() {
            self.pump();
            self.maintain();
        }
        self.events.pop_front()
    }

    fn disconnect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        if !self.links.contains_key(&addr) {
            return Err(NetError::UnknownPeer(addr));
        }
        self.send_control(KIND_DISCONNECT, addr);
        self.drop_link(addr);
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
