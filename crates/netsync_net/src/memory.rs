//! In-process transport.
//!
//! A [`MemoryNetwork`] is a shared hub; every [`MemoryTransport`] bound to it
//! gets a synthetic loopback address and an event queue. Delivery is
//! immediate and in order, which makes whole client/server exchanges
//! reproducible in tests. Links can be severed to simulate a lost peer.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;

use tracing::trace;

use crate::error::NetError;
use crate::transport::{Recipient, Reliability, Transport, TransportEvent};

/// First synthetic port handed out by [`MemoryNetwork::bind`].
const FIRST_PORT: u16 = 40_000;

#[derive(Debug, Default)]
struct Node {
    max_connections: usize,
    next_index: u32,
    /// Connected peers and the index they were given on this node.
    peers: BTreeMap<SocketAddr, u32>,
    inbox: VecDeque<TransportEvent>,
}

#[derive(Debug, Default)]
struct Hub {
    nodes: HashMap<SocketAddr, Node>,
    next_port: u16,
    dropped_unreliable: usize,
    lose_unreliable: bool,
}

impl Hub {
    fn node(&mut self, addr: SocketAddr) -> Result<&mut Node, NetError> {
        self.nodes.get_mut(&addr).ok_or(NetError::NotConnected)
    }

    fn push(&mut self, to: SocketAddr, event: TransportEvent) {
        if let Some(node) = self.nodes.get_mut(&to) {
            node.inbox.push_back(event);
        }
    }

    fn unlink(&mut self, a: SocketAddr, b: SocketAddr) {
        if let Some(node) = self.nodes.get_mut(&a) {
            node.peers.remove(&b);
        }
        if let Some(node) = self.nodes.get_mut(&b) {
            node.peers.remove(&a);
        }
    }
}

/// Shared in-process network. Clones refer to the same hub.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl MemoryNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint accepting at most `max_connections` incoming peers.
    #[must_use]
    pub fn bind(&self, max_connections: usize) -> MemoryTransport {
        let mut hub = self.hub.borrow_mut();
        let port = FIRST_PORT.wrapping_add(hub.next_port);
        hub.next_port = hub.next_port.wrapping_add(1);
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        hub.nodes.insert(
            addr,
            Node {
                max_connections,
                ..Node::default()
            },
        );
        MemoryTransport {
            hub: Rc::clone(&self.hub),
            addr,
        }
    }

    /// Cut the link between `a` and `b`; both sides see
    /// [`TransportEvent::ConnectionLost`].
    pub fn sever(&self, a: SocketAddr, b: SocketAddr) {
        let mut hub = self.hub.borrow_mut();
        hub.unlink(a, b);
        hub.push(a, TransportEvent::ConnectionLost { peer: b });
        hub.push(b, TransportEvent::ConnectionLost { peer: a });
    }

    /// Drop every unreliable datagram sent from now on (until switched off).
    pub fn set_lose_unreliable(&self, lose: bool) {
        self.hub.borrow_mut().lose_unreliable = lose;
    }

    /// Number of unreliable datagrams discarded so far.
    #[must_use]
    pub fn dropped_unreliable(&self) -> usize {
        self.hub.borrow().dropped_unreliable
    }
}

/// One endpoint on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    hub: Rc<RefCell<Hub>>,
    addr: SocketAddr,
}

impl MemoryTransport {
    /// Returns the addresses of every connected peer.
    #[must_use]
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.hub
            .borrow()
            .nodes
            .get(&self.addr)
            .map(|node| node.peers.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        let mut hub = self.hub.borrow_mut();
        let local = self.addr;
        if hub.node(local)?.peers.contains_key(&addr) {
            return Err(NetError::AlreadyConnected(addr));
        }

        let Some(remote) = hub.nodes.get_mut(&addr) else {
            hub.push(local, TransportEvent::ConnectionAttemptFailed { peer: addr });
            return Ok(());
        };
        if remote.peers.len() >= remote.max_connections {
            hub.push(local, TransportEvent::NoFreeIncomingConnections { peer: addr });
            return Ok(());
        }

        let index = remote.next_index;
        remote.next_index = remote.next_index.wrapping_add(1);
        remote.peers.insert(local, index);
        remote
            .inbox
            .push_back(TransportEvent::NewIncomingConnection { peer: local, index });

        let node = hub.node(local)?;
        node.peers.insert(addr, 0);
        node.inbox
            .push_back(TransportEvent::ConnectionAccepted { peer: addr });
        trace!(%local, remote = %addr, index, "memory link established");
        Ok(())
    }

    fn send(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        _channel: u8,
        recipient: Recipient,
    ) -> Result<(), NetError> {
        let mut hub = self.hub.borrow_mut();
        let peers: Vec<SocketAddr> = hub.node(self.addr)?.peers.keys().copied().collect();
        if let Recipient::To(target) = recipient {
            if !peers.contains(&target) {
                return Err(NetError::UnknownPeer(target));
            }
        }

        for peer in peers.into_iter().filter(|p| recipient.includes(*p)) {
            if reliability == Reliability::UnreliableSequenced && hub.lose_unreliable {
                hub.dropped_unreliable += 1;
                continue;
            }
            hub.push(
                peer,
                TransportEvent::Message {
                    from: self.addr,
                    payload: payload.to_vec(),
                },
            );
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        self.hub
            .borrow_mut()
            .nodes
            .get_mut(&self.addr)
            .and_then(|node| node.inbox.pop_front())
    }

    fn disconnect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        let mut hub = self.hub.borrow_mut();
        if !hub.node(self.addr)?.peers.contains_key(&addr) {
            return Err(NetError::UnknownPeer(addr));
        }
        hub.unlink(self.addr, addr);
        hub.push(addr, TransportEvent::Disconnected { peer: self.addr });
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let Ok(mut hub) = self.hub.try_borrow_mut() else {
            return;
        };
        let Some(node) = hub.nodes.remove(&self.addr) else {
            return;
        };
        for peer in node.peers.into_keys() {
            hub.unlink(self.addr, peer);
            hub.push(peer, TransportEvent::ConnectionLost { peer: self.addr });
        }
    }
}
