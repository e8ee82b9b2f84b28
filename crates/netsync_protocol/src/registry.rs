//! Connection registry — the server's record of connected peers.
//!
//! A record is created when the transport reports a new incoming connection
//! and gains an identity once the peer announces itself with `NewPlayer`.
//! Records are dropped on disconnection or connection loss.

use std::collections::HashMap;
use std::net::SocketAddr;

use netsync_net::Timestamp;
use netsync_state::ClientId;

/// One connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    /// The peer's address.
    pub peer: SocketAddr,
    /// Connection index assigned by the transport.
    pub index: u32,
    /// Identity assigned by the server, once the peer has announced itself.
    pub identity: Option<ClientId>,
    /// When the connection was established.
    pub connected_at: Timestamp,
}

/// Registry of all connected peers.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: HashMap<SocketAddr, ConnectionRecord>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Record a new connection. A stale record for the same address is
    /// replaced and returned.
    pub fn connect(
        &mut self,
        peer: SocketAddr,
        index: u32,
        connected_at: Timestamp,
    ) -> Option<ConnectionRecord> {
        self.records.insert(
            peer,
            ConnectionRecord {
                peer,
                index,
                identity: None,
                connected_at,
            },
        )
    }

    /// Attach `identity` to the record for `peer`.
    ///
    /// Returns `false` if the peer is unknown or already identified; an
    /// identity never changes for the lifetime of a connection.
    pub fn identify(&mut self, peer: SocketAddr, identity: ClientId) -> bool {
        match self.records.get_mut(&peer) {
            Some(record) if record.identity.is_none() => {
                record.identity = Some(identity);
                true
            }
            _ => false,
        }
    }

    /// Remove the record for `peer`.
    pub fn remove(&mut self, peer: SocketAddr) -> Option<ConnectionRecord> {
        self.records.remove(&peer)
    }

    /// Returns the record for `peer`.
    #[must_use]
    pub fn get(&self, peer: SocketAddr) -> Option<&ConnectionRecord> {
        self.records.get(&peer)
    }

    /// Returns the identity of `peer`, if it has one.
    #[must_use]
    pub fn identity_of(&self, peer: SocketAddr) -> Option<ClientId> {
        self.records.get(&peer).and_then(|record| record.identity)
    }

    /// Returns the address of the peer holding `identity`.
    #[must_use]
    pub fn peer_of(&self, identity: ClientId) -> Option<SocketAddr> {
        self.records
            .values()
            .find(|record| record.identity == Some(identity))
            .map(|record| record.peer)
    }

    /// Returns an iterator over all records.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.records.values()
    }

    /// Returns the number of connected peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nobody is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of peers that have been given an identity.
    #[must_use]
    pub fn identified_count(&self) -> usize {
        self.records
            .values()
            .filter(|record| record.identity.is_some())
            .count()
    }
}
