//! Identities and authority.
//!
//! An [`OwnerId`] is the raw `u16` tag carried by every object record. `0`
//! names the server; any other value names the client that was assigned that
//! identity. Client identities double as the slot index of the client's own
//! object in the [`ObjectTable`](crate::ObjectTable).

use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// Raw owner tag as carried on the wire.
pub type OwnerId = u16;

/// Owner tag reserved for the server.
pub const SERVER_OWNER: OwnerId = 0;

/// An identity the server assigned to a connected client.
///
/// Client identities are never zero and never reused while the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(u16);

impl ClientId {
    /// Wrap a raw identity. Returns `None` for the server's reserved tag.
    #[must_use]
    pub const fn new(raw: OwnerId) -> Option<Self> {
        if raw == SERVER_OWNER {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Returns the raw identity, which is also the client's slot index.
    #[must_use]
    pub const fn get(self) -> OwnerId {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client {}", self.0)
    }
}

/// The single endpoint permitted to write an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authority {
    /// Server-simulated object.
    Server,
    /// Object simulated by the given client.
    Client(ClientId),
}

impl Authority {
    /// Derive the authority from a raw owner tag.
    ///
    /// This is the only place an owner tag is interpreted; every write path in
    /// the table goes through it.
    #[must_use]
    pub const fn of(owner: OwnerId) -> Self {
        match ClientId::new(owner) {
            Some(id) => Self::Client(id),
            None => Self::Server,
        }
    }

    /// Returns the raw owner tag for this authority.
    #[must_use]
    pub const fn owner(self) -> OwnerId {
        match self {
            Self::Server => SERVER_OWNER,
            Self::Client(id) => id.get(),
        }
    }
}

impl std::fmt::Display for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client(id) => id.fmt(f),
        }
    }
}

/// Allocates monotonically increasing client identities.
///
/// Lives on the server and is the single source of truth for identity. IDs
/// start at 1 and stop once the next one would no longer index a table slot.
#[derive(Debug)]
pub struct IdentityAllocator {
    next: u32,
    capacity: usize,
}

impl IdentityAllocator {
    /// Creates an allocator for a table with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { next: 1, capacity }
    }

    /// Allocates a fresh identity.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::IdentitiesExhausted`] once every slot but the
    /// server's has been handed out.
    pub fn allocate(&mut self) -> Result<ClientId, TableError> {
        let exhausted = TableError::IdentitiesExhausted {
            capacity: self.capacity,
        };
        if self.next as usize >= self.capacity {
            return Err(exhausted);
        }
        let raw = OwnerId::try_from(self.next).map_err(|_| exhausted)?;
        self.next += 1;
        // `next` starts at 1, so `raw` is never the server tag.
        Ok(ClientId(raw))
    }

    /// Returns the number of identities allocated so far.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.next - 1
    }
}
