//! The object state table.
//!
//! A fixed number of slots is allocated up front and never shrinks. Slot `N`
//! belongs to client `N` once that client has claimed it; every other slot
//! is simulated by the server. Slots are addressed by [`OwnerId`], which
//! frequently arrives straight off the network, so every lookup is validated
//! and every mutation is checked against the slot's [`Authority`].
//!
//! Two kinds of write exist:
//!
//! - [`ObjectTable::write`] — the slot's authority mutating its own object
//!   (physics step, server storing a client's report on that client's behalf).
//! - [`ObjectTable::apply_remote`] / [`ObjectTable::merge_remote`] — an
//!   endpoint mirroring state it does *not* own. These refuse to touch the
//!   local endpoint's own objects.

use crate::error::TableError;
use crate::identity::{Authority, OwnerId, SERVER_OWNER};
use crate::object::ObjectState;

/// Default number of slots (maximum concurrent objects).
pub const DEFAULT_CAPACITY: usize = 128;

/// Largest capacity addressable by a `u16` owner tag.
const MAX_CAPACITY: usize = OwnerId::MAX as usize + 1;

/// Fixed-capacity object storage indexed by owner identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTable {
    slots: Vec<ObjectState>,
}

impl ObjectTable {
    /// Create a table of `capacity` server-owned objects at rest.
    ///
    /// Capacities beyond what a `u16` tag can address are clamped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![ObjectState::REST; capacity.min(MAX_CAPACITY)],
        }
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn index(&self, slot: OwnerId) -> Result<usize, TableError> {
        let index = usize::from(slot);
        if index < self.slots.len() {
            Ok(index)
        } else {
            Err(TableError::OwnerIndexOutOfRange {
                index: slot,
                capacity: self.slots.len(),
            })
        }
    }

    /// Returns the object in `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::OwnerIndexOutOfRange`] for an invalid slot.
    pub fn get(&self, slot: OwnerId) -> Result<&ObjectState, TableError> {
        let index = self.index(slot)?;
        Ok(&self.slots[index])
    }

    /// Returns who may write `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::OwnerIndexOutOfRange`] for an invalid slot.
    pub fn authority_of(&self, slot: OwnerId) -> Result<Authority, TableError> {
        self.get(slot).map(ObjectState::authority)
    }

    /// Mutable access for the slot's authority.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::OwnerIndexOutOfRange`] for an invalid slot and
    /// [`TableError::NotAuthorized`] when `writer` does not own it.
    pub fn write(
        &mut self,
        slot: OwnerId,
        writer: Authority,
    ) -> Result<&mut ObjectState, TableError> {
        let index = self.index(slot)?;
        let owner = self.slots[index].authority();
        if owner != writer {
            return Err(TableError::NotAuthorized {
                slot,
                writer,
                owner,
            });
        }
        Ok(&mut self.slots[index])
    }

    /// Record that `slot` is now simulated by `owner`, keeping its kinematics.
    ///
    /// This is ownership bookkeeping (a client claiming its slot, a peer
    /// reserving one) rather than a state write.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::OwnerIndexOutOfRange`] for an invalid slot.
    pub fn assign(&mut self, slot: OwnerId, owner: Authority) -> Result<(), TableError> {
        let index = self.index(slot)?;
        self.slots[index].owner = owner.owner();
        Ok(())
    }

    /// Overwrite `slot` with `state` regardless of ownership.
    ///
    /// Used for (re)initialisation: spawning the server's objects, resetting a
    /// slot when its client connects or leaves.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::OwnerIndexOutOfRange`] for an invalid slot.
    pub fn reset(&mut self, slot: OwnerId, state: ObjectState) -> Result<(), TableError> {
        let index = self.index(slot)?;
        self.slots[index] = state;
        Ok(())
    }

    fn check_remote(
        &self,
        slot: OwnerId,
        incoming: &ObjectState,
        local: Authority,
    ) -> Result<usize, TableError> {
        let index = self.index(slot)?;
        let owner = self.slots[index].authority();
        if owner == local {
            return Err(TableError::NotAuthorized {
                slot,
                writer: incoming.authority(),
                owner,
            });
        }
        if incoming.authority() == local {
            return Err(TableError::NotAuthorized {
                slot,
                writer: incoming.authority(),
                owner: local,
            });
        }
        // A client's object only ever lives in the slot numbered by its identity.
        if incoming.owner != SERVER_OWNER && incoming.owner != slot {
            return Err(TableError::NotAuthorized {
                slot,
                writer: incoming.authority(),
                owner,
            });
        }
        Ok(index)
    }

    /// Mirror a state owned by someone other than `local` into `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::OwnerIndexOutOfRange`] for an invalid slot and
    /// [`TableError::NotAuthorized`] when the slot, or the incoming record's
    /// owner tag, is `local` itself, or when the record names a client other
    /// than the one the slot belongs to.
    pub fn apply_remote(
        &mut self,
        slot: OwnerId,
        state: ObjectState,
        local: Authority,
    ) -> Result<(), TableError> {
        let index = self.check_remote(slot, &state, local)?;
        self.slots[index] = state;
        Ok(())
    }

    /// Merge a remotely owned state into `slot` with a caller-supplied rule.
    ///
    /// `merge` receives the locally held state and the incoming one; the owner
    /// tag is taken from the incoming record afterwards. Ownership checks are
    /// the same as [`ObjectTable::apply_remote`].
    ///
    /// # Errors
    ///
    /// See [`ObjectTable::apply_remote`].
    pub fn merge_remote<R>(
        &mut self,
        slot: OwnerId,
        incoming: &ObjectState,
        local: Authority,
        merge: impl FnOnce(&mut ObjectState, &ObjectState) -> R,
    ) -> Result<R, TableError> {
        let index = self.check_remote(slot, incoming, local)?;
        let held = &mut self.slots[index];
        let result = merge(held, incoming);
        held.owner = incoming.owner;
        Ok(result)
    }

    /// Iterate over every slot with its index.
    pub fn iter(&self) -> impl Iterator<Item = (OwnerId, &ObjectState)> {
        // Capacity is clamped to the `u16` range, so the cast is lossless.
        self.slots
            .iter()
            .enumerate()
            .map(|(index, state)| (index as OwnerId, state))
    }

    /// Iterate mutably over the slots owned by `writer`.
    pub fn owned_by_mut(
        &mut self,
        writer: Authority,
    ) -> impl Iterator<Item = (OwnerId, &mut ObjectState)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(move |(_, state)| state.authority() == writer)
            .map(|(index, state)| (index as OwnerId, state))
    }

    /// Iterate mutably over the slots *not* owned by `local`.
    pub fn remote_mut(
        &mut self,
        local: Authority,
    ) -> impl Iterator<Item = (OwnerId, &mut ObjectState)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(move |(_, state)| state.authority() != local)
            .map(|(index, state)| (index as OwnerId, state))
    }

    /// Returns the number of slots owned by `authority`.
    #[must_use]
    pub fn count_owned_by(&self, authority: Authority) -> usize {
        self.slots
            .iter()
            .filter(|state| state.authority() == authority)
            .count()
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
