//! Object table error types.

use crate::identity::{Authority, OwnerId};

/// Errors raised when reading or writing the object table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// A slot index (usually taken from the network) does not fit the table.
    #[error("owner index {index} is out of range for a table of {capacity} slots")]
    OwnerIndexOutOfRange {
        /// The offending index.
        index: OwnerId,
        /// The table capacity.
        capacity: usize,
    },

    /// The caller is not the authority for the slot it tried to write.
    #[error("{writer} may not write slot {slot} owned by {owner}")]
    NotAuthorized {
        /// The slot that was targeted.
        slot: OwnerId,
        /// Who attempted the write.
        writer: Authority,
        /// Who actually owns the slot.
        owner: Authority,
    },

    /// No further client identity fits the table.
    #[error("client identities exhausted (table capacity {capacity})")]
    IdentitiesExhausted {
        /// The table capacity.
        capacity: usize,
    },
}
