//! # netsync_state
//!
//! The state half of the synchronisation layer: what an object record is,
//! who may write it, and where it lives.
//!
//! This crate provides:
//!
//! - [`ObjectState`] — one simulated object's kinematic state plus its owner.
//! - [`OwnerId`] / [`ClientId`] / [`Authority`] — identities and the single
//!   writer derived from them.
//! - [`IdentityAllocator`] — monotonically increasing client identities.
//! - [`ObjectTable`] — fixed-capacity, ownership-checked object storage.

pub mod error;
pub mod identity;
pub mod object;
pub mod table;

pub use error::TableError;
pub use identity::{Authority, ClientId, IdentityAllocator, OwnerId, SERVER_OWNER};
pub use object::ObjectState;
pub use table::{DEFAULT_CAPACITY, ObjectTable};
