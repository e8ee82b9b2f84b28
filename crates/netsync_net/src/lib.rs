//! # netsync_net
//!
//! Wire format and transport plumbing for netsync.
//!
//! This crate provides:
//!
//! - [`codec`] — fixed-layout little-endian encoding of object states and snapshots.
//! - [`messages`] — message identifiers, the envelope and the [`Message`] enum.
//! - [`clock`] — send timestamps and transit-time estimates.
//! - [`transport`] — the [`Transport`] collaborator trait and its event types.
//! - [`memory`] — an in-process transport for tests and local runs.
//! - [`udp`] — a connection layer over a tokio UDP socket.
//! - [`error`] — codec and network error types.

pub mod clock;
pub mod codec;
pub mod error;
pub mod memory;
pub mod messages;
pub mod transport;
pub mod udp;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use codec::{SnapshotEntry, decode_snapshot, decode_state, encode_snapshot, encode_state};
pub use error::{CodecError, NetError};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use messages::{Envelope, Message, MessageId};
pub use transport::{Recipient, Reliability, Transport, TransportEvent};
pub use udp::{UdpConfig, UdpTransport};
