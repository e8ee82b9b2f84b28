//! Protocol-level error types.

use std::net::SocketAddr;

use netsync_net::{CodecError, MessageId, NetError};
use netsync_state::{OwnerId, TableError};

/// Errors raised while handling a single inbound event.
///
/// None of these are fatal: the router logs them and drops the offending
/// message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The datagram could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A reply could not be handed to the transport.
    #[error(transparent)]
    Net(#[from] NetError),

    /// The message addressed a slot it may not touch.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The message is valid but not in the current protocol phase.
    #[error("{message} not expected while {phase}")]
    UnexpectedMessage {
        /// Phase the endpoint was in.
        phase: &'static str,
        /// The message that arrived.
        message: MessageId,
    },

    /// A client reported an object under an identity other than its own.
    #[error("peer {peer} identified as {actual} reported owner {claimed}")]
    IdentityMismatch {
        /// The sender.
        peer: SocketAddr,
        /// Identity the server assigned to the sender.
        actual: OwnerId,
        /// Owner tag carried by the report.
        claimed: OwnerId,
    },

    /// The server announced an identity that cannot name a client slot.
    #[error("invalid client identity {0}")]
    InvalidIdentity(OwnerId),

    /// The sender has no connection record, or has not announced itself yet.
    #[error("peer {0} is not identified")]
    Unidentified(SocketAddr),

    /// The message came from someone other than the server we connected to.
    #[error("message from {0}, which is not our server")]
    ForeignSender(SocketAddr),
}
