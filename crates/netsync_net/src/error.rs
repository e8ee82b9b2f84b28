//! Network-layer error types.

use std::net::SocketAddr;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload ended before a fixed-size field could be read.
    #[error("truncated message: needed {needed} more bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the next field required.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },

    /// The leading identifier byte names no known message.
    #[error("unrecognised message identifier {0}")]
    UnknownMessage(u8),

    /// A fixed-layout message carried extra bytes after its last field.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode or decode a datagram.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The destination is not a connected peer.
    #[error("unknown peer {0}")]
    UnknownPeer(SocketAddr),

    /// A send was attempted with no connection established.
    #[error("not connected")]
    NotConnected,

    /// A connect was attempted while a connection already exists.
    #[error("already connected to {0}")]
    AlreadyConnected(SocketAddr),
}
