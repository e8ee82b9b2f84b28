//! Transport collaborator interface.
//!
//! Endpoints never touch sockets directly. They hand encoded datagrams to a
//! [`Transport`] with a delivery class and recipient set, and drain
//! [`TransportEvent`]s from it once per tick. Implementations live in
//! [`crate::memory`] (in-process, deterministic) and [`crate::udp`].

use std::net::SocketAddr;

use crate::error::NetError;

/// Delivery class of an outgoing datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    /// Delivered in send order; connection control uses this class.
    ReliableOrdered,
    /// May be lost; a datagram older than one already delivered on the same
    /// channel is discarded.
    UnreliableSequenced,
}

impl Reliability {
    /// Compact tag used in datagram headers.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::ReliableOrdered => 0,
            Self::UnreliableSequenced => 1,
        }
    }
}

/// Who a datagram is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// A single connected peer.
    To(SocketAddr),
    /// Every connected peer except one.
    AllExcept(SocketAddr),
    /// Every connected peer.
    All,
}

impl Recipient {
    /// Returns `true` if `peer` is addressed.
    #[must_use]
    pub fn includes(self, peer: SocketAddr) -> bool {
        match self {
            Self::To(addr) => addr == peer,
            Self::AllExcept(addr) => addr != peer,
            Self::All => true,
        }
    }
}

/// A notification or datagram surfaced by [`Transport::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Our outgoing connection attempt was accepted.
    ConnectionAccepted { peer: SocketAddr },
    /// A remote peer connected to us and was given a connection index.
    NewIncomingConnection { peer: SocketAddr, index: u32 },
    /// The peer closed the connection.
    Disconnected { peer: SocketAddr },
    /// The peer stopped responding.
    ConnectionLost { peer: SocketAddr },
    /// The peer we tried to reach has no free connection slots.
    NoFreeIncomingConnections { peer: SocketAddr },
    /// The peer we tried to reach never answered.
    ConnectionAttemptFailed { peer: SocketAddr },
    /// An application datagram. The buffer is owned by the receiver.
    Message { from: SocketAddr, payload: Vec<u8> },
}

impl TransportEvent {
    /// Returns the remote address this event concerns.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        match self {
            Self::ConnectionAccepted { peer }
            | Self::NewIncomingConnection { peer, .. }
            | Self::Disconnected { peer }
            | Self::ConnectionLost { peer }
            | Self::NoFreeIncomingConnections { peer }
            | Self::ConnectionAttemptFailed { peer } => *peer,
            Self::Message { from, .. } => *from,
        }
    }
}

/// A connection-oriented datagram transport.
///
/// All operations are non-blocking. Failures to reach a peer surface later as
/// events rather than as errors from these calls.
pub trait Transport {
    /// Start connecting to `addr`. Completion is reported through
    /// [`TransportEvent::ConnectionAccepted`] or one of the failure events.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::AlreadyConnected`] if `addr` is already a peer, or
    /// an I/O error if the request could not be sent.
    fn connect(&mut self, addr: SocketAddr) -> Result<(), NetError>;

    /// Send `payload` to `recipient` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::UnknownPeer`] when a [`Recipient::To`] target is not
    /// connected, or an I/O error from the underlying socket.
    fn send(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
        recipient: Recipient,
    ) -> Result<(), NetError>;

    /// Next pending event, or `None` if nothing is waiting.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Close the connection to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::UnknownPeer`] if `addr` is not connected.
    fn disconnect(&mut self, addr: SocketAddr) -> Result<(), NetError>;

    /// Address this transport is reachable at.
    fn local_addr(&self) -> SocketAddr;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        (**self).connect(addr)
    }

    fn send(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
        recipient: Recipient,
    ) -> Result<(), NetError> {
        (**self).send(payload, reliability, channel, recipient)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        (**self).poll()
    }

    fn disconnect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        (**self).disconnect(addr)
    }

    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }
}
