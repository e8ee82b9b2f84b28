//! Message taxonomy and envelope.
//!
//! Every application datagram starts with a one-byte [`MessageId`] followed by
//! the sender's [`Timestamp`] and a message-specific payload:
//!
//! ```text
//! [id: u8][sent_at: u64 LE ms][payload ...]
//! ```
//!
//! Identifiers start at 134, directly after the range the transport reserves
//! for its own notifications.

use netsync_state::{ObjectState, OwnerId};

use crate::clock::Timestamp;
use crate::codec::{self, SnapshotEntry};
use crate::error::CodecError;
use crate::transport::Reliability;

/// Size of the envelope header preceding every payload.
pub const HEADER_SIZE: usize = 1 + 8;

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Leading identifier byte of an application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    /// Server → client: the client's connection index on the server.
    ConnectionIndex = 134,
    /// Server → client: the identity assigned to the client.
    ClientId = 135,
    /// Client → server: routine report of the client's own object.
    SendPosition = 136,
    /// Server → client: every object not owned by the recipient.
    SendObjectUpdates = 137,
    /// Server → other clients: a new identity joined.
    OtherClientId = 138,
    /// Client → server: announce a freshly accepted connection.
    NewPlayer = 139,
    /// Server → client: initial table snapshot.
    InitialParameters = 140,
    /// Client → server, then server → other clients: the client's first state.
    InitialClientParameters = 141,
}

impl MessageId {
    /// Every identifier, in numeric order.
    pub const ALL: [MessageId; 8] = [
        MessageId::ConnectionIndex,
        MessageId::ClientId,
        MessageId::SendPosition,
        MessageId::SendObjectUpdates,
        MessageId::OtherClientId,
        MessageId::NewPlayer,
        MessageId::InitialParameters,
        MessageId::InitialClientParameters,
    ];

    /// Human-readable name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConnectionIndex => "connection_index",
            Self::ClientId => "client_id",
            Self::SendPosition => "send_position",
            Self::SendObjectUpdates => "send_object_updates",
            Self::OtherClientId => "other_client_id",
            Self::NewPlayer => "new_player",
            Self::InitialParameters => "initial_parameters",
            Self::InitialClientParameters => "initial_client_parameters",
        }
    }

    /// Delivery class the message is sent with.
    ///
    /// Connection and identity control goes reliable-ordered; high-frequency
    /// state traffic goes unreliable-sequenced, where a stale packet is simply
    /// dropped.
    #[must_use]
    pub const fn reliability(self) -> Reliability {
        match self {
            Self::SendPosition | Self::SendObjectUpdates => Reliability::UnreliableSequenced,
            _ => Reliability::ReliableOrdered,
        }
    }
}

impl TryFrom<u8> for MessageId {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|id| *id as u8 == value)
            .ok_or(CodecError::UnknownMessage(value))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Messages ────────────────────────────────────────────────────────────────

/// A decoded application message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// The recipient's connection index on the server.
    ConnectionIndex(u32),
    /// The identity assigned to the recipient.
    ClientId(OwnerId),
    /// The sender's own object.
    SendPosition(ObjectState),
    /// Every object not owned by the recipient.
    SendObjectUpdates(Vec<SnapshotEntry>),
    /// Another client's newly assigned identity.
    OtherClientId(OwnerId),
    /// A newly connected client announcing itself.
    NewPlayer,
    /// The server's table at the time the recipient joined.
    InitialParameters(Vec<SnapshotEntry>),
    /// A client's first state, as reported by it or relayed by the server.
    InitialClientParameters(ObjectState),
}

impl Message {
    /// Returns this message's identifier.
    #[must_use]
    pub fn id(&self) -> MessageId {
        match self {
            Self::ConnectionIndex(_) => MessageId::ConnectionIndex,
            Self::ClientId(_) => MessageId::ClientId,
            Self::SendPosition(_) => MessageId::SendPosition,
            Self::SendObjectUpdates(_) => MessageId::SendObjectUpdates,
            Self::OtherClientId(_) => MessageId::OtherClientId,
            Self::NewPlayer => MessageId::NewPlayer,
            Self::InitialParameters(_) => MessageId::InitialParameters,
            Self::InitialClientParameters(_) => MessageId::InitialClientParameters,
        }
    }

    /// Encode this message with the given send time.
    #[must_use]
    pub fn encode(&self, sent_at: Timestamp) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + codec::RECORD_SIZE);
        out.push(self.id() as u8);
        out.extend_from_slice(&sent_at.millis().to_le_bytes());
        match self {
            Self::ConnectionIndex(index) => out.extend_from_slice(&index.to_le_bytes()),
            Self::ClientId(id) | Self::OtherClientId(id) => {
                out.extend_from_slice(&id.to_le_bytes());
            }
            Self::SendPosition(state) | Self::InitialClientParameters(state) => {
                codec::encode_state(state, &mut out);
            }
            Self::SendObjectUpdates(entries) | Self::InitialParameters(entries) => {
                codec::encode_entries(entries, &mut out);
            }
            Self::NewPlayer => {}
        }
        out
    }
}

/// A decoded datagram: when it was sent and what it says.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The sender's clock when the message was written.
    pub sent_at: Timestamp,
    /// The message itself.
    pub message: Message,
}

fn finish(input: &[u8]) -> Result<(), CodecError> {
    if input.is_empty() {
        Ok(())
    } else {
        Err(CodecError::TrailingBytes(input.len()))
    }
}

/// Read only the leading identifier byte.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] for an empty datagram and
/// [`CodecError::UnknownMessage`] for an unrecognised identifier.
pub fn peek_id(bytes: &[u8]) -> Result<MessageId, CodecError> {
    let first = bytes.first().copied().ok_or(CodecError::Truncated {
        needed: 1,
        remaining: 0,
    })?;
    MessageId::try_from(first)
}

/// Decode a full datagram.
///
/// # Errors
///
/// Returns [`CodecError`] if the identifier is unknown, the payload is too
/// short for its fixed layout, or a fixed-layout payload has trailing bytes.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let id = peek_id(bytes)?;
    let mut input = &bytes[1..];
    let sent_at = Timestamp(codec::read_u64(&mut input)?);

    let message = match id {
        MessageId::ConnectionIndex => Message::ConnectionIndex(codec::read_u32(&mut input)?),
        MessageId::ClientId => Message::ClientId(codec::read_u16(&mut input)?),
        MessageId::OtherClientId => Message::OtherClientId(codec::read_u16(&mut input)?),
        MessageId::SendPosition => Message::SendPosition(codec::decode_state(&mut input)?),
        MessageId::InitialClientParameters => {
            Message::InitialClientParameters(codec::decode_state(&mut input)?)
        }
        MessageId::NewPlayer => Message::NewPlayer,
        MessageId::SendObjectUpdates => {
            let entries = codec::decode_snapshot(input)?;
            input = &[];
            Message::SendObjectUpdates(entries)
        }
        MessageId::InitialParameters => {
            let entries = codec::decode_snapshot(input)?;
            input = &[];
            Message::InitialParameters(entries)
        }
    };
    finish(input)?;

    Ok(Envelope { sent_at, message })
}
