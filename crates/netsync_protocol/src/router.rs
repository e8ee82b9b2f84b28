//! Message routing shared by both endpoints.
//!
//! Transport notifications are dispatched by variant; datagrams are decoded
//! and dispatched by their leading identifier byte. Handlers return whether
//! the message was consumed. Errors are logged and the message dropped; they
//! never stop the loop.

use std::net::SocketAddr;
use std::time::Duration;

use netsync_net::{
    Clock, Envelope, Message, NetError, Recipient, Timestamp, Transport, TransportEvent, messages,
};
use tracing::{trace, warn};

use crate::error::ProtocolError;

/// Channel every message is sent on.
pub const CHANNEL: u8 = 0;

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler acted on the event.
    Consumed,
    /// The event was recognised but needed no action, or was dropped.
    Ignored,
}

/// Per-endpoint handlers invoked by [`route`].
pub trait Router {
    /// Handle a connection-level notification.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if a resulting reply could not be sent.
    fn on_notification(&mut self, event: TransportEvent) -> Result<Dispatch, ProtocolError>;

    /// Handle a decoded application message from `from` that spent
    /// `transit` in flight.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the message is out of phase, claims
    /// an identity or slot it has no right to, or a reply fails.
    fn on_message(
        &mut self,
        from: SocketAddr,
        envelope: Envelope,
        transit: Duration,
    ) -> Result<Dispatch, ProtocolError>;
}

/// Dispatch one transport event to `router`; `now` is the local clock reading
/// transit times are measured against.
pub fn route<R: Router>(router: &mut R, now: Timestamp, event: TransportEvent) -> Dispatch {
    let result = match event {
        TransportEvent::Message { from, payload } => match messages::decode(&payload) {
            Ok(envelope) => {
                let transit = now.transit_since(envelope.sent_at);
                let id = envelope.message.id();
                trace!(%from, message = %id, transit_ms = transit.as_millis() as u64, "received");
                router.on_message(from, envelope, transit)
            }
            Err(e) => {
                warn!(%from, len = payload.len(), error = %e, "undecodable datagram dropped");
                return Dispatch::Ignored;
            }
        },
        notification => router.on_notification(notification),
    };

    result.unwrap_or_else(|e| {
        warn!(error = %e, "message dropped");
        Dispatch::Ignored
    })
}

/// Encode `message` with the current time and send it to `recipient` on its
/// message's delivery class.
///
/// # Errors
///
/// Returns [`NetError`] if the transport refuses the datagram.
pub fn send<T: Transport + ?Sized>(
    transport: &mut T,
    clock: &impl Clock,
    message: &Message,
    recipient: Recipient,
) -> Result<(), NetError> {
    let id = message.id();
    let bytes = message.encode(clock.now());
    trace!(message = %id, len = bytes.len(), ?recipient, "send");
    transport.send(&bytes, id.reliability(), CHANNEL, recipient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        notifications: Vec<TransportEvent>,
        messages: Vec<(Message, Duration)>,
        fail: bool,
    }

    impl Router for Recorder {
        fn on_notification(&mut self, event: TransportEvent) -> Result<Dispatch, ProtocolError> {
            self.notifications.push(event);
            Ok(Dispatch::Consumed)
        }

        fn on_message(
            &mut self,
            _from: SocketAddr,
            envelope: Envelope,
            transit: Duration,
        ) -> Result<Dispatch, ProtocolError> {
            if self.fail {
                return Err(ProtocolError::ForeignSender(addr()));
            }
            self.messages.push((envelope.message, transit));
            Ok(Dispatch::Consumed)
        }
    }

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 7777))
    }

    #[test]
    fn test_messages_carry_transit() {
        let now = Timestamp(1_000);
        let mut recorder = Recorder::default();
        let payload = Message::ClientId(3).encode(Timestamp(900));

        let outcome = route(
            &mut recorder,
            now,
            TransportEvent::Message {
                from: addr(),
                payload,
            },
        );
        assert_eq!(outcome, Dispatch::Consumed);
        assert_eq!(
            recorder.messages,
            vec![(Message::ClientId(3), Duration::from_millis(100))]
        );
    }

    #[test]
    fn test_notifications_dispatched() {
        let mut recorder = Recorder::default();
        let event = TransportEvent::Disconnected { peer: addr() };
        assert_eq!(route(&mut recorder, Timestamp(0), event.clone()), Dispatch::Consumed);
        assert_eq!(recorder.notifications, vec![event]);
    }

    #[test]
    fn test_unknown_identifier_dropped() {
        let now = Timestamp(0);
        let mut recorder = Recorder::default();
        let outcome = route(
            &mut recorder,
            now,
            TransportEvent::Message {
                from: addr(),
                payload: vec![99, 0, 0, 0, 0, 0, 0, 0, 0],
            },
        );
        assert_eq!(outcome, Dispatch::Ignored);
        assert!(recorder.messages.is_empty());
    }

    #[test]
    fn test_handler_error_is_not_fatal() {
        let now = Timestamp(0);
        let mut recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let outcome = route(
            &mut recorder,
            now,
            TransportEvent::Message {
                from: addr(),
                payload: Message::NewPlayer.encode(Timestamp(0)),
            },
        );
        assert_eq!(outcome, Dispatch::Ignored);
    }
}
