//! Server endpoint.
//!
//! The server owns the authoritative table. It simulates every server-owned
//! slot, hands out identities, and answers each client's position report with
//! the state of everything that client does not own.
//!
//! ## Join sequence
//!
//! 1. Transport reports a new incoming connection: record it and send
//!    `ConnectionIndex`.
//! 2. Client sends `NewPlayer`: allocate the next identity, reset its slot to
//!    the client spawn state, send `ClientId` and `InitialParameters`, and
//!    broadcast `OtherClientId` to everyone else.
//! 3. Client sends `InitialClientParameters`: store it and relay it to
//!    everyone else.

use std::net::SocketAddr;
use std::time::Duration;

use netsync_net::codec::snapshot_entries;
use netsync_net::{
    Clock, Envelope, Message, MessageId, Recipient, SystemClock, Transport, TransportEvent,
};
use netsync_state::{Authority, ClientId, IdentityAllocator, ObjectState, ObjectTable};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::ProtocolError;
use crate::registry::ConnectionRegistry;
use crate::router::{self, Dispatch, Router};
use crate::tick::Endpoint;

/// Authoritative endpoint serving any number of clients.
#[derive(Debug)]
pub struct ServerEndpoint<T, C = SystemClock> {
    transport: T,
    clock: C,
    config: ServerConfig,
    table: ObjectTable,
    identities: IdentityAllocator,
    connections: ConnectionRegistry,
}

impl<T: Transport, C: Clock> ServerEndpoint<T, C> {
    /// Create a server on `transport` and populate its table.
    #[must_use]
    pub fn new(transport: T, clock: C, config: ServerConfig) -> Self {
        let mut table = ObjectTable::new(config.capacity);
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let spawned = config.spawn.populate(&mut table, &mut rng);
        info!(
            addr = %transport.local_addr(),
            capacity = table.capacity(),
            spawned,
            pattern = ?config.spawn,
            "server ready"
        );

        Self {
            transport,
            clock,
            identities: IdentityAllocator::new(table.capacity()),
            table,
            config,
            connections: ConnectionRegistry::new(),
        }
    }

    /// Returns the authoritative table.
    #[must_use]
    pub fn table(&self) -> &ObjectTable {
        &self.table
    }

    /// Returns the connection registry.
    #[must_use]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the address clients connect to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Returns the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Integrate every server-owned object by `dt` seconds, wrapping any that
    /// fell to the floor back up to the ceiling. Returns how many wrapped.
    pub fn physics_step(&mut self, dt: f32) -> usize {
        let (floor, ceiling) = (self.config.floor, self.config.ceiling);
        let mut wrapped = 0;
        for (_, state) in self.table.owned_by_mut(Authority::Server) {
            state.integrate(dt);
            if state.position.z <= floor {
                state.position.z = ceiling;
                state.velocity.z = 0.0;
                wrapped += 1;
            }
        }
        wrapped
    }

    fn send(&mut self, message: &Message, recipient: Recipient) -> Result<(), ProtocolError> {
        router::send(&mut self.transport, &self.clock, message, recipient)?;
        Ok(())
    }

    /// Identity of an announced sender.
    fn identity_of(&self, from: SocketAddr) -> Result<ClientId, ProtocolError> {
        self.connections
            .identity_of(from)
            .ok_or(ProtocolError::Unidentified(from))
    }

    /// Check that a report's owner tag matches the sender's identity.
    fn check_owner(
        &self,
        from: SocketAddr,
        state: &ObjectState,
    ) -> Result<ClientId, ProtocolError> {
        let identity = self.identity_of(from)?;
        if state.owner != identity.get() {
            return Err(ProtocolError::IdentityMismatch {
                peer: from,
                actual: identity.get(),
                claimed: state.owner,
            });
        }
        Ok(identity)
    }

    fn handle_new_connection(
        &mut self,
        peer: SocketAddr,
        index: u32,
    ) -> Result<Dispatch, ProtocolError> {
        let now = self.clock.now();
        if let Some(stale) = self.connections.connect(peer, index, now) {
            warn!(%peer, stale_index = stale.index, "replaced stale connection record");
            self.release(stale.identity);
        }
        info!(%peer, index, connections = self.connections.len(), "client connected");
        self.send(&Message::ConnectionIndex(index), Recipient::To(peer))?;
        Ok(Dispatch::Consumed)
    }

    fn handle_departure(&mut self, peer: SocketAddr, lost: bool) -> Dispatch {
        let Some(record) = self.connections.remove(peer) else {
            return Dispatch::Ignored;
        };
        if lost {
            warn!(%peer, identity = ?record.identity, "client connection lost");
        } else {
            info!(%peer, identity = ?record.identity, "client disconnected");
        }
        self.release(record.identity);
        Dispatch::Consumed
    }

    /// Return a departed client's slot to the server, reset to defaults.
    fn release(&mut self, identity: Option<ClientId>) {
        let Some(identity) = identity else {
            return;
        };
        if let Err(e) = self.table.reset(identity.get(), ObjectState::REST) {
            warn!(%identity, error = %e, "could not release slot");
        }
    }

    fn handle_new_player(&mut self, from: SocketAddr) -> Result<Dispatch, ProtocolError> {
        if self.connections.get(from).is_none() {
            return Err(ProtocolError::Unidentified(from));
        }
        if self.connections.identity_of(from).is_some() {
            return Err(ProtocolError::UnexpectedMessage {
                phase: "identified",
                message: MessageId::NewPlayer,
            });
        }

        let identity = match self.identities.allocate() {
            Ok(identity) => identity,
            Err(e) => {
                warn!(peer = %from, error = %e, "no identity available, dropping client");
                self.connections.remove(from);
                self.transport.disconnect(from)?;
                return Err(e.into());
            }
        };
        self.connections.identify(from, identity);
        let slot = identity.get();
        self.table.reset(slot, ObjectState::client_spawn(slot))?;
        info!(peer = %from, %identity, "client identified");

        self.send(&Message::ClientId(slot), Recipient::To(from))?;
        let snapshot = snapshot_entries(&self.table, slot);
        debug!(%identity, entries = snapshot.len(), "sending initial snapshot");
        self.send(&Message::InitialParameters(snapshot), Recipient::To(from))?;
        self.send(&Message::OtherClientId(slot), Recipient::AllExcept(from))?;
        Ok(Dispatch::Consumed)
    }

    fn handle_initial_client_parameters(
        &mut self,
        from: SocketAddr,
        state: ObjectState,
    ) -> Result<Dispatch, ProtocolError> {
        let identity = self.check_owner(from, &state)?;
        let slot = identity.get();
        self.table.assign(slot, Authority::Client(identity))?;
        *self.table.write(slot, Authority::Client(identity))? = state;
        debug!(%identity, position = ?state.position, "initial client state stored");
        self.send(
            &Message::InitialClientParameters(state),
            Recipient::AllExcept(from),
        )?;
        Ok(Dispatch::Consumed)
    }

    fn handle_send_position(
        &mut self,
        from: SocketAddr,
        state: ObjectState,
    ) -> Result<Dispatch, ProtocolError> {
        let identity = self.check_owner(from, &state)?;
        let slot = identity.get();
        *self.table.write(slot, Authority::Client(identity))? = state;
        let updates = snapshot_entries(&self.table, slot);
        trace!(%identity, entries = updates.len(), "replying with object updates");
        self.send(&Message::SendObjectUpdates(updates), Recipient::To(from))?;
        Ok(Dispatch::Consumed)
    }

    fn unexpected(message: &Message) -> Result<Dispatch, ProtocolError> {
        Err(ProtocolError::UnexpectedMessage {
            phase: "server",
            message: message.id(),
        })
    }
}

impl<T: Transport, C: Clock> Router for ServerEndpoint<T, C> {
    fn on_notification(&mut self, event: TransportEvent) -> Result<Dispatch, ProtocolError> {
        match event {
            TransportEvent::NewIncomingConnection { peer, index } => {
                self.handle_new_connection(peer, index)
            }
            TransportEvent::Disconnected { peer } => Ok(self.handle_departure(peer, false)),
            TransportEvent::ConnectionLost { peer } => Ok(self.handle_departure(peer, true)),
            TransportEvent::NoFreeIncomingConnections { peer } => {
                warn!(%peer, "server is full");
                Ok(Dispatch::Ignored)
            }
            TransportEvent::ConnectionAccepted { peer }
            | TransportEvent::ConnectionAttemptFailed { peer } => {
                debug!(%peer, "outgoing connection event ignored by server");
                Ok(Dispatch::Ignored)
            }
            TransportEvent::Message { from, .. } => {
                debug!(%from, "raw datagram passed as notification");
                Ok(Dispatch::Ignored)
            }
        }
    }

    fn on_message(
        &mut self,
        from: SocketAddr,
        envelope: Envelope,
        _transit: Duration,
    ) -> Result<Dispatch, ProtocolError> {
        match envelope.message {
            Message::NewPlayer => self.handle_new_player(from),
            Message::InitialClientParameters(state) => {
                self.handle_initial_client_parameters(from, state)
            }
            Message::SendPosition(state) => self.handle_send_position(from, state),
            ref other @ (Message::ConnectionIndex(_)
            | Message::ClientId(_)
            | Message::SendObjectUpdates(_)
            | Message::OtherClientId(_)
            | Message::InitialParameters(_)) => Self::unexpected(other),
        }
    }
}

impl<T: Transport, C: Clock> Endpoint for ServerEndpoint<T, C> {
    fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.transport.poll() {
            let now = self.clock.now();
            router::route(self, now, event);
            handled += 1;
        }
        handled
    }

    fn step(&mut self, dt: f32) {
        let wrapped = self.physics_step(dt);
        if wrapped > 0 {
            trace!(wrapped, "objects wrapped to ceiling");
        }
    }
}
