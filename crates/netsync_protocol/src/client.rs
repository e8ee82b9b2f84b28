//! Client endpoint.
//!
//! A client mirrors the server's table, simulates the one object it owns and
//! reports it every frame. Progress through the join sequence is tracked by
//! [`ClientPhase`]; messages that arrive in the wrong phase are dropped.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use netsync_net::codec::SnapshotEntry;
use netsync_net::{
    Clock, Envelope, Message, NetError, Recipient, SystemClock, Transport, TransportEvent,
};
use netsync_state::{Authority, ClientId, ObjectState, ObjectTable, OwnerId};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::ProtocolError;
use crate::reconcile::Correction;
use crate::router::{self, Dispatch, Router};
use crate::tick::Endpoint;

/// Where a client is in the join sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientPhase {
    /// No connection and none requested.
    Disconnected,
    /// `connect` was called; waiting for the transport.
    ConnectionRequested,
    /// Connected and `NewPlayer` sent; waiting for an identity.
    Connected,
    /// Identity known; waiting for the initial snapshot.
    Identified,
    /// Applying the initial snapshot.
    ReceivingInitialSnapshot,
    /// Fully joined; exchanging updates every frame.
    Synchronized,
}

impl ClientPhase {
    /// Human-readable name for logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::ConnectionRequested => "connection_requested",
            Self::Connected => "connected",
            Self::Identified => "identified",
            Self::ReceivingInitialSnapshot => "receiving_initial_snapshot",
            Self::Synchronized => "synchronized",
        }
    }
}

impl fmt::Display for ClientPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running totals of reconciliation outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Entries smoothed toward the server state.
    pub interpolated: u64,
    /// Entries replaced outright.
    pub snapped: u64,
    /// Entries dropped for addressing a slot they may not touch.
    pub rejected: u64,
}

/// Endpoint connected to a single server.
#[derive(Debug)]
pub struct ClientEndpoint<T, C = SystemClock> {
    transport: T,
    clock: C,
    config: ClientConfig,
    table: ObjectTable,
    phase: ClientPhase,
    server: Option<SocketAddr>,
    identity: Option<ClientId>,
    connection_index: Option<u32>,
    stats: ReconcileStats,
}

impl<T: Transport, C: Clock> ClientEndpoint<T, C> {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(transport: T, clock: C, config: ClientConfig) -> Self {
        Self {
            transport,
            clock,
            table: ObjectTable::new(config.capacity),
            config,
            phase: ClientPhase::Disconnected,
            server: None,
            identity: None,
            connection_index: None,
            stats: ReconcileStats::default(),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Returns the identity assigned by the server.
    #[must_use]
    pub fn identity(&self) -> Option<ClientId> {
        self.identity
    }

    /// Returns the connection index the server reported.
    #[must_use]
    pub fn connection_index(&self) -> Option<u32> {
        self.connection_index
    }

    /// Returns the server address, while connected or connecting.
    #[must_use]
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server
    }

    /// Returns the local mirror of the table.
    #[must_use]
    pub fn table(&self) -> &ObjectTable {
        &self.table
    }

    /// Returns the client's own object, once identified.
    #[must_use]
    pub fn own_state(&self) -> Option<&ObjectState> {
        self.identity
            .and_then(|identity| self.table.get(identity.get()).ok())
    }

    /// Returns reconciliation totals.
    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Returns the local transport address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn local(&self) -> Option<Authority> {
        self.identity.map(Authority::Client)
    }

    /// Start connecting to the server at `addr`. The table is reset.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::AlreadyConnected`] unless the client is
    /// disconnected, or the transport's error if the request fails.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), ProtocolError> {
        if self.phase != ClientPhase::Disconnected {
            let current = self.server.unwrap_or(addr);
            return Err(NetError::AlreadyConnected(current).into());
        }
        self.transport.connect(addr)?;
        self.table = ObjectTable::new(self.config.capacity);
        self.server = Some(addr);
        self.phase = ClientPhase::ConnectionRequested;
        info!(server = %addr, "connecting");
        Ok(())
    }

    /// Close the connection to the server.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] if there is no server, or the
    /// transport's error.
    pub fn disconnect(&mut self) -> Result<(), ProtocolError> {
        let server = self.server.ok_or(NetError::NotConnected)?;
        let result = self.transport.disconnect(server);
        self.reset_session("disconnect requested");
        result.map_err(Into::into)
    }

    fn reset_session(&mut self, reason: &str) {
        info!(from = %self.phase, reason, "session ended");
        self.phase = ClientPhase::Disconnected;
        self.server = None;
        self.identity = None;
        self.connection_index = None;
    }

    fn send(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let server = self.server.ok_or(NetError::NotConnected)?;
        router::send(&mut self.transport, &self.clock, message, Recipient::To(server))?;
        Ok(())
    }

    fn unexpected(&self, message: &Message) -> ProtocolError {
        ProtocolError::UnexpectedMessage {
            phase: self.phase.name(),
            message: message.id(),
        }
    }

    /// Validate a slot number the server announced as a client identity.
    fn client_slot(&self, raw: OwnerId) -> Result<ClientId, ProtocolError> {
        self.table.get(raw)?;
        ClientId::new(raw).ok_or(ProtocolError::InvalidIdentity(raw))
    }

    /// Integrate the own object by `dt` and report it. Remote objects are
    /// advanced too when `extrapolate_remote` is set.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the report cannot be sent.
    pub fn physics_step(&mut self, dt: f32) -> Result<(), ProtocolError> {
        let (Some(identity), ClientPhase::Synchronized) = (self.identity, self.phase) else {
            return Ok(());
        };
        let local = Authority::Client(identity);
        let own = self.table.write(identity.get(), local)?;
        own.integrate(dt);
        let report = *own;

        if self.config.extrapolate_remote {
            for (_, state) in self.table.remote_mut(local) {
                state.integrate(dt);
            }
        }
        self.send(&Message::SendPosition(report))
    }

    fn handle_connection_accepted(&mut self, peer: SocketAddr) -> Result<Dispatch, ProtocolError> {
        if self.phase != ClientPhase::ConnectionRequested || self.server != Some(peer) {
            debug!(%peer, phase = %self.phase, "unexpected connection acceptance");
            return Ok(Dispatch::Ignored);
        }
        self.phase = ClientPhase::Connected;
        info!(server = %peer, "connected, announcing");
        if let Err(e) = self.send(&Message::NewPlayer) {
            // The server only assigns an identity in reply to `NewPlayer`.
            if let Err(close) = self.transport.disconnect(peer) {
                debug!(%peer, error = %close, "close after failed announce");
            }
            self.reset_session("announce failed");
            return Err(e);
        }
        Ok(Dispatch::Consumed)
    }

    fn handle_connection_ended(&mut self, peer: SocketAddr, reason: &str) -> Dispatch {
        if self.server != Some(peer) {
            return Dispatch::Ignored;
        }
        warn!(%peer, reason, "connection to server ended");
        self.reset_session(reason);
        Dispatch::Consumed
    }

    fn handle_connection_index(&mut self, index: u32) -> Dispatch {
        if self.connection_index.is_some() {
            return Dispatch::Ignored;
        }
        debug!(index, "connection index received");
        self.connection_index = Some(index);
        Dispatch::Consumed
    }

    fn handle_client_id(&mut self, raw: OwnerId) -> Result<Dispatch, ProtocolError> {
        if self.identity.is_some() {
            debug!(raw, "identity already assigned, ignoring");
            return Ok(Dispatch::Ignored);
        }
        if self.phase != ClientPhase::Connected {
            return Err(self.unexpected(&Message::ClientId(raw)));
        }
        let identity = self.client_slot(raw)?;

        // Everyone who joined earlier owns a slot below ours.
        for earlier in 1..raw {
            if let Some(other) = ClientId::new(earlier) {
                self.table.assign(earlier, Authority::Client(other))?;
            }
        }
        self.table.assign(raw, Authority::Client(identity))?;
        self.identity = Some(identity);
        self.phase = ClientPhase::Identified;
        info!(%identity, "identity assigned");
        Ok(Dispatch::Consumed)
    }

    fn handle_other_client_id(&mut self, raw: OwnerId) -> Result<Dispatch, ProtocolError> {
        if matches!(
            self.phase,
            ClientPhase::Disconnected | ClientPhase::ConnectionRequested
        ) {
            return Err(self.unexpected(&Message::OtherClientId(raw)));
        }
        let other = self.client_slot(raw)?;
        if self.identity == Some(other) {
            return Err(ProtocolError::InvalidIdentity(raw));
        }
        self.table.assign(raw, Authority::Client(other))?;
        debug!(client = %other, "peer joined");
        Ok(Dispatch::Consumed)
    }

    /// Copy every entry not owned by us. Returns how many were applied.
    fn apply_entries(&mut self, entries: &[SnapshotEntry], local: Authority) -> usize {
        let mut applied = 0;
        for entry in entries {
            if entry.slot == local.owner() {
                continue;
            }
            match self.table.apply_remote(entry.slot, entry.state, local) {
                Ok(()) => applied += 1,
                Err(e) => {
                    self.stats.rejected += 1;
                    warn!(slot = entry.slot, error = %e, "snapshot entry dropped");
                }
            }
        }
        applied
    }

    fn handle_initial_parameters(
        &mut self,
        entries: Vec<SnapshotEntry>,
    ) -> Result<Dispatch, ProtocolError> {
        let (Some(identity), ClientPhase::Identified) = (self.identity, self.phase) else {
            return Err(self.unexpected(&Message::InitialParameters(entries)));
        };
        self.phase = ClientPhase::ReceivingInitialSnapshot;
        let local = Authority::Client(identity);
        let applied = self.apply_entries(&entries, local);

        let spawn = ObjectState::client_spawn(identity.get());
        *self.table.write(identity.get(), local)? = spawn;
        self.phase = ClientPhase::Synchronized;
        info!(%identity, applied, "initial snapshot applied, synchronized");

        if let Err(e) = self.send(&Message::InitialClientParameters(spawn)) {
            // The first position report carries the same state.
            warn!(%identity, error = %e, "initial state not sent");
        }
        Ok(Dispatch::Consumed)
    }

    fn handle_initial_client_parameters(
        &mut self,
        state: ObjectState,
    ) -> Result<Dispatch, ProtocolError> {
        let Some(local) = self.local() else {
            return Err(self.unexpected(&Message::InitialClientParameters(state)));
        };
        self.table.apply_remote(state.owner, state, local)?;
        debug!(owner = state.owner, "peer initial state received");
        Ok(Dispatch::Consumed)
    }

    fn handle_object_updates(
        &mut self,
        entries: Vec<SnapshotEntry>,
        transit: Duration,
    ) -> Result<Dispatch, ProtocolError> {
        let (Some(identity), ClientPhase::Synchronized) = (self.identity, self.phase) else {
            return Err(self.unexpected(&Message::SendObjectUpdates(entries)));
        };
        let local = Authority::Client(identity);
        let reconciler = self.config.reconciler;

        for entry in &entries {
            if entry.slot == identity.get() {
                continue;
            }
            let outcome = self.table.merge_remote(entry.slot, &entry.state, local, |held, new| {
                reconciler.reconcile(held, new, transit)
            });
            match outcome {
                Ok(Correction::Interpolated { .. }) => self.stats.interpolated += 1,
                Ok(correction @ Correction::Snapped { .. }) => {
                    self.stats.snapped += 1;
                    trace!(
                        slot = entry.slot,
                        discrepancy = correction.discrepancy(),
                        "snapped"
                    );
                }
                Err(e) => {
                    self.stats.rejected += 1;
                    warn!(slot = entry.slot, error = %e, "update entry dropped");
                }
            }
        }
        Ok(Dispatch::Consumed)
    }
}

impl<T: Transport, C: Clock> Router for ClientEndpoint<T, C> {
    fn on_notification(&mut self, event: TransportEvent) -> Result<Dispatch, ProtocolError> {
        match event {
            TransportEvent::ConnectionAccepted { peer } => self.handle_connection_accepted(peer),
            TransportEvent::Disconnected { peer } => {
                Ok(self.handle_connection_ended(peer, "disconnected"))
            }
            TransportEvent::ConnectionLost { peer } => {
                Ok(self.handle_connection_ended(peer, "connection lost"))
            }
            TransportEvent::NoFreeIncomingConnections { peer } => {
                Ok(self.handle_connection_ended(peer, "server full"))
            }
            TransportEvent::ConnectionAttemptFailed { peer } => {
                Ok(self.handle_connection_ended(peer, "connection attempt failed"))
            }
            TransportEvent::NewIncomingConnection { peer, .. } => {
                debug!(%peer, "clients do not accept connections");
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
        transit: Duration,
    ) -> Result<Dispatch, ProtocolError> {
        if self.server != Some(from) {
            return Err(ProtocolError::ForeignSender(from));
        }
        match envelope.message {
            Message::ConnectionIndex(index) => Ok(self.handle_connection_index(index)),
            Message::ClientId(raw) => self.handle_client_id(raw),
            Message::OtherClientId(raw) => self.handle_other_client_id(raw),
            Message::InitialParameters(entries) => self.handle_initial_parameters(entries),
            Message::InitialClientParameters(state) => {
                self.handle_initial_client_parameters(state)
            }
            Message::SendObjectUpdates(entries) => self.handle_object_updates(entries, transit),
            ref other @ (Message::NewPlayer | Message::SendPosition(_)) => {
                Err(self.unexpected(other))
            }
        }
    }
}

impl<T: Transport, C: Clock> Endpoint for ClientEndpoint<T, C> {
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
        if let Err(e) = self.physics_step(dt) {
            warn!(error = %e, "physics step failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use netsync_math::{GRAVITY, Vec3};
    use netsync_net::{ManualClock, MemoryNetwork, MemoryTransport, Timestamp, messages};

    use std::cell::Cell;
    use std::rc::Rc;

    use netsync_net::Reliability;

    use super::*;

    /// Memory transport whose next `failures` sends return an I/O error.
    struct Flaky {
        inner: MemoryTransport,
        failures: Rc<Cell<usize>>,
    }

    impl Transport for Flaky {
        fn connect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
            self.inner.connect(addr)
        }

        fn send(
            &mut self,
            payload: &[u8],
            reliability: Reliability,
            channel: u8,
            recipient: Recipient,
        ) -> Result<(), NetError> {
            let pending = self.failures.get();
            if pending > 0 {
                self.failures.set(pending - 1);
                return Err(NetError::Io(std::io::Error::other("link down")));
            }
            self.inner.send(payload, reliability, channel, recipient)
        }

        fn poll(&mut self) -> Option<TransportEvent> {
            self.inner.poll()
        }

        fn disconnect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
            self.inner.disconnect(addr)
        }

        fn local_addr(&self) -> SocketAddr {
            self.inner.local_addr()
        }
    }

    struct Harness {
        client: ClientEndpoint<Flaky, ManualClock>,
        server: MemoryTransport,
        clock: ManualClock,
        failures: Rc<Cell<usize>>,
    }

    impl Harness {
        fn new(config: ClientConfig) -> Self {
            let net = MemoryNetwork::new();
            let server = net.bind(4);
            let clock = ManualClock::new(Timestamp(10_000));
            let failures = Rc::new(Cell::new(0));
            let transport = Flaky {
                inner: net.bind(0),
                failures: Rc::clone(&failures),
            };
            let client = ClientEndpoint::new(transport, clock.clone(), config);
            Self {
                client,
                server,
                clock,
                failures,
            }
        }

        /// Make the client's next `count` sends fail.
        fn fail_sends(&self, count: usize) {
            self.failures.set(count);
        }

        fn connected() -> Self {
            let mut h = Self::new(ClientConfig::default().with_capacity(8));
            h.client.connect(h.server.local_addr()).unwrap();
            h.client.drain();
            h.inbox();
            h
        }

        fn synchronized(identity: OwnerId) -> Self {
            let mut h = Self::connected();
            h.say(Message::ClientId(identity));
            h.say(Message::InitialParameters(Vec::new()));
            h.client.drain();
            h.inbox();
            h
        }

        fn say(&mut self, message: Message) {
            self.say_at(message, self.clock.now());
        }

        fn say_at(&mut self, message: Message, sent_at: Timestamp) {
            self.say_raw(&message.encode(sent_at), message.id().reliability());
        }

        fn say_raw(&mut self, bytes: &[u8], reliability: Reliability) {
            self.server
                .send(bytes, reliability, 0, Recipient::To(self.client.local_addr()))
                .unwrap();
        }

        /// Messages the server side received.
        fn inbox(&mut self) -> Vec<Message> {
            std::iter::from_fn(|| self.server.poll())
                .filter_map(|event| match event {
                    TransportEvent::Message { payload, .. } => {
                        Some(messages::decode(&payload).unwrap().message)
                    }
                    _ => None,
                })
                .collect()
        }
    }

    fn entry(slot: OwnerId, owner: OwnerId, z: f32) -> SnapshotEntry {
        SnapshotEntry {
            slot,
            state: ObjectState {
                owner,
                position: Vec3::new(0.0, 0.0, z),
                ..ObjectState::REST
            },
        }
    }

    #[test]
    fn test_connect_announces_new_player() {
        let mut h = Harness::new(ClientConfig::default());
        assert_eq!(h.client.phase(), ClientPhase::Disconnected);
        h.client.connect(h.server.local_addr()).unwrap();
        assert_eq!(h.client.phase(), ClientPhase::ConnectionRequested);
        h.client.drain();
        assert_eq!(h.client.phase(), ClientPhase::Connected);
        assert_eq!(h.inbox(), vec![Message::NewPlayer]);
    }

    #[test]
    fn test_connect_twice_fails() {
        let mut h = Harness::connected();
        let addr = h.server.local_addr();
        assert!(matches!(
            h.client.connect(addr),
            Err(ProtocolError::Net(NetError::AlreadyConnected(_)))
        ));
    }

    #[test]
    fn test_client_id_claims_slots() {
        let mut h = Harness::connected();
        h.say(Message::ConnectionIndex(4));
        h.say(Message::ClientId(3));
        h.client.drain();

        assert_eq!(h.client.phase(), ClientPhase::Identified);
        assert_eq!(h.client.identity(), ClientId::new(3));
        assert_eq!(h.client.connection_index(), Some(4));
        assert_eq!(h.client.table().get(1).unwrap().owner, 1);
        assert_eq!(h.client.table().get(2).unwrap().owner, 2);
        assert_eq!(h.client.table().get(3).unwrap().owner, 3);
        assert_eq!(h.client.table().get(4).unwrap().owner, 0);
    }

    #[test]
    fn test_identity_is_immutable() {
        let mut h = Harness::connected();
        h.say(Message::ClientId(1));
        h.say(Message::ClientId(2));
        h.client.drain();
        assert_eq!(h.client.identity(), ClientId::new(1));
    }

    #[test]
    fn test_out_of_range_identity_rejected() {
        let mut h = Harness::connected();
        h.say(Message::ClientId(200));
        h.say(Message::ClientId(0));
        h.client.drain();
        assert_eq!(h.client.phase(), ClientPhase::Connected);
        assert!(h.client.identity().is_none());
    }

    #[test]
    fn test_initial_snapshot_synchronizes() {
        let mut h = Harness::connected();
        h.say(Message::ClientId(2));
        h.say(Message::InitialParameters(vec![
            entry(0, 0, 5.0),
            entry(1, 1, 7.0),
            entry(3, 0, 9.0),
        ]));
        h.client.drain();

        assert_eq!(h.client.phase(), ClientPhase::Synchronized);
        assert_eq!(h.client.table().get(1).unwrap().position.z, 7.0);
        assert_eq!(h.client.table().get(3).unwrap().position.z, 9.0);

        let own = h.client.own_state().unwrap();
        assert_eq!(own, &ObjectState::client_spawn(2));
        assert_eq!(
            h.inbox(),
            vec![Message::InitialClientParameters(ObjectState::client_spawn(2))]
        );
    }

    #[test]
    fn test_failed_initial_report_still_synchronizes() {
        let mut h = Harness::connected();
        h.say(Message::ClientId(2));
        h.say(Message::InitialParameters(vec![entry(1, 1, 7.0)]));
        h.fail_sends(1);
        h.client.drain();

        assert_eq!(h.client.phase(), ClientPhase::Synchronized);
        assert_eq!(h.client.table().get(1).unwrap().position.z, 7.0);
        assert!(h.inbox().is_empty());

        // The next frame delivers the own state instead.
        h.client.step(0.0);
        assert_eq!(
            h.inbox(),
            vec![Message::SendPosition(ObjectState::client_spawn(2))]
        );
    }

    #[test]
    fn test_failed_announce_drops_connection() {
        let mut h = Harness::new(ClientConfig::default());
        let server = h.server.local_addr();
        h.client.connect(server).unwrap();
        h.fail_sends(1);
        h.client.drain();

        assert_eq!(h.client.phase(), ClientPhase::Disconnected);
        assert!(h.client.server_addr().is_none());
        assert!(h.inbox().is_empty());

        // A fresh attempt goes through.
        h.client.connect(server).unwrap();
        h.client.drain();
        assert_eq!(h.client.phase(), ClientPhase::Connected);
        assert_eq!(h.inbox(), vec![Message::NewPlayer]);
    }

    #[test]
    fn test_truncated_initial_snapshot_dropped() {
        let mut h = Harness::connected();
        h.say(Message::ClientId(2));
        h.client.drain();

        let bytes = Message::InitialParameters(vec![entry(3, 0, 9.0)]).encode(h.clock.now());
        h.say_raw(&bytes[..bytes.len() - 5], Reliability::ReliableOrdered);
        h.client.drain();

        assert_eq!(h.client.phase(), ClientPhase::Identified);
        assert_eq!(h.client.table().get(3).unwrap(), &ObjectState::REST);
        assert!(h.inbox().is_empty());
    }

    #[test]
    fn test_truncated_updates_dropped() {
        let mut h = Harness::synchronized(1);
        let before = h.client.table().clone();

        let updates = Message::SendObjectUpdates(vec![entry(2, 0, 1.0), entry(3, 0, 50.0)]);
        let bytes = updates.encode(h.clock.now());
        h.say_raw(&bytes[..bytes.len() - 1], Reliability::UnreliableSequenced);
        h.client.drain();

        assert_eq!(h.client.phase(), ClientPhase::Synchronized);
        assert_eq!(h.client.table(), &before);
        assert_eq!(h.client.stats(), ReconcileStats::default());
    }

    #[test]
    fn test_snapshot_cannot_overwrite_own_slot() {
        let mut h = Harness::connected();
        h.say(Message::ClientId(1));
        h.say(Message::InitialParameters(vec![
            entry(1, 0, 55.0),
            entry(2, 1, 66.0),
            entry(900, 0, 1.0),
        ]));
        h.client.drain();

        assert_eq!(h.client.own_state().unwrap().position.z, 20.0);
        assert_eq!(h.client.table().get(2).unwrap(), &ObjectState::REST);
        assert_eq!(h.client.stats().rejected, 2);
    }

    #[test]
    fn test_snapshot_out_of_phase_ignored() {
        let mut h = Harness::connected();
        h.say(Message::InitialParameters(vec![entry(3, 0, 9.0)]));
        h.client.drain();
        assert_eq!(h.client.phase(), ClientPhase::Connected);
        assert_eq!(h.client.table().get(3).unwrap().position.z, 0.0);
    }

    #[test]
    fn test_updates_reconcile() {
        let mut h = Harness::synchronized(1);
        h.say(Message::SendObjectUpdates(vec![
            entry(2, 0, 1.0),
            entry(3, 0, 50.0),
        ]));
        h.client.drain();

        // Slot 2 was at rest at 0: within threshold, and zero transit leaves
        // the position where it was.
        assert_eq!(h.client.table().get(2).unwrap().position.z, 0.0);
        assert_eq!(h.client.table().get(3).unwrap().position.z, 50.0);
        let stats = h.client.stats();
        assert_eq!(stats.interpolated, 1);
        assert_eq!(stats.snapped, 1);
    }

    #[test]
    fn test_updates_use_transit_time() {
        let mut h = Harness::synchronized(1);
        let sent = Timestamp(h.clock.now().millis() - 500);
        h.say_at(Message::SendObjectUpdates(vec![entry(2, 0, 1.0)]), sent);
        h.client.drain();
        assert_eq!(h.client.table().get(2).unwrap().position.z, 0.5);
    }

    #[test]
    fn test_updates_never_touch_own_object() {
        let mut h = Harness::synchronized(1);
        h.say(Message::SendObjectUpdates(vec![entry(1, 0, 80.0), entry(2, 1, 80.0)]));
        h.client.drain();
        assert_eq!(h.client.own_state().unwrap().position.z, 20.0);
        assert_eq!(h.client.table().get(2).unwrap().position.z, 0.0);
        assert_eq!(h.client.stats().rejected, 1);
    }

    #[test]
    fn test_other_client_id_reserves_slot() {
        let mut h = Harness::synchronized(1);
        h.say(Message::OtherClientId(4));
        h.say(Message::OtherClientId(1));
        h.client.drain();
        assert_eq!(h.client.table().get(4).unwrap().owner, 4);
        assert_eq!(h.client.own_state().unwrap().owner, 1);
    }

    #[test]
    fn test_peer_initial_state_copied() {
        let mut h = Harness::synchronized(1);
        let mut peer = ObjectState::client_spawn(2);
        peer.position.x = 3.0;
        h.say(Message::InitialClientParameters(peer));
        h.say(Message::InitialClientParameters(ObjectState::client_spawn(1)));
        h.client.drain();
        assert_eq!(h.client.table().get(2).unwrap(), &peer);
        assert_eq!(h.client.own_state().unwrap(), &ObjectState::client_spawn(1));
    }

    #[test]
    fn test_step_integrates_and_reports() {
        let mut h = Harness::synchronized(1);
        h.client.step(1.0);
        let own = *h.client.own_state().unwrap();
        assert_eq!(own.velocity, GRAVITY);
        assert_eq!(own.position, Vec3::new(0.0, 0.0, 17.0));
        assert_eq!(h.inbox(), vec![Message::SendPosition(own)]);
    }

    #[test]
    fn test_step_before_sync_is_silent() {
        let mut h = Harness::connected();
        h.client.step(1.0);
        assert!(h.inbox().is_empty());
    }

    #[test]
    fn test_extrapolate_remote() {
        let mut h = Harness::new(
            ClientConfig::default()
                .with_capacity(4)
                .with_extrapolate_remote(true),
        );
        h.client.connect(h.server.local_addr()).unwrap();
        h.client.drain();
        h.say(Message::ClientId(1));
        let mut moving = entry(2, 0, 0.0);
        moving.state.velocity = Vec3::new(2.0, 0.0, 0.0);
        h.say(Message::InitialParameters(vec![moving]));
        h.client.drain();

        h.client.step(0.5);
        assert_eq!(h.client.table().get(2).unwrap().position.x, 1.0);
    }

    #[test]
    fn test_connection_lost_disconnects() {
        let mut h = Harness::synchronized(1);
        let server = h.server.local_addr();
        h.server.disconnect(h.client.local_addr()).unwrap();
        h.client.drain();
        assert_eq!(h.client.phase(), ClientPhase::Disconnected);
        assert!(h.client.identity().is_none());
        assert!(h.client.server_addr().is_none());

        // Reconnecting starts over.
        h.client.connect(server).unwrap();
        assert_eq!(h.client.phase(), ClientPhase::ConnectionRequested);
    }

    #[test]
    fn test_connection_attempt_failed() {
        let mut h = Harness::new(ClientConfig::default());
        let nowhere = SocketAddr::from(([127, 0, 0, 1], 1));
        h.client.connect(nowhere).unwrap();
        h.client.drain();
        assert_eq!(h.client.phase(), ClientPhase::Disconnected);
    }

    #[test]
    fn test_disconnect() {
        let mut h = Harness::synchronized(1);
        h.client.disconnect().unwrap();
        assert_eq!(h.client.phase(), ClientPhase::Disconnected);
        assert!(matches!(
            h.client.disconnect(),
            Err(ProtocolError::Net(NetError::NotConnected))
        ));
    }
}
