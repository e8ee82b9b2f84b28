//! Whole-session scenarios over the in-memory transport.

use std::time::Duration;

use netsync_math::Vec3;
use netsync_net::{ManualClock, MemoryNetwork, MemoryTransport, Timestamp};
use netsync_protocol::{
    ClientConfig, ClientEndpoint, ClientPhase, Endpoint, ServerConfig, ServerEndpoint,
    SpawnPattern, TickConfig, TickLoop,
};
use netsync_state::{Authority, ObjectState};

type Server = ServerEndpoint<MemoryTransport, ManualClock>;
type Client = ClientEndpoint<MemoryTransport, ManualClock>;

const CAPACITY: usize = 16;

fn server(net: &MemoryNetwork, clock: &ManualClock, spawn: SpawnPattern) -> Server {
    let config = ServerConfig::default()
        .with_capacity(CAPACITY)
        .with_spawn(spawn)
        .with_seed(11);
    ServerEndpoint::new(net.bind(8), clock.clone(), config)
}

fn client(net: &MemoryNetwork, clock: &ManualClock) -> Client {
    let config = ClientConfig::default().with_capacity(CAPACITY);
    ClientEndpoint::new(net.bind(0), clock.clone(), config)
}

/// Drain every endpoint until the network is quiet.
fn settle(server: &mut Server, clients: &mut [&mut Client]) {
    for _ in 0..32 {
        let mut handled = server.drain();
        for client in clients.iter_mut() {
            handled += client.drain();
        }
        if handled == 0 {
            return;
        }
    }
    panic!("network never settled");
}

#[test]
fn test_two_clients_join() {
    let net = MemoryNetwork::new();
    let clock = ManualClock::new(Timestamp(1_000));
    let mut server = server(&net, &clock, SpawnPattern::Rest);
    let mut a = client(&net, &clock);
    let mut b = client(&net, &clock);

    a.connect(server.local_addr()).unwrap();
    settle(&mut server, &mut [&mut a]);
    assert_eq!(a.phase(), ClientPhase::Synchronized);
    assert_eq!(a.identity().map(|id| id.get()), Some(1));
    assert_eq!(a.connection_index(), Some(0));

    // A moves before B arrives.
    a.step(1.0);
    let a_state = *a.own_state().unwrap();
    settle(&mut server, &mut [&mut a]);
    assert_eq!(server.table().get(1).unwrap(), &a_state);

    b.connect(server.local_addr()).unwrap();
    settle(&mut server, &mut [&mut a, &mut b]);
    assert_eq!(b.phase(), ClientPhase::Synchronized);
    assert_eq!(b.identity().map(|id| id.get()), Some(2));

    // B's initial snapshot carried A's last report.
    assert_eq!(b.table().get(1).unwrap(), &a_state);
    // A reserved a slot for B and then received B's initial state.
    assert_eq!(a.table().get(2).unwrap(), &ObjectState::client_spawn(2));
    assert_eq!(server.connections().identified_count(), 2);
}

#[test]
fn test_updates_flow_between_clients() {
    let net = MemoryNetwork::new();
    let clock = ManualClock::new(Timestamp(1_000));
    let mut server = server(&net, &clock, SpawnPattern::Grid);
    let mut a = client(&net, &clock);
    let mut b = client(&net, &clock);
    a.connect(server.local_addr()).unwrap();
    b.connect(server.local_addr()).unwrap();
    settle(&mut server, &mut [&mut a, &mut b]);

    for _ in 0..10 {
        clock.advance(Duration::from_millis(100));
        server.step(0.1);
        a.step(0.1);
        b.step(0.1);
        settle(&mut server, &mut [&mut a, &mut b]);
    }

    // Each client mirrors the other's object exactly: the reports arrive with
    // zero transit and the discrepancy stays under the threshold, but the
    // last reply to A was built before B's final report, so allow one frame.
    let b_on_server = server.table().get(2).unwrap().position;
    let b_on_a = a.table().get(2).unwrap().position;
    assert!(b_on_server.distance(b_on_a) < 2.0);

    // Server-owned objects keep moving on every client.
    let server_obj = server.table().get(5).unwrap();
    let mirrored = a.table().get(5).unwrap();
    assert_eq!(server_obj.authority(), Authority::Server);
    assert!(server_obj.position.distance(mirrored.position) < 2.0);
    assert!(a.stats().interpolated + a.stats().snapped > 0);
}

#[test]
fn test_departed_client_slot_returns_to_server() {
    let net = MemoryNetwork::new();
    let clock = ManualClock::new(Timestamp(1_000));
    let mut server = server(&net, &clock, SpawnPattern::Rest);
    let mut a = client(&net, &clock);
    let mut b = client(&net, &clock);
    a.connect(server.local_addr()).unwrap();
    b.connect(server.local_addr()).unwrap();
    settle(&mut server, &mut [&mut a, &mut b]);

    b.disconnect().unwrap();
    settle(&mut server, &mut [&mut a, &mut b]);
    assert_eq!(server.connections().len(), 1);
    assert_eq!(server.table().get(2).unwrap(), &ObjectState::REST);

    // A's next exchange picks up the released slot.
    a.step(0.0);
    settle(&mut server, &mut [&mut a]);
    assert_eq!(a.table().authority_of(2).unwrap(), Authority::Server);
    assert_eq!(a.table().get(2).unwrap().position, Vec3::ZERO);
}

#[test]
fn test_server_full() {
    let net = MemoryNetwork::new();
    let clock = ManualClock::default();
    let config = ServerConfig::default()
        .with_capacity(CAPACITY)
        .with_spawn(SpawnPattern::Rest);
    let mut server = ServerEndpoint::new(net.bind(1), clock.clone(), config);
    let mut a = client(&net, &clock);
    let mut b = client(&net, &clock);
    a.connect(server.local_addr()).unwrap();
    b.connect(server.local_addr()).unwrap();
    settle(&mut server, &mut [&mut a, &mut b]);

    assert_eq!(a.phase(), ClientPhase::Synchronized);
    assert_eq!(b.phase(), ClientPhase::Disconnected);
}

#[test]
fn test_lost_server_drops_client() {
    let net = MemoryNetwork::new();
    let clock = ManualClock::default();
    let mut server = server(&net, &clock, SpawnPattern::Rest);
    let mut a = client(&net, &clock);
    a.connect(server.local_addr()).unwrap();
    settle(&mut server, &mut [&mut a]);

    net.sever(a.local_addr(), server.local_addr());
    settle(&mut server, &mut [&mut a]);
    assert_eq!(a.phase(), ClientPhase::Disconnected);
    assert!(server.connections().is_empty());
}

#[tokio::test]
async fn test_tick_loops_drive_session() {
    let net = MemoryNetwork::new();
    let clock = ManualClock::default();
    let tick = TickConfig::default()
        .with_frame_interval(Duration::ZERO)
        .with_poll_interval(Duration::ZERO)
        .with_max_ticks(4);

    let server = server(&net, &clock, SpawnPattern::Rest);
    let mut client = client(&net, &clock);
    client.connect(server.local_addr()).unwrap();

    let mut server_loop = TickLoop::new(server, tick.clone());
    let mut client_loop = TickLoop::new(client, tick);
    for _ in 0..4 {
        client_loop.tick(Duration::ZERO);
        server_loop.tick(Duration::ZERO);
    }
    assert_eq!(client_loop.endpoint().phase(), ClientPhase::Synchronized);

    server_loop.run().await;
    assert_eq!(server_loop.tick_id(), 8);
}
