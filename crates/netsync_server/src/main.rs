//! # netsync_server
//!
//! The authoritative endpoint. Binds a UDP socket, populates the object
//! table, and runs the update loop.
//!
//! ## Startup Sequence
//!
//! 1. Bind the UDP transport (default `0.0.0.0:7777`).
//! 2. Seed and populate the server-owned slots.
//! 3. Enter the update loop: drain events, then integrate once per frame.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use netsync_net::{SystemClock, UdpConfig, UdpTransport};
use netsync_protocol::{ServerConfig, ServerEndpoint, SpawnPattern, TickConfig, TickLoop};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Spawn {
    /// Moving objects on a grid.
    Grid,
    /// Every object at the origin, at rest.
    Rest,
}

impl From<Spawn> for SpawnPattern {
    fn from(spawn: Spawn) -> Self {
        match spawn {
            Spawn::Grid => SpawnPattern::Grid,
            Spawn::Rest => SpawnPattern::Rest,
        }
    }
}

#[derive(Parser)]
#[command(name = "netsync_server", about = "Authoritative state-sync server over UDP")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: SocketAddr,

    /// Maximum simultaneous clients
    #[arg(short, long, default_value_t = 10)]
    max_clients: usize,

    /// Number of object slots (clients must use the same value)
    #[arg(long, default_value_t = default_capacity())]
    capacity: usize,

    /// Initial population of server-owned slots
    #[arg(long, value_enum, default_value_t = Spawn::Grid)]
    spawn: Spawn,

    /// Seed for the spawn pattern
    #[arg(long)]
    seed: Option<u64>,

    /// Physics frame length in milliseconds
    #[arg(long, default_value_t = 16.667)]
    frame_ms: f64,

    /// Stop after this many ticks (0 runs forever)
    #[arg(long, default_value_t = 0)]
    max_ticks: u64,
}

fn default_capacity() -> usize {
    ServerConfig::default().capacity
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("netsync_server=info".parse()?)
                .add_directive("netsync_protocol=info".parse()?),
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.frame_ms >= 0.0, "frame length must not be negative");

    let tick = TickConfig::default()
        .with_frame_interval(Duration::from_secs_f64(args.frame_ms / 1_000.0))
        .with_max_ticks(args.max_ticks);
    let mut config = ServerConfig::default()
        .with_capacity(args.capacity)
        .with_spawn(args.spawn.into())
        .with_tick(tick.clone());
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let transport = UdpTransport::bind(
        UdpConfig::default()
            .with_bind(args.bind)
            .with_max_connections(args.max_clients),
    )
    .await?;

    let endpoint = ServerEndpoint::new(transport, SystemClock, config);
    info!(
        addr = %endpoint.local_addr(),
        capacity = endpoint.table().capacity(),
        "server started"
    );

    let mut tick_loop = TickLoop::new(endpoint, tick);
    tick_loop.run().await;

    info!(
        ticks = tick_loop.tick_id(),
        clients = tick_loop.endpoint().connections().identified_count(),
        "server shut down"
    );
    Ok(())
}
