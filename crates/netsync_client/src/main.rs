//! # netsync_client
//!
//! Connects to a server, joins the session, and mirrors the object table
//! while reporting its own object every frame. Runs until the
//! server connection ends.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use netsync_net::{SystemClock, UdpConfig, UdpTransport};
use netsync_protocol::{
    ClientConfig, ClientEndpoint, ClientPhase, DiscrepancyMetric, Reconciler, TickConfig,
    TickLoop,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Metric {
    /// Straight-line distance.
    Euclidean,
    /// Height difference only.
    Vertical,
}

impl From<Metric> for DiscrepancyMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Euclidean => DiscrepancyMetric::Euclidean,
            Metric::Vertical => DiscrepancyMetric::VerticalAxis,
        }
    }
}

#[derive(Parser)]
#[command(name = "netsync_client", about = "State-sync client over UDP")]
struct Args {
    /// Server address
    #[arg(short, long, env = "NETSYNC_SERVER", default_value = "127.0.0.1:7777")]
    server: SocketAddr,

    /// Number of object slots (must match the server)
    #[arg(long, default_value_t = default_capacity())]
    capacity: usize,

    /// Discrepancy at or above which updates snap instead of interpolating
    #[arg(long, default_value_t = 2.0)]
    threshold: f32,

    /// How discrepancy is measured
    #[arg(long, value_enum, default_value_t = Metric::Euclidean)]
    metric: Metric,

    /// Advance mirrored objects locally between updates
    #[arg(long)]
    extrapolate: bool,

    /// Physics frame length in milliseconds
    #[arg(long, default_value_t = 16.667)]
    frame_ms: f64,

    /// Stop after this many ticks (0 runs until the connection ends)
    #[arg(long, default_value_t = 0)]
    max_ticks: u64,
}

fn default_capacity() -> usize {
    ClientConfig::default().capacity
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("netsync_client=info".parse()?)
                .add_directive("netsync_protocol=info".parse()?),
        )
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.frame_ms >= 0.0, "frame length must not be negative");

    let tick = TickConfig::default()
        .with_frame_interval(Duration::from_secs_f64(args.frame_ms / 1_000.0))
        .with_max_ticks(args.max_ticks);
    let reconciler = Reconciler::default()
        .with_threshold(args.threshold)
        .with_metric(args.metric.into());
    let config = ClientConfig::default()
        .with_capacity(args.capacity)
        .with_tick(tick.clone())
        .with_reconciler(reconciler)
        .with_extrapolate_remote(args.extrapolate);

    let transport = UdpTransport::bind(UdpConfig::default().with_max_connections(0)).await?;
    let mut endpoint = ClientEndpoint::new(transport, SystemClock, config);
    endpoint.connect(args.server)?;
    info!(server = %args.server, local = %endpoint.local_addr(), "connecting");

    let mut tick_loop = TickLoop::new(endpoint, tick);
    let mut joined = false;
    tick_loop
        .run_until(|client| {
            // Stop once a client that got past `Disconnected` falls back to it.
            let disconnected = client.phase() == ClientPhase::Disconnected;
            let ended = joined && disconnected;
            joined |= !disconnected;
            ended
        })
        .await;

    let endpoint = tick_loop.into_endpoint();
    let stats = endpoint.stats();
    info!(
        phase = %endpoint.phase(),
        identity = ?endpoint.identity().map(|id| id.get()),
        interpolated = stats.interpolated,
        snapped = stats.snapped,
        rejected = stats.rejected,
        "client shut down"
    );
    Ok(())
}
