//! # netsync_protocol
//!
//! The synchronization protocol: client and server endpoints that route
//! transport events to per-message handlers, the reconciliation rule the
//! client applies to incoming snapshots, and the loop that drives either
//! endpoint.
//!
//! - [`server`] — authoritative endpoint, identity assignment, floor wrap.
//! - [`client`] — join sequence, snapshot reconciliation, own-object reports.
//! - [`reconcile`] — interpolate-or-snap policy.
//! - [`router`] — shared dispatch and send helpers.
//! - [`tick`] — frame gate and update loop.
//! - [`spawn`] — initial population of server-owned slots.
//! - [`registry`] — the server's connection records.

pub mod client;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod router;
pub mod server;
pub mod spawn;
pub mod tick;

pub use client::{ClientEndpoint, ClientPhase, ReconcileStats};
pub use config::{ClientConfig, ServerConfig};
pub use error::ProtocolError;
pub use reconcile::{Correction, DiscrepancyMetric, Reconciler};
pub use registry::{ConnectionRecord, ConnectionRegistry};
pub use router::Dispatch;
pub use server::ServerEndpoint;
pub use spawn::SpawnPattern;
pub use tick::{Endpoint, FrameGate, TickConfig, TickLoop};
