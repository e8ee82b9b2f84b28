//! Endpoint configuration.

use netsync_state::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};

use crate::reconcile::Reconciler;
use crate::spawn::SpawnPattern;
use crate::tick::TickConfig;

/// Height at or below which a server-owned object is wrapped.
pub const DEFAULT_FLOOR: f32 = -100.0;

/// Height a wrapped object reappears at.
pub const DEFAULT_CEILING: f32 = 100.0;

/// Configuration for a [`ServerEndpoint`](crate::ServerEndpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Number of table slots.
    pub capacity: usize,
    /// Update loop timing.
    pub tick: TickConfig,
    /// Wrap height for falling objects.
    pub floor: f32,
    /// Height wrapped objects are moved to.
    pub ceiling: f32,
    /// Initial population of server-owned slots.
    pub spawn: SpawnPattern,
    /// RNG seed for the spawn pattern; random if unset.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            tick: TickConfig::default(),
            floor: DEFAULT_FLOOR,
            ceiling: DEFAULT_CEILING,
            spawn: SpawnPattern::default(),
            seed: None,
        }
    }
}

impl ServerConfig {
    /// Set the table capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the loop timing.
    #[must_use]
    pub fn with_tick(mut self, tick: TickConfig) -> Self {
        self.tick = tick;
        self
    }

    /// Set the floor and ceiling heights.
    #[must_use]
    pub fn with_wrap(mut self, floor: f32, ceiling: f32) -> Self {
        self.floor = floor;
        self.ceiling = ceiling;
        self
    }

    /// Set the spawn pattern.
    #[must_use]
    pub fn with_spawn(mut self, spawn: SpawnPattern) -> Self {
        self.spawn = spawn;
        self
    }

    /// Seed the spawn RNG.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Configuration for a [`ClientEndpoint`](crate::ClientEndpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Number of table slots. Must match the server.
    pub capacity: usize,
    /// Update loop timing.
    pub tick: TickConfig,
    /// Interpolate-or-snap policy for incoming updates.
    pub reconciler: Reconciler,
    /// Advance mirrored objects locally between updates.
    pub extrapolate_remote: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            tick: TickConfig::default(),
            reconciler: Reconciler::default(),
            extrapolate_remote: false,
        }
    }
}

impl ClientConfig {
    /// Set the table capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the loop timing.
    #[must_use]
    pub fn with_tick(mut self, tick: TickConfig) -> Self {
        self.tick = tick;
        self
    }

    /// Set the reconciliation policy.
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Enable or disable local dead reckoning of mirrored objects.
    #[must_use]
    pub fn with_extrapolate_remote(mut self, enabled: bool) -> Self {
        self.extrapolate_remote = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::DiscrepancyMetric;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.capacity, 128);
        assert_eq!(config.floor, -100.0);
        assert_eq!(config.ceiling, 100.0);
        assert_eq!(config.spawn, SpawnPattern::Grid);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_client_builders() {
        let config = ClientConfig::default()
            .with_capacity(16)
            .with_extrapolate_remote(true)
            .with_reconciler(Reconciler::default().with_metric(DiscrepancyMetric::VerticalAxis));
        assert_eq!(config.capacity, 16);
        assert!(config.extrapolate_remote);
        assert_eq!(config.reconciler.threshold, 2.0);
        assert_eq!(config.reconciler.metric, DiscrepancyMetric::VerticalAxis);
    }

    #[test]
    fn test_config_serializes() {
        let config = ServerConfig::default().with_seed(3);
        let json = serde_json::to_string(&config).unwrap();
        let restored: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
