//! Reconciliation of received snapshots against local state.
//!
//! When the server's view of an object arrives, the client compares it with
//! its own copy. Small discrepancies are smoothed: position moves part of the
//! way toward the received one, by a fraction equal to the message's transit
//! time in seconds (clamped to `[0, 1]`), while velocity and acceleration are
//! adopted outright. Anything at or beyond the threshold is a teleport and the
//! whole state is replaced.

use std::time::Duration;

use netsync_math::Vec3;
use netsync_state::ObjectState;
use serde::{Deserialize, Serialize};

/// Discrepancy at or above which a correction snaps instead of interpolating.
pub const DEFAULT_THRESHOLD: f32 = 2.0;

/// How the distance between two positions is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiscrepancyMetric {
    /// Full Euclidean distance.
    #[default]
    Euclidean,
    /// Absolute difference along the vertical (z) axis only. Matches peers
    /// that judge discrepancy by height alone.
    VerticalAxis,
}

impl DiscrepancyMetric {
    /// Distance between `a` and `b` under this metric.
    #[must_use]
    pub fn measure(self, a: Vec3, b: Vec3) -> f32 {
        match self {
            Self::Euclidean => a.distance(b),
            Self::VerticalAxis => (a.z - b.z).abs(),
        }
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Position moved toward the received one by `fraction`.
    Interpolated { discrepancy: f32, fraction: f32 },
    /// The received state replaced the local one.
    Snapped { discrepancy: f32 },
}

impl Correction {
    /// Measured discrepancy before the correction.
    #[must_use]
    pub fn discrepancy(&self) -> f32 {
        match *self {
            Self::Interpolated { discrepancy, .. } | Self::Snapped { discrepancy } => discrepancy,
        }
    }

    /// Returns `true` for [`Correction::Snapped`].
    #[must_use]
    pub fn is_snap(&self) -> bool {
        matches!(self, Self::Snapped { .. })
    }
}

/// Interpolate-or-snap policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reconciler {
    /// Discrepancy at or above which the state snaps.
    pub threshold: f32,
    /// Distance measure.
    pub metric: DiscrepancyMetric,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            metric: DiscrepancyMetric::default(),
        }
    }
}

impl Reconciler {
    /// Set the snap threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the distance measure.
    #[must_use]
    pub fn with_metric(mut self, metric: DiscrepancyMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Merge `received` into `local`.
    ///
    /// The owner tag of `local` is left alone; the caller decides ownership.
    /// A non-finite discrepancy never compares below the threshold, so it
    /// always snaps.
    pub fn reconcile(
        &self,
        local: &mut ObjectState,
        received: &ObjectState,
        transit: Duration,
    ) -> Correction {
        let discrepancy = self.metric.measure(local.position, received.position);
        if discrepancy < self.threshold {
            let fraction = transit.as_secs_f32().clamp(0.0, 1.0);
            if fraction >= 1.0 {
                local.position = received.position;
            } else {
                local.position += (received.position - local.position) * fraction;
            }
            local.velocity = received.velocity;
            local.acceleration = received.acceleration;
            Correction::Interpolated {
                discrepancy,
                fraction,
            }
        } else {
            local.copy_kinematics(received);
            Correction::Snapped { discrepancy }
        }
    }
}
