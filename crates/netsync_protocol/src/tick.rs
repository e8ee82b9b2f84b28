//! Endpoint update loop.
//!
//! Every tick drains and dispatches all pending transport events, then feeds
//! the elapsed time to a [`FrameGate`]. Physics only runs when the gate opens,
//! so message handling stays responsive while the simulation advances at the
//! configured frame rate.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

/// Timing of the update loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickConfig {
    /// Minimum time between physics steps.
    pub frame_interval: Duration,
    /// Pause between ticks.
    pub poll_interval: Duration,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_micros(16_667),
            poll_interval: Duration::from_millis(1),
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Set the physics frame interval.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the pause between ticks.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stop after `max_ticks` ticks (0 = never).
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }
}

/// Accumulates elapsed time and opens once per frame interval.
#[derive(Debug, Clone)]
pub struct FrameGate {
    interval: Duration,
    accumulated: Duration,
}

impl FrameGate {
    /// Create a closed gate.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
        }
    }

    /// Add `elapsed`. If a full interval has passed, returns everything
    /// accumulated since the last opening as `dt` seconds and starts over.
    pub fn advance(&mut self, elapsed: Duration) -> Option<f32> {
        self.accumulated += elapsed;
        if self.accumulated < self.interval {
            return None;
        }
        let dt = self.accumulated.as_secs_f32();
        self.accumulated = Duration::ZERO;
        Some(dt)
    }

    /// Time accumulated toward the next opening.
    #[must_use]
    pub fn pending(&self) -> Duration {
        self.accumulated
    }
}

/// Something the update loop can drive.
pub trait Endpoint {
    /// Dispatch every pending inbound event. Returns how many were handled.
    fn drain(&mut self) -> usize;

    /// Advance owned objects by `dt` seconds and send whatever follows a step.
    fn step(&mut self, dt: f32);
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Events dispatched.
    pub events: usize,
    /// Physics step length, if the gate opened.
    pub dt: Option<f32>,
}

/// Drives an [`Endpoint`] at a fixed frame rate.
#[derive(Debug)]
pub struct TickLoop<E> {
    endpoint: E,
    gate: FrameGate,
    config: TickConfig,
    tick_id: u64,
}

impl<E: Endpoint> TickLoop<E> {
    /// Create a loop around `endpoint`.
    #[must_use]
    pub fn new(endpoint: E, config: TickConfig) -> Self {
        Self {
            endpoint,
            gate: FrameGate::new(config.frame_interval),
            config,
            tick_id: 0,
        }
    }

    /// Returns the number of ticks run.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the driven endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Returns the driven endpoint mutably.
    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    /// Consume the loop, returning the endpoint.
    pub fn into_endpoint(self) -> E {
        self.endpoint
    }

    /// Run one tick with `elapsed` wall time since the previous one.
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        self.tick_id += 1;
        let events = self.endpoint.drain();
        let dt = self.gate.advance(elapsed);
        if let Some(dt) = dt {
            self.endpoint.step(dt);
        }
        if events > 0 {
            debug!(tick_id = self.tick_id, events, "dispatched events");
        }
        TickOutcome { events, dt }
    }

    /// Tick until `max_ticks` is reached, or forever if it is zero.
    ///
    /// Runs on the current task; the only suspension point is the pause of
    /// `poll_interval` between ticks.
    pub async fn run(&mut self) {
        self.run_until(|_| false).await;
    }

    /// Like [`run`](Self::run), but also stops after any tick that leaves
    /// `done` returning `true` for the endpoint.
    pub async fn run_until(&mut self, mut done: impl FnMut(&E) -> bool) {
        info!(
            frame_interval_ms = self.config.frame_interval.as_millis() as u64,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_ticks = self.config.max_ticks,
            "starting update loop"
        );

        let mut last = Instant::now();
        let mut ticks = 0u64;
        loop {
            let now = Instant::now();
            self.tick(now.duration_since(last));
            last = now;

            ticks += 1;
            if self.config.max_ticks > 0 && ticks >= self.config.max_ticks {
                info!(ticks, "update loop complete");
                break;
            }
            if done(&self.endpoint) {
                info!(ticks, "update loop stopped");
                break;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        drains: usize,
        steps: Vec<f32>,
    }

    impl Endpoint for Counter {
        fn drain(&mut self) -> usize {
            self.drains += 1;
            0
        }

        fn step(&mut self, dt: f32) {
            self.steps.push(dt);
        }
    }

    #[test]
    fn test_gate_opens_after_interval() {
        let mut gate = FrameGate::new(Duration::from_millis(10));
        assert_eq!(gate.advance(Duration::from_millis(4)), None);
        assert_eq!(gate.advance(Duration::from_millis(4)), None);
        assert_eq!(gate.pending(), Duration::from_millis(8));
        assert_eq!(gate.advance(Duration::from_millis(4)), Some(0.012));
        assert_eq!(gate.pending(), Duration::ZERO);
    }

    #[test]
    fn test_zero_interval_always_open() {
        let mut gate = FrameGate::new(Duration::ZERO);
        assert_eq!(gate.advance(Duration::ZERO), Some(0.0));
    }

    #[test]
    fn test_tick_drains_before_stepping() {
        let config = TickConfig::default().with_frame_interval(Duration::from_millis(10));
        let mut tick_loop = TickLoop::new(Counter::default(), config);

        let outcome = tick_loop.tick(Duration::from_millis(5));
        assert_eq!(outcome.dt, None);
        let outcome = tick_loop.tick(Duration::from_millis(5));
        assert_eq!(outcome.dt, Some(0.01));

        assert_eq!(tick_loop.tick_id(), 2);
        assert_eq!(tick_loop.endpoint().drains, 2);
        assert_eq!(tick_loop.endpoint().steps, vec![0.01]);
    }

    #[tokio::test]
    async fn test_run_limited_ticks() {
        let config = TickConfig::default()
            .with_poll_interval(Duration::ZERO)
            .with_max_ticks(5);
        let mut tick_loop = TickLoop::new(Counter::default(), config);
        tick_loop.run().await;
        assert_eq!(tick_loop.tick_id(), 5);
        assert_eq!(tick_loop.into_endpoint().drains, 5);
    }

    #[tokio::test]
    async fn test_run_until_stops_early() {
        let config = TickConfig::default().with_poll_interval(Duration::ZERO);
        let mut tick_loop = TickLoop::new(Counter::default(), config);
        tick_loop.run_until(|counter| counter.drains >= 3).await;
        assert_eq!(tick_loop.tick_id(), 3);
    }
}
