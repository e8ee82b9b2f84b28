//! Send timestamps and transit-time estimates.
//!
//! Every outbound message carries the sender's clock reading in milliseconds.
//! The receiver subtracts it from its own reading to estimate how long the
//! message spent in flight; the estimate feeds the reconciliation step.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds on the sender's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Returns the raw millisecond count.
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }

    /// Time elapsed from `sent` to `self`, or zero if `sent` is later.
    ///
    /// Peers' clocks are not synchronised, so a message may appear to arrive
    /// before it was sent; that is treated as instantaneous delivery.
    #[must_use]
    pub fn transit_since(self, sent: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(sent.0))
    }
}

/// A source of timestamps.
pub trait Clock {
    /// Current reading.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A clock advanced by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Rc<Cell<u64>>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Rc::new(Cell::new(start.0)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let step = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.set(self.millis.get().saturating_add(step));
    }

    /// Set the reading.
    pub fn set(&self, to: Timestamp) {
        self.millis.set(to.0);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.get())
    }
}
