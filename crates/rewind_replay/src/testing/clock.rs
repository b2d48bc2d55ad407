//! Manually advanced wall clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::replay::WallClock;

/// A wall clock for deterministic tests.
///
/// Starts at zero and advances only through [`advance`](Self::advance).
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Move the clock forward in `step` increments, calling `on_step` after each.
    ///
    /// Mirrors how a real loop observes time: in ticks, not one jump.
    pub fn advance_in_steps(&self, total: Duration, step: Duration, mut on_step: impl FnMut()) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let next = step.min(total - elapsed);
            self.advance(next);
            elapsed += next;
            on_step();
        }
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
