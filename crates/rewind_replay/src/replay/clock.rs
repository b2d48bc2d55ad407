//! Virtual clock for deterministic replay timing.
//!
//! Maps wall-clock readings onto the event timeline through an anchor
//! `(wall_anchor, event_anchor, rate)`:
//!
//! ```text
//! position(now) = event_anchor + (now - wall_anchor) * rate
//! ```
//!
//! Every change (start, rate change, re-anchor) replaces the anchor at the
//! current wall reading, so already-elapsed real time is never rescaled.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic wall-clock source.
pub trait WallClock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin. Never decreases.
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Shared handle to a wall clock.
pub type SharedWallClock = Arc<dyn WallClock>;

/// The current wall-to-timeline mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Wall reading considered simultaneous with `event_anchor`.
    pub wall_anchor: Duration,
    /// Timeline coordinate at `wall_anchor`.
    pub event_anchor: f64,
    /// Playback speed multiplier.
    pub rate: f64,
}

/// A virtual clock for controlling replay timing.
pub struct VirtualClock {
    anchor: Anchor,
}

impl VirtualClock {
    /// Create a clock at timeline position zero.
    pub fn new(rate: f64) -> Self {
        Self {
            anchor: Anchor {
                wall_anchor: Duration::ZERO,
                event_anchor: 0.0,
                rate,
            },
        }
    }

    /// Get the current anchor.
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Get the current playback speed.
    pub fn rate(&self) -> f64 {
        self.anchor.rate
    }

    /// Establish a fresh anchor when playback starts.
    ///
    /// `earliest` is the earliest pending event time, if any.
    pub fn start(&mut self, now: Duration, earliest: Option<f64>) {
        self.anchor.wall_anchor = now;
        self.anchor.event_anchor = earliest.unwrap_or(0.0);
    }

    /// Timeline position at wall reading `now`.
    pub fn position_at(&self, now: Duration) -> f64 {
        let elapsed = now.as_secs_f64() - self.anchor.wall_anchor.as_secs_f64();
        self.anchor.event_anchor + elapsed * self.anchor.rate
    }

    /// Change speed from `now` on, keeping the current position.
    pub fn set_rate(&mut self, rate: f64, now: Duration) {
        self.anchor.event_anchor = self.position_at(now);
        self.anchor.wall_anchor = now;
        self.anchor.rate = rate;
    }

    /// Make `event_time` the position at `now`. Rate is unchanged.
    pub fn reanchor_to(&mut self, event_time: f64, now: Duration) {
        self.anchor.event_anchor = event_time;
        self.anchor.wall_anchor = now;
    }

    /// Wall seconds from `now` until `event_time` becomes due.
    ///
    /// Negative when the event is already overdue.
    pub fn wall_offset_until(&self, event_time: f64, now: Duration) -> f64 {
        (event_time - self.position_at(now)) / self.anchor.rate
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualClock")
            .field("wall_anchor", &self.anchor.wall_anchor)
            .field("event_anchor", &self.anchor.event_anchor)
            .field("rate", &self.anchor.rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_start_anchors_to_earliest() {
        let mut clock = VirtualClock::default();
        clock.start(secs(10.0), Some(1_000.0));

        assert_eq!(clock.position_at(secs(10.0)), 1_000.0);
        assert!((clock.position_at(secs(12.5)) - 1_002.5).abs() < 1e-9);
    }

    #[test]
    fn test_start_without_events_anchors_to_zero() {
        let mut clock = VirtualClock::default();
        clock.start(secs(3.0), None);
        assert_eq!(clock.position_at(secs(3.0)), 0.0);
    }

    #[test]
    fn test_rate_change_is_prospective() {
        let mut clock = VirtualClock::new(1.0);
        clock.start(secs(0.0), Some(0.0));

        // 2s at 1x, then 2s at 4x
        clock.set_rate(4.0, secs(2.0));
        assert!((clock.position_at(secs(2.0)) - 2.0).abs() < 1e-9);
        assert!((clock.position_at(secs(4.0)) - 10.0).abs() < 1e-9);
        assert_eq!(clock.rate(), 4.0);
    }

    #[test]
    fn test_reanchor_keeps_rate() {
        let mut clock = VirtualClock::new(2.0);
        clock.start(secs(0.0), Some(0.0));
        clock.reanchor_to(500.0, secs(30.0));

        assert_eq!(clock.rate(), 2.0);
        assert_eq!(clock.position_at(secs(30.0)), 500.0);
        assert!((clock.position_at(secs(31.0)) - 502.0).abs() < 1e-9);
    }

    #[test]
    fn test_wall_offset_until() {
        let mut clock = VirtualClock::new(4.0);
        clock.start(secs(0.0), Some(0.0));

        assert!((clock.wall_offset_until(8.0, secs(0.0)) - 2.0).abs() < 1e-9);
        assert!(clock.wall_offset_until(1.0, secs(1.0)) < 0.0);
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
