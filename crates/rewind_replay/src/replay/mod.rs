//! Replay engine for timestamped event sessions.
//!
//! This module provides:
//! - `Timeline` - Sorted store of pending events
//! - `VirtualClock` - Wall-to-timeline mapping with adjustable speed
//! - `ObserverRegistry` - Fan-out of delivered batches
//! - `Replayer` - The delivery loop tying them together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rewind_replay::replay::{ReplayConfig, Replayer};
//! use rewind_replay::{Event, ObserverError};
//!
//! let player = Replayer::new(ReplayConfig::default())?;
//! player.register_observer(Arc::new(|batch: &[Event]| -> Result<(), ObserverError> {
//!     println!("{} events", batch.len());
//!     Ok(())
//! }));
//!
//! player.push_events(vec![Event::status(1.0), Event::location(1.89, 59.33, 18.06)]);
//!
//! // Play at 2x speed
//! player.set_playback_speed(2.0)?;
//! player.play()?;
//! # Ok::<(), rewind_replay::ReplayError>(())
//! ```

mod clock;
mod observer;
mod player;
mod timeline;

pub use clock::{Anchor, MonotonicClock, SharedWallClock, VirtualClock, WallClock};
pub use observer::{BroadcastReport, ObserverId, ObserverRegistry, ReplayObserver};
pub use player::{DriveMode, ReplayConfig, ReplayState, Replayer};
pub use timeline::Timeline;
