//! Testing helpers for replay sessions.
//!
//! - `ManualClock` - A wall clock that only moves when told to
//! - `CollectingObserver` - Records every batch it is handed

mod clock;
mod collector;

pub use clock::ManualClock;
pub use collector::CollectingObserver;
