//! Rewind Replay
//!
//! Deterministic session replay for telemetry clients: timestamped events are
//! played back against a virtual clock that can be sped up, slowed down,
//! re-anchored and seeked, and delivered in order to any number of observers.
//!
//! # Modules
//!
//! - **`replay`**: Timeline, virtual clock, observer registry, delivery loop
//! - **`history`**: Lazy record streams, record-to-event mapping, chunked feeding
//! - **`testing`**: Manual wall clock and collecting observer for tests

pub mod error;
pub mod event;
pub mod history;
pub mod replay;
pub mod testing;

pub use error::{ObserverError, ReplayError, Result};
pub use event::{CustomEvent, Event, LocationUpdate, ReplayEvent, RouteSet, StatusProbe};
pub use history::{
    EventMapper, Fallback, HistoryEventStream, HistoryFeeder, JsonLinesReader, RawRecord,
    RecordReader,
};
pub use replay::{
    DriveMode, ObserverId, ReplayConfig, ReplayObserver, ReplayState, Replayer, Timeline,
    VirtualClock, WallClock,
};
