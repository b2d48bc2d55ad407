//! Lazy playback of persisted recordings.
//!
//! This module provides:
//! - `RecordReader` - The pull shape any recording source exposes
//! - `JsonLinesReader` - A reader over one-JSON-object-per-line recordings
//! - `HistoryEventStream` - Forward-only cursor decoding one record per call
//! - `EventMapper` - Record-kind to replay-event translation
//! - `HistoryFeeder` - Pushes mapped events into a `Replayer` in bounded chunks

mod feeder;
mod mapper;
mod record;
mod stream;

pub use feeder::HistoryFeeder;
pub use mapper::{EventMapper, Fallback};
pub use record::{JsonLinesReader, RawRecord, RecordReader};
pub use stream::HistoryEventStream;
