//! Replay error types

use thiserror::Error;

/// Replay-related errors
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Seek-by-reference target is not pending on the timeline
    #[error("Seek target not found on the pending timeline")]
    SeekTargetNotFound,

    /// Playback rate must be a positive, finite multiplier
    #[error("Invalid playback rate: {0} (must be > 0)")]
    InvalidPlaybackRate(f64),

    /// `next` was called on a stream with no more records
    #[error("History stream exhausted")]
    IteratorExhausted,

    /// A raw record could not be decoded
    #[error("Failed to decode record at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Underlying reader I/O failure
    #[error("History I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The background delivery loop could not be started
    #[error("Failed to spawn delivery loop: {0}")]
    LoopSpawn(String),
}

/// Result type for replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Error reported by an observer callback.
///
/// Observer failures never abort delivery; they are logged and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ObserverError(pub String);

impl ObserverError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
