//! Forward-only cursor over a recording.

use crate::error::{ReplayError, Result};

use super::record::{RawRecord, RecordReader};

/// Pulls raw records from a [`RecordReader`] one at a time.
///
/// Only the record being returned is ever decoded, so memory stays bounded by
/// a single record regardless of the recording's size. The cursor cannot be
/// rewound.
pub struct HistoryEventStream<R> {
    reader: R,
    decoded: usize,
}

impl<R: RecordReader> HistoryEventStream<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, decoded: 0 }
    }

    /// Whether another record is available.
    pub fn has_next(&mut self) -> bool {
        self.reader.has_next()
    }

    /// Decode and return the next record.
    ///
    /// Fails with [`ReplayError::IteratorExhausted`] past the end.
    pub fn next_record(&mut self) -> Result<RawRecord> {
        if !self.reader.has_next() {
            return Err(ReplayError::IteratorExhausted);
        }
        let record = self.reader.read_next()?;
        self.decoded += 1;
        Ok(record)
    }

    /// Number of records successfully decoded so far.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: RecordReader> Iterator for HistoryEventStream<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_next() {
            Some(self.next_record())
        } else {
            None
        }
    }
}
