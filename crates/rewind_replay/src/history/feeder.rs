//! Chunked feeding of a recording into a player.

use super::mapper::EventMapper;
use super::record::RecordReader;
use super::stream::HistoryEventStream;
use crate::error::Result;
use crate::replay::Replayer;
use crate::ReplayEvent;

/// Keeps a [`Replayer`] topped up from a [`HistoryEventStream`].
///
/// Only a look-ahead window of the recording is ever pending: [`fill`]
/// pushes at most `chunk_size` events, and only once the player has fewer
/// than `low_water` events left.
///
/// [`fill`]: HistoryFeeder::fill
pub struct HistoryFeeder<R, E> {
    stream: HistoryEventStream<R>,
    mapper: EventMapper<E>,
    chunk_size: usize,
    low_water: usize,
    pushed: usize,
    dropped: usize,
    /// Event read past a skip boundary, pushed with the next chunk.
    carry: Option<E>,
}

impl<R, E> HistoryFeeder<R, E>
where
    R: RecordReader,
    E: ReplayEvent + Clone + PartialEq + Send + 'static,
{
    pub fn new(stream: HistoryEventStream<R>, mapper: EventMapper<E>) -> Self {
        Self {
            stream,
            mapper,
            chunk_size: 256,
            low_water: 64,
            pushed: 0,
            dropped: 0,
            carry: None,
        }
    }

    /// Maximum number of events pushed per [`fill`](Self::fill).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pending-event count below which [`fill`](Self::fill) pushes more.
    pub fn with_low_water(mut self, low_water: usize) -> Self {
        self.low_water = low_water;
        self
    }

    /// Whether the recording has been fully read and pushed.
    pub fn is_exhausted(&mut self) -> bool {
        self.carry.is_none() && !self.stream.has_next()
    }

    /// Events pushed so far.
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Records the mapper dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Top up `player` if it is running low. Returns the number of events
    /// pushed.
    pub fn fill(&mut self, player: &Replayer<E>) -> Result<usize> {
        if player.pending_len() >= self.low_water {
            return Ok(0);
        }
        self.push_chunk(player)
    }

    /// Push the remainder of the recording in one go.
    pub fn fill_all(&mut self, player: &Replayer<E>) -> Result<usize> {
        let mut total = 0;
        while !self.is_exhausted() {
            total += self.push_chunk(player)?;
        }
        Ok(total)
    }

    /// Discard events less than `offset_seconds` after the first mapped event
    /// of the recording, without pushing them.
    ///
    /// Meant for seeking into recordings larger than one chunk; call it before
    /// the first fill. Returns the number of events skipped.
    pub fn skip_to_offset(&mut self, offset_seconds: f64) -> Result<usize> {
        let mut origin = None;
        let mut skipped = 0;

        while self.carry.is_none() && self.stream.has_next() {
            let record = self.stream.next_record()?;
            let Some(event) = self.mapper.map(&record) else {
                self.dropped += 1;
                continue;
            };
            let base = *origin.get_or_insert(event.event_time());
            if event.event_time() - base < offset_seconds {
                skipped += 1;
            } else {
                self.carry = Some(event);
            }
        }

        tracing::debug!(skipped, offset_seconds, "recording skipped ahead");
        Ok(skipped)
    }

    fn push_chunk(&mut self, player: &Replayer<E>) -> Result<usize> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        let mut failure = None;

        chunk.extend(self.carry.take());

        while chunk.len() < self.chunk_size && self.stream.has_next() {
            match self.stream.next_record() {
                Ok(record) => match self.mapper.map(&record) {
                    Some(event) => chunk.push(event),
                    None => {
                        tracing::trace!(kind = %record.kind, "record dropped by mapper");
                        self.dropped += 1;
                    }
                },
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let count = chunk.len();
        if count > 0 {
            player.push_events(chunk);
            self.pushed += count;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }
}
