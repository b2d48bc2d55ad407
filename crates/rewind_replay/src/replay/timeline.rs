//! Pending-event timeline.
//!
//! Holds every event that has been pushed but not yet delivered, sorted by
//! event time. Ties keep their insertion order.
//!
//! The timeline also remembers the earliest event time of the current segment
//! (everything pushed since it was last empty). Relative seeks are measured
//! from that origin, so repeating a seek removes nothing new.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::error::{ReplayError, Result};
use crate::ReplayEvent;

fn by_time<E: ReplayEvent>(a: &E, b: &E) -> Ordering {
    a.event_time().total_cmp(&b.event_time())
}

/// Sorted store of pending replay events.
#[derive(Debug)]
pub struct Timeline<E> {
    events: VecDeque<E>,
    origin: Option<f64>,
}

impl<E> Timeline<E> {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            origin: None,
        }
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E: ReplayEvent> Timeline<E> {

    /// The earliest pending event.
    pub fn earliest(&self) -> Option<&E> {
        self.events.front()
    }

    /// The latest pending event.
    pub fn latest(&self) -> Option<&E> {
        self.events.back()
    }

    /// Earliest event time pushed since the timeline was last empty.
    pub fn segment_origin(&self) -> Option<f64> {
        self.origin
    }

    /// Iterate pending events in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.events.iter()
    }

    /// Merge `events` into the timeline.
    ///
    /// Returns `true` when the timeline went from empty to non-empty, which is
    /// the signal for the scheduler to re-anchor its clock.
    pub fn push(&mut self, events: impl IntoIterator<Item = E>) -> bool {
        let was_empty = self.events.is_empty();

        let mut incoming: Vec<E> = events.into_iter().collect();
        if incoming.is_empty() {
            return false;
        }
        // Stable, so ties among the incoming events keep their order
        incoming.sort_by(by_time);

        let incoming_first = incoming[0].event_time();
        self.origin = Some(match self.origin {
            Some(origin) if !was_empty => origin.min(incoming_first),
            _ => incoming_first,
        });

        let appends_cleanly = match (self.events.back(), incoming.first()) {
            (Some(last), Some(first)) => by_time(last, first) != Ordering::Greater,
            _ => true,
        };

        if appends_cleanly {
            // Streaming case: new events all come after what is pending
            self.events.extend(incoming);
        } else {
            let existing = std::mem::take(&mut self.events);
            self.events = merge(existing, incoming);
        }

        was_empty
    }

    /// Remove and return every event with `event_time < threshold`.
    ///
    /// An event exactly at the threshold belongs to the next window.
    pub fn pop_due(&mut self, threshold: f64) -> Vec<E> {
        let due = self
            .events
            .iter()
            .take_while(|e| e.event_time() < threshold)
            .count();
        let popped: Vec<E> = self.events.drain(..due).collect();
        self.forget_origin_if_drained();
        popped
    }

    /// Drop every event that precedes `base + offset_seconds`, where `base` is
    /// the segment origin (the earliest pending time on a fresh segment).
    ///
    /// Returns the number of removed events. No-op when empty.
    pub fn truncate_before_relative_time(&mut self, offset_seconds: f64) -> usize {
        let Some(base) = self
            .origin
            .or_else(|| self.events.front().map(|e| e.event_time()))
        else {
            return 0;
        };
        let remove = self
            .events
            .iter()
            .take_while(|e| e.event_time() - base < offset_seconds)
            .count();
        self.events.drain(..remove);
        self.forget_origin_if_drained();
        remove
    }

    /// Remove all pending events.
    pub fn clear(&mut self) {
        self.events.clear();
        self.origin = None;
    }

    fn forget_origin_if_drained(&mut self) {
        if self.events.is_empty() {
            self.origin = None;
        }
    }

    /// Time span covered by the pending events, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        match (self.events.front(), self.events.back()) {
            (Some(first), Some(last)) if self.events.len() > 1 => {
                last.event_time() - first.event_time()
            }
            _ => 0.0,
        }
    }

    /// The first pending location update, without removing anything.
    pub fn first_location(&self) -> Option<&E> {
        self.events.iter().find(|e| e.is_location_update())
    }
}

impl<E: ReplayEvent + PartialEq> Timeline<E> {
    /// Drop every event before the first pending occurrence of `event`.
    ///
    /// `event` itself stays pending. Fails without touching the timeline when
    /// `event` is not pending.
    pub fn truncate_before(&mut self, event: &E) -> Result<usize> {
        let index = self
            .events
            .iter()
            .position(|e| e == event)
            .ok_or(ReplayError::SeekTargetNotFound)?;
        self.events.drain(..index);
        Ok(index)
    }
}

impl<E> Default for Timeline<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable merge: on equal times, events already pending come first.
fn merge<E: ReplayEvent>(existing: VecDeque<E>, incoming: Vec<E>) -> VecDeque<E> {
    let mut merged = VecDeque::with_capacity(existing.len() + incoming.len());
    let mut left = existing.into_iter().peekable();
    let mut right = incoming.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => by_time(l, r) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }

    merged
}
