//! Observer that records what it receives.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::ObserverError;
use crate::replay::ReplayObserver;

/// Records every batch, with the real time it arrived.
#[derive(Debug)]
pub struct CollectingObserver<E> {
    batches: Mutex<Vec<(Instant, Vec<E>)>>,
    delay: Option<Duration>,
}

impl<E: Clone> CollectingObserver<E> {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep for `delay` inside every callback, after recording the batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All batches received so far.
    pub fn batches(&self) -> Vec<Vec<E>> {
        self.batches.lock().iter().map(|(_, b)| b.clone()).collect()
    }

    /// All events received so far, flattened in arrival order.
    pub fn events(&self) -> Vec<E> {
        self.batches
            .lock()
            .iter()
            .flat_map(|(_, b)| b.iter().cloned())
            .collect()
    }

    /// Real arrival time of each batch.
    pub fn arrivals(&self) -> Vec<Instant> {
        self.batches.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn event_count(&self) -> usize {
        self.batches.lock().iter().map(|(_, b)| b.len()).sum()
    }
}

impl<E: Clone> Default for CollectingObserver<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send> ReplayObserver<E> for CollectingObserver<E> {
    fn on_events(&self, events: &[E]) -> Result<(), ObserverError> {
        self.batches.lock().push((Instant::now(), events.to_vec()));
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(())
    }
}
