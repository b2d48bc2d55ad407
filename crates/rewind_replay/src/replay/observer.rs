//! Observer registry and batch fan-out.
//!
//! Observers live in a generation-stamped arena. Every registration change
//! publishes a fresh immutable snapshot, and a broadcast works from the
//! snapshot it grabbed at the start, so changes made while a batch is in
//! flight only apply to the next batch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::error::ObserverError;

new_key_type! {
    /// Handle returned by [`ObserverRegistry::register`].
    pub struct ObserverId;
}

/// A sink for replayed event batches.
///
/// Batches are never empty and are ordered by event time. They carry no
/// guarantee about size or spacing.
pub trait ReplayObserver<E>: Send + Sync {
    fn on_events(&self, events: &[E]) -> Result<(), ObserverError>;
}

impl<E, F> ReplayObserver<E> for F
where
    F: Fn(&[E]) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_events(&self, events: &[E]) -> Result<(), ObserverError> {
        self(events)
    }
}

type ObserverHandle<E> = Arc<dyn ReplayObserver<E>>;
type Snapshot<E> = Arc<Vec<(ObserverId, ObserverHandle<E>)>>;

struct RegistryInner<E> {
    observers: SlotMap<ObserverId, ObserverHandle<E>>,
    snapshot: Snapshot<E>,
    generation: u64,
}

impl<E> RegistryInner<E> {
    fn publish(&mut self) {
        self.generation += 1;
        self.snapshot = Arc::new(
            self.observers
                .iter()
                .map(|(id, observer)| (id, observer.clone()))
                .collect(),
        );
    }
}

/// Outcome of a single broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Observers that accepted the batch.
    pub delivered: usize,
    /// Observers that returned an error or panicked.
    pub failed: SmallVec<[ObserverId; 2]>,
    /// Registry generation the batch was delivered against.
    pub generation: u64,
}

impl BroadcastReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Thread-safe set of delivery targets.
pub struct ObserverRegistry<E> {
    inner: RwLock<RegistryInner<E>>,
}

impl<E> ObserverRegistry<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                observers: SlotMap::with_key(),
                snapshot: Arc::new(Vec::new()),
                generation: 0,
            }),
        }
    }

    /// Add an observer. It receives every batch broadcast after this returns.
    pub fn register(&self, observer: Arc<dyn ReplayObserver<E>>) -> ObserverId {
        let mut inner = self.inner.write();
        let id = inner.observers.insert(observer);
        inner.publish();
        tracing::debug!(?id, observers = inner.observers.len(), "observer registered");
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.write();
        let removed = inner.observers.remove(id).is_some();
        if removed {
            inner.publish();
            tracing::debug!(?id, observers = inner.observers.len(), "observer unregistered");
        }
        removed
    }

    /// Remove every observer.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        if !inner.observers.is_empty() {
            inner.observers.clear();
            inner.publish();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `batch` to every currently registered observer.
    ///
    /// A failing observer is logged and skipped; the rest still receive the
    /// batch.
    pub fn broadcast(&self, batch: &[E]) -> BroadcastReport {
        let (snapshot, generation) = {
            let inner = self.inner.read();
            (inner.snapshot.clone(), inner.generation)
        };

        let mut report = BroadcastReport {
            generation,
            ..BroadcastReport::default()
        };

        for (id, observer) in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_events(batch))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    tracing::warn!(?id, error = %err, "observer rejected batch");
                    report.failed.push(*id);
                }
                Err(panic) => {
                    tracing::warn!(?id, panic = panic_message(&*panic), "observer panicked");
                    report.failed.push(*id);
                }
            }
        }

        report
    }
}

impl<E> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic>"
    }
}
