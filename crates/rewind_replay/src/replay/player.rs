//! Replay player: the virtual-time delivery loop.
//!
//! The player owns the pending [`Timeline`], the [`VirtualClock`] and the
//! [`ObserverRegistry`]. Each loop iteration re-reads the wall clock, pops
//! every event that is due at the resulting timeline position and broadcasts
//! it as one batch. Slow observers delay nothing but their own batch: the next
//! iteration works from a fresh wall reading, never from an accumulated sleep
//! budget.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, ReentrantMutex};

use super::clock::{MonotonicClock, SharedWallClock, VirtualClock};
use super::observer::{ObserverId, ObserverRegistry, ReplayObserver};
use super::timeline::Timeline;
use crate::error::{ReplayError, Result};
use crate::ReplayEvent;

/// How the delivery loop is driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DriveMode {
    /// `play()` spawns a dedicated delivery thread.
    #[default]
    Background,
    /// The caller runs each iteration with [`Replayer::update`].
    Manual,
}

/// Configuration for the replay player.
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Initial playback speed (1.0 = normal).
    pub initial_speed: f64,
    /// Upper bound on the wait between loop iterations.
    pub tick_interval: Duration,
    /// Loop driver.
    pub drive: DriveMode,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            initial_speed: 1.0,
            tick_interval: Duration::from_millis(2),
            drive: DriveMode::Background,
        }
    }
}

impl ReplayConfig {
    /// Create a config for deterministic tests (manually driven loop).
    pub fn testing() -> Self {
        Self {
            drive: DriveMode::Manual,
            ..Self::default()
        }
    }

    /// Set the initial playback speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.initial_speed = speed;
        self
    }

    /// Set the loop tick interval.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Set the loop driver.
    pub fn with_drive(mut self, drive: DriveMode) -> Self {
        self.drive = drive;
        self
    }
}

/// Current state of the replay player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayState {
    /// Not started, or stopped.
    Idle,
    /// Delivering events.
    Playing,
}

fn validate_rate(rate: f64) -> Result<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(ReplayError::InvalidPlaybackRate(rate))
    }
}

struct PlayerState<E> {
    timeline: Timeline<E>,
    clock: VirtualClock,
    state: ReplayState,
    /// Bumped on every `play()` so a loop left over from an earlier run exits.
    run_id: u64,
}

struct Shared<E> {
    state: Mutex<PlayerState<E>>,
    wake: Condvar,
    observers: ObserverRegistry<E>,
    /// Held across pop + broadcast so exactly one delivery runs at a time.
    /// Re-entrant so observers may call back into the player.
    delivery: ReentrantMutex<()>,
    wall: SharedWallClock,
    tick_interval: Duration,
}

impl<E: ReplayEvent> Shared<E> {
    /// One loop iteration. Returns `None` once the given run is over.
    fn deliver_due(&self, run_id: Option<u64>) -> Option<usize> {
        let _delivery = self.delivery.lock();

        let batch = {
            let mut state = self.state.lock();
            if state.state != ReplayState::Playing || run_id.is_some_and(|id| id != state.run_id) {
                return None;
            }
            let position = state.clock.position_at(self.wall.now());
            state.timeline.pop_due(position)
        };

        if batch.is_empty() {
            return Some(0);
        }

        let report = self.observers.broadcast(&batch);
        tracing::trace!(
            events = batch.len(),
            delivered = report.delivered,
            failed = report.failed.len(),
            "batch delivered"
        );
        Some(batch.len())
    }

    fn run_loop(&self, run_id: u64) {
        tracing::debug!(run_id, "delivery loop started");

        while self.deliver_due(Some(run_id)).is_some() {
            let mut state = self.state.lock();
            if state.state != ReplayState::Playing || state.run_id != run_id {
                break;
            }
            if state.timeline.is_empty() {
                // Nothing can become due until a push, which signals us
                self.wake.wait(&mut state);
            } else {
                self.wake.wait_for(&mut state, self.tick_interval);
            }
        }

        tracing::debug!(run_id, "delivery loop stopped");
    }
}

/// Replays timestamped events against a virtual clock.
///
/// All methods take `&self` and may be called from any thread, including from
/// inside an observer callback.
pub struct Replayer<E> {
    shared: Arc<Shared<E>>,
    config: ReplayConfig,
}

impl<E> Replayer<E>
where
    E: ReplayEvent + Clone + PartialEq + Send + 'static,
{
    /// Create a player on the system monotonic clock.
    pub fn new(config: ReplayConfig) -> Result<Self> {
        Self::with_wall_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Create a player on a caller-supplied wall clock.
    pub fn with_wall_clock(config: ReplayConfig, wall: SharedWallClock) -> Result<Self> {
        let rate = validate_rate(config.initial_speed)?;
        let shared = Shared {
            state: Mutex::new(PlayerState {
                timeline: Timeline::new(),
                clock: VirtualClock::new(rate),
                state: ReplayState::Idle,
                run_id: 0,
            }),
            wake: Condvar::new(),
            observers: ObserverRegistry::new(),
            delivery: ReentrantMutex::new(()),
            wall,
            tick_interval: config.tick_interval,
        };

        Ok(Self {
            shared: Arc::new(shared),
            config,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Get the current state.
    pub fn state(&self) -> ReplayState {
        self.shared.state.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == ReplayState::Playing
    }

    /// Get the current playback speed.
    pub fn playback_speed(&self) -> f64 {
        self.shared.state.lock().clock.rate()
    }

    /// Number of events not yet delivered.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().timeline.len()
    }

    /// Time span of the pending events, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.shared.state.lock().timeline.duration_seconds()
    }

    /// Current timeline position, or `None` while idle.
    pub fn position(&self) -> Option<f64> {
        let state = self.shared.state.lock();
        (state.state == ReplayState::Playing)
            .then(|| state.clock.position_at(self.shared.wall.now()))
    }

    /// Wall seconds until an event at `event_time` becomes due.
    ///
    /// Negative when it is already overdue. Only meaningful while playing.
    pub fn event_realtime_offset(&self, event_time: f64) -> f64 {
        let state = self.shared.state.lock();
        state
            .clock
            .wall_offset_until(event_time, self.shared.wall.now())
    }

    /// Queue events for playback.
    ///
    /// If nothing was pending, the clock is re-anchored so the earliest new
    /// event sits at the current position, whatever its absolute event time.
    /// It goes out on the next tick.
    pub fn push_events(&self, events: impl IntoIterator<Item = E>) {
        let events: Vec<E> = events.into_iter().collect();
        let Some(earliest) = events
            .iter()
            .map(|e| e.event_time())
            .min_by(|a, b| a.total_cmp(b))
        else {
            return;
        };
        let count = events.len();

        {
            let mut state = self.shared.state.lock();
            if state.timeline.push(events) {
                let now = self.shared.wall.now();
                state.clock.reanchor_to(earliest, now);
                tracing::debug!(earliest, "timeline refilled, clock re-anchored");
            }
            tracing::trace!(count, pending = state.timeline.len(), "events pushed");
        }

        self.shared.wake.notify_all();
    }

    /// Start or resume playback. No-op while already playing.
    pub fn play(&self) -> Result<()> {
        let run_id = {
            let mut state = self.shared.state.lock();
            if state.state == ReplayState::Playing {
                return Ok(());
            }
            let now = self.shared.wall.now();
            let earliest = state.timeline.earliest().map(|e| e.event_time());
            state.clock.start(now, earliest);
            state.state = ReplayState::Playing;
            state.run_id += 1;
            tracing::debug!(
                run_id = state.run_id,
                rate = state.clock.rate(),
                pending = state.timeline.len(),
                "playback started"
            );
            state.run_id
        };

        if self.config.drive == DriveMode::Background {
            let shared = self.shared.clone();
            let spawned = thread::Builder::new()
                .name("rewind-replay".to_string())
                .spawn(move || shared.run_loop(run_id));

            if let Err(err) = spawned {
                self.shared.state.lock().state = ReplayState::Idle;
                return Err(ReplayError::LoopSpawn(err.to_string()));
            }
        }

        Ok(())
    }

    /// Halt playback. Pending events stay queued.
    ///
    /// Waits for an in-flight batch to finish; once this returns, the loop
    /// invokes no more observers.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.state == ReplayState::Idle {
                return;
            }
            state.state = ReplayState::Idle;
            tracing::debug!(pending = state.timeline.len(), "playback stopped");
        }
        self.shared.wake.notify_all();

        drop(self.shared.delivery.lock());
    }

    /// End the session. Same as [`stop`](Self::stop).
    pub fn finish(&self) {
        self.stop();
    }

    /// Run one delivery iteration on the calling thread.
    ///
    /// Returns the number of events delivered. Used with
    /// [`DriveMode::Manual`].
    pub fn update(&self) -> usize {
        self.shared.deliver_due(None).unwrap_or(0)
    }

    /// Drop every pending event.
    pub fn clear_events(&self) {
        self.shared.state.lock().timeline.clear();
        tracing::debug!("pending events cleared");
    }

    /// Skip every pending event before `event`.
    ///
    /// Fails with [`ReplayError::SeekTargetNotFound`] if `event` is not
    /// pending. The clock anchor is not touched.
    pub fn seek_to(&self, event: &E) -> Result<usize> {
        let removed = self.shared.state.lock().timeline.truncate_before(event)?;
        tracing::debug!(removed, target = event.event_time(), "seek to event");
        Ok(removed)
    }

    /// Skip every pending event less than `offset_seconds` after the start of
    /// the current segment (the earliest time pushed since the timeline was
    /// last empty). Repeating the same seek removes nothing more.
    pub fn seek_to_offset(&self, offset_seconds: f64) -> usize {
        let removed = self
            .shared
            .state
            .lock()
            .timeline
            .truncate_before_relative_time(offset_seconds);
        tracing::debug!(removed, offset_seconds, "seek to offset");
        removed
    }

    /// Change the playback speed from now on.
    pub fn set_playback_speed(&self, rate: f64) -> Result<()> {
        let rate = validate_rate(rate)?;
        {
            let mut state = self.shared.state.lock();
            let now = self.shared.wall.now();
            state.clock.set_rate(rate, now);
        }
        tracing::debug!(rate, "playback speed changed");
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Immediately deliver the first pending location update on its own.
    ///
    /// Works whether or not playback is running and consumes nothing. Returns
    /// `false`, without invoking any observer, when no location is pending.
    pub fn play_first_location(&self) -> bool {
        let location = self.shared.state.lock().timeline.first_location().cloned();
        let Some(location) = location else {
            return false;
        };

        let _delivery = self.shared.delivery.lock();
        self.shared
            .observers
            .broadcast(std::slice::from_ref(&location));
        tracing::debug!(event_time = location.event_time(), "first location delivered");
        true
    }

    /// Register an observer for every future batch.
    pub fn register_observer(&self, observer: Arc<dyn ReplayObserver<E>>) -> ObserverId {
        self.shared.observers.register(observer)
    }

    /// Unregister an observer. Batches already handed to it are unaffected.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.shared.observers.unregister(id)
    }

    pub fn unregister_all_observers(&self) {
        self.shared.observers.clear();
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }
}

impl<E> Drop for Replayer<E> {
    fn drop(&mut self) {
        // Let a background loop exit; it holds its own reference to `shared`
        self.shared.state.lock().state = ReplayState::Idle;
        self.shared.wake.notify_all();
    }
}

impl<E> fmt::Debug for Replayer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Replayer")
            .field("state", &state.state)
            .field("clock", &state.clock)
            .field("pending", &state.timeline.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CollectingObserver, ManualClock};
    use crate::Event;

    fn manual_player() -> (Replayer<Event>, Arc<ManualClock>, Arc<CollectingObserver<Event>>) {
        let clock = Arc::new(ManualClock::new());
        let player = Replayer::with_wall_clock(ReplayConfig::testing(), clock.clone()).unwrap();
        let observer = Arc::new(CollectingObserver::<Event>::new());
        player.register_observer(observer.clone());
        (player, clock, observer)
    }

    #[test]
    fn test_player_creation() {
        let (player, _, _) = manual_player();
        assert_eq!(player.state(), ReplayState::Idle);
        assert_eq!(player.playback_speed(), 1.0);
        assert_eq!(player.pending_len(), 0);
        assert_eq!(player.position(), None);
    }

    #[test]
    fn test_invalid_initial_speed() {
        let result = Replayer::<Event>::new(ReplayConfig::testing().with_speed(0.0));
        assert!(matches!(result, Err(ReplayError::InvalidPlaybackRate(_))));
    }

    #[test]
    fn test_play_is_idempotent() {
        let (player, clock, _) = manual_player();
        player.push_events(vec![Event::status(0.0), Event::status(10.0)]);
        player.play().unwrap();

        clock.advance(Duration::from_secs(4));
        // A second play must not re-anchor
        player.play().unwrap();
        assert_eq!(player.position(), Some(4.0));
    }

    #[test]
    fn test_update_delivers_due_prefix() {
        let (player, clock, observer) = manual_player();
        player.push_events((0..5).map(|t| Event::status(t as f64)));
        player.play().unwrap();

        // The anchor event sits exactly at the current position
        assert_eq!(player.update(), 0);
        clock.advance(Duration::from_millis(2_500));
        assert_eq!(player.update(), 3);
        assert_eq!(player.pending_len(), 2);
        assert_eq!(observer.batch_count(), 1);
    }

    #[test]
    fn test_unregister_all_observers() {
        let (player, clock, observer) = manual_player();
        let second = Arc::new(CollectingObserver::<Event>::new());
        player.register_observer(second.clone());
        assert_eq!(player.observer_count(), 2);

        player.unregister_all_observers();
        assert_eq!(player.observer_count(), 0);

        player.push_events(vec![Event::status(0.0)]);
        player.play().unwrap();
        clock.advance(Duration::from_millis(10));
        assert_eq!(player.update(), 1);
        assert_eq!(observer.batch_count() + second.batch_count(), 0);
    }

    #[test]
    fn test_debug_reports_pending() {
        let (player, _, _) = manual_player();
        player.push_events(vec![Event::status(1.0), Event::status(2.0)]);

        let text = format!("{player:?}");
        assert!(text.contains("pending: 2"), "{text}");
        assert!(text.contains("Idle"), "{text}");
    }

    #[test]
    fn test_update_while_idle_delivers_nothing() {
        let (player, clock, observer) = manual_player();
        player.push_events(vec![Event::status(0.0)]);
        clock.advance(Duration::from_secs(1));

        assert_eq!(player.update(), 0);
        assert_eq!(observer.batch_count(), 0);
    }

    #[test]
    fn test_stop_keeps_pending() {
        let (player, _, _) = manual_player();
        player.push_events(vec![Event::status(5.0), Event::status(6.0)]);
        player.play().unwrap();
        player.stop();

        assert_eq!(player.state(), ReplayState::Idle);
        assert_eq!(player.pending_len(), 2);

        // Stopping again is silent
        player.finish();
    }

    #[test]
    fn test_set_playback_speed_validation() {
        let (player, _, _) = manual_player();
        assert!(matches!(
            player.set_playback_speed(-1.0),
            Err(ReplayError::InvalidPlaybackRate(_))
        ));
        assert!(player.set_playback_speed(f64::NAN).is_err());
        assert_eq!(player.playback_speed(), 1.0);

        player.set_playback_speed(2.5).unwrap();
        assert_eq!(player.playback_speed(), 2.5);
    }

    #[test]
    fn test_clear_events_while_playing() {
        let (player, clock, observer) = manual_player();
        player.push_events((0..3).map(|t| Event::status(t as f64)));
        player.play().unwrap();
        player.clear_events();

        clock.advance(Duration::from_secs(5));
        assert_eq!(player.update(), 0);
        assert_eq!(observer.batch_count(), 0);
        assert_eq!(player.duration_seconds(), 0.0);
    }

    #[test]
    fn test_event_realtime_offset() {
        let (player, clock, _) = manual_player();
        player.push_events(vec![Event::status(100.0), Event::status(110.0)]);
        player.set_playback_speed(2.0).unwrap();
        player.play().unwrap();
        clock.advance(Duration::from_secs(1));

        assert!((player.event_realtime_offset(110.0) - 4.0).abs() < 1e-9);
    }
}
