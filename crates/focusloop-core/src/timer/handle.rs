use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use super::engine::{FinishActionType, TimerEngine};
use super::profile::TimerType;
use super::snapshot::TimerSnapshot;
use super::streak::Streak;
use crate::events::Event;
use crate::storage::EngineSettings;

/// Shared, serialized access to the one [`TimerEngine`].
///
/// Every operation takes the engine lock, so transitions never interleave.
/// Listeners run while the lock is held and must not call back into the
/// handle.
#[derive(Clone)]
pub struct TimerHandle {
    engine: Arc<Mutex<TimerEngine>>,
    snapshots: watch::Receiver<TimerSnapshot>,
}

impl TimerHandle {
    pub fn new(engine: TimerEngine) -> Self {
        let snapshots = engine.subscribe();
        Self {
            engine: Arc::new(Mutex::new(engine)),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self, timer_type: TimerType) -> Vec<Event> {
        self.lock().start(timer_type)
    }

    pub fn toggle(&self) -> Vec<Event> {
        self.lock().toggle()
    }

    pub fn add_one_minute(&self) -> Vec<Event> {
        self.lock().add_one_minute()
    }

    pub fn finish(&self, action: FinishActionType) -> Vec<Event> {
        self.lock().finish(action)
    }

    pub fn next(&self, action: FinishActionType) -> Vec<Event> {
        self.lock().next(action)
    }

    pub fn reset(&self, action: FinishActionType) -> Vec<Event> {
        self.lock().reset(action)
    }

    pub fn restart(&self) -> Vec<Event> {
        self.lock().restart()
    }

    pub fn update_settings(&self, settings: EngineSettings) {
        self.lock().update_settings(settings);
    }

    pub fn restore(&self, snapshot: TimerSnapshot) -> bool {
        self.lock().restore(snapshot)
    }

    pub fn check_liveness(&self) -> Vec<Event> {
        self.lock().check_liveness()
    }

    pub fn on_bring_to_foreground(&self) {
        self.lock().on_bring_to_foreground();
    }

    pub fn on_send_to_background(&self) {
        self.lock().on_send_to_background();
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }

    pub fn base_time(&self) -> i64 {
        self.lock().base_time()
    }

    pub fn break_budget(&self) -> Duration {
        self.lock().break_budget()
    }

    pub fn streak(&self) -> Streak {
        self.lock().streak()
    }

    pub fn flush(&self) {
        self.lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::timer::TimerState;

    #[test]
    fn clones_share_one_engine() {
        let clock = ManualClock::new(0, 0);
        let store = Arc::new(MemoryStore::new());
        let engine = TimerEngine::new(Arc::new(clock), store.clone(), store, Vec::new()).unwrap();
        let handle = TimerHandle::new(engine);
        let other = handle.clone();

        assert_eq!(handle.start(TimerType::Work).len(), 1);
        assert!(other.start(TimerType::Work).is_empty());
        assert_eq!(other.snapshot().state, TimerState::Running);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let h = handle.clone();
                std::thread::spawn(move || h.start(TimerType::Break).len())
            })
            .collect();
        let started: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();
        assert_eq!(started, 0);
    }
}
