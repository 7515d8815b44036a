//! Timer engine implementation.
//!
//! The engine is the single writer of the timer snapshot. Every operation
//! reads the boot clock once, computes the next snapshot, publishes it on a
//! watch channel and hands the resulting [`Event`]s to the listeners in order.
//!
//! ## State Transitions
//!
//! ```text
//! Reset -> Running <-> Paused -> Finished -> Reset
//!          Running | Paused ---------------> Reset
//! ```
//!
//! Redundant triggers are no-ops: every operation returns the events it
//! emitted, and an empty list means nothing changed.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(clock, settings, stats, listeners)?;
//! engine.start(TimerType::Work);
//! engine.toggle(); // Pause
//! engine.next(FinishActionType::ManualNext); // Finish work, start the break
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::break_budget::BreakBudgetLedger;
use super::profile::{Label, TimerType};
use super::snapshot::{TimerSnapshot, TimerState, COUNT_UP_HARD_LIMIT_MS, ONE_MINUTE_MS};
use super::streak::{Streak, StreakTracker};
use crate::clock::{Clock, MonotonicGuard};
use crate::error::Result;
use crate::events::{Event, EventFanout, EventListener};
use crate::storage::{
    EngineSettings, PersistenceWriter, SessionRecord, SettingsStore, StatsStore, StoredSettings,
    WriteQueue,
};

/// A running countdown with less than this left is finished by the liveness check.
pub const FORCE_FINISH_THRESHOLD_MS: i64 = 500;

/// How a session is being ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishActionType {
    /// Abandon the session: nothing is recorded and the streak is untouched.
    ManualSkip,
    ManualNext,
    /// Record what was worked (if at least a minute) and go back to reset.
    ManualReset,
    /// Go back to reset without recording anything.
    ManualDoNothing,
    /// Finalize an overdue countdown.
    ForceFinish,
}

/// Core timer engine.
pub struct TimerEngine {
    snapshot: TimerSnapshot,
    settings: EngineSettings,
    /// Label change that arrived while a session was active.
    pending_label: Option<Label>,
    clock: Arc<dyn Clock>,
    guard: MonotonicGuard,
    settings_store: Arc<dyn SettingsStore>,
    break_budget: BreakBudgetLedger,
    streak: StreakTracker,
    queue: WriteQueue,
    fanout: EventFanout,
    snapshot_tx: watch::Sender<TimerSnapshot>,
    in_foreground: bool,
    /// Drains and joins the writer thread on drop.
    _writer: PersistenceWriter,
}

impl TimerEngine {
    /// Build the engine and load its settings.
    ///
    /// A settings store that fails to load leaves the engine on defaults with
    /// `is_ready == false` until a successful [`restart`](Self::restart).
    ///
    /// # Errors
    /// Returns an error if the persistence writer thread cannot be spawned.
    pub fn new(
        clock: Arc<dyn Clock>,
        settings_store: Arc<dyn SettingsStore>,
        stats_store: Arc<dyn StatsStore>,
        listeners: Vec<Box<dyn EventListener>>,
    ) -> Result<Self> {
        let (stored, is_ready) = match settings_store.load() {
            Ok(stored) => (stored, true),
            Err(e) => {
                error!(error = %e, "failed to load timer settings; using defaults");
                (StoredSettings::default(), false)
            }
        };

        let writer = PersistenceWriter::spawn(settings_store.clone(), stats_store)?;
        let queue = writer.queue();
        let snapshot = TimerSnapshot {
            is_ready,
            label: stored.engine.label.clone(),
            ..TimerSnapshot::default()
        };
        let (snapshot_tx, _) = watch::channel(snapshot.clone());

        Ok(Self {
            snapshot,
            settings: stored.engine,
            pending_label: None,
            clock,
            guard: MonotonicGuard::new(),
            settings_store,
            break_budget: BreakBudgetLedger::new(stored.break_budget, queue.clone()),
            streak: StreakTracker::new(stored.streak, queue.clone()),
            queue,
            fanout: EventFanout::new(listeners),
            snapshot_tx,
            in_foreground: false,
            _writer: writer,
        })
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Start a session of `timer_type`. Ignored while a session is active.
    pub fn start(&mut self, timer_type: TimerType) -> Vec<Event> {
        self.start_session(timer_type, false)
    }

    /// Pause a running session or resume a paused one.
    pub fn toggle(&mut self) -> Vec<Event> {
        let now = self.now();
        match self.snapshot.state {
            TimerState::Running => {
                self.persist_count_up_budget(now);
                let base = self.snapshot.base_time(now).max(0) as u64;
                let s = &mut self.snapshot;
                s.time_at_pause = base;
                s.last_pause_time = now;
                s.state = TimerState::Paused;
                s.interruptions = s.interruptions.saturating_add(1);
                debug!(time_at_pause = base, "session paused");
                self.commit(Event::Pause)
            }
            TimerState::Paused => {
                self.persist_count_up_budget(now);
                let s = &mut self.snapshot;
                s.time_spent_paused = s
                    .time_spent_paused
                    .saturating_add(now.saturating_sub(s.last_pause_time));
                s.last_start_time = now;
                if s.is_current_session_countdown() {
                    s.end_time = now.saturating_add(s.time_at_pause);
                }
                s.state = TimerState::Running;
                let end_time = s.alarm_time();
                debug!(end_time, "session resumed");
                self.commit(Event::Start {
                    end_time,
                    auto_started: false,
                })
            }
            state => {
                debug!(?state, "toggle ignored: no active session");
                Vec::new()
            }
        }
    }

    /// Extend the current countdown session by one minute.
    pub fn add_one_minute(&mut self) -> Vec<Event> {
        if !self.snapshot.state.is_active() || !self.snapshot.is_current_session_countdown() {
            debug!("add one minute ignored: no active countdown");
            return Vec::new();
        }
        let s = &mut self.snapshot;
        s.end_time = s.end_time.saturating_add(ONE_MINUTE_MS);
        if s.state.is_paused() {
            s.time_at_pause = s.time_at_pause.saturating_add(ONE_MINUTE_MS);
        }
        let end_time = s.end_time;
        self.commit(Event::AddOneMinute { end_time })
    }

    /// Finalize the active session and move to `Finished`.
    ///
    /// When auto-start is enabled for the following session type, that
    /// session starts right away. `ManualReset` and `ManualDoNothing` go back
    /// to reset instead.
    pub fn finish(&mut self, action: FinishActionType) -> Vec<Event> {
        if matches!(
            action,
            FinishActionType::ManualReset | FinishActionType::ManualDoNothing
        ) {
            return self.reset(action);
        }
        if !self.snapshot.state.is_active() {
            debug!(?action, "finish ignored: no active session");
            return Vec::new();
        }

        let now = self.now();
        let session_type = self.snapshot.session_type;
        let ended_at = self.close_session(action, now);

        let auto_start_next = self.auto_start_after(session_type);
        let mut events = self.commit(Event::Finished {
            session_type,
            auto_start_next,
        });
        if auto_start_next {
            let next = self.next_type(ended_at);
            events.extend(self.start_session(next, true));
        }
        events
    }

    /// Finalize the current session (if still active) and start the
    /// following one.
    pub fn next(&mut self, action: FinishActionType) -> Vec<Event> {
        if matches!(
            action,
            FinishActionType::ManualReset | FinishActionType::ManualDoNothing
        ) {
            return self.reset(action);
        }
        if self.snapshot.state.is_reset() {
            debug!("next ignored: timer is reset");
            return Vec::new();
        }

        let now = self.now();
        let mut events = Vec::new();
        let mut ended_at = now;
        if self.snapshot.state.is_active() {
            let session_type = self.snapshot.session_type;
            ended_at = self.close_session(action, now);
            if action != FinishActionType::ManualSkip {
                events.extend(self.commit(Event::Finished {
                    session_type,
                    auto_start_next: true,
                }));
            }
        }
        let next = self.next_type(ended_at);
        events.extend(self.start_session(next, true));
        events
    }

    /// Go back to `Reset`.
    pub fn reset(&mut self, action: FinishActionType) -> Vec<Event> {
        if self.snapshot.state.is_reset() {
            debug!("reset ignored: timer already reset");
            return Vec::new();
        }

        let now = self.now();
        self.persist_budget(now);
        if self.snapshot.state.is_active() && action == FinishActionType::ManualReset {
            let ended_at = self.snapshot.session_end(now);
            let minutes = self.snapshot.worked_until(ended_at) / ONE_MINUTE_MS;
            self.record_session(minutes, ended_at, now);
        }
        self.streak.persist();

        self.snapshot = self.snapshot.reset();
        self.apply_pending_label();
        info!(?action, "timer reset");
        self.commit(Event::Reset)
    }

    /// Reload label, auto-start flags, budget and streak from the settings store.
    pub fn restart(&mut self) -> Vec<Event> {
        let stored = match self.settings_store.load() {
            Ok(stored) => stored,
            Err(e) => {
                error!(error = %e, "failed to reload timer settings");
                return Vec::new();
            }
        };
        self.break_budget.reload(stored.break_budget);
        self.streak.reload(stored.streak);
        self.snapshot.is_ready = true;

        let label = stored.engine.label.clone();
        self.settings = stored.engine;
        if self.snapshot.state.is_active() {
            self.defer_label(label);
            self.publish();
            return Vec::new();
        }

        let was_finished = self.snapshot.state.is_finished();
        self.pending_label = None;
        self.snapshot = TimerSnapshot::ready(label);
        if was_finished {
            self.commit(Event::Reset)
        } else {
            self.publish();
            Vec::new()
        }
    }

    /// React to a settings change. Idle snapshots take the new label at
    /// once; an active session keeps its label until it ends.
    pub fn update_settings(&mut self, settings: EngineSettings) {
        let label = settings.label.clone();
        self.settings = settings;
        if self.snapshot.state.is_active() {
            self.defer_label(label);
        } else {
            self.pending_label = None;
            self.snapshot.label = label;
        }
        self.publish();
    }

    /// Adopt a snapshot persisted by an earlier process.
    ///
    /// Returns `false` and keeps the current snapshot when `snapshot` carries
    /// timestamps later than the current boot clock, which means it was
    /// taken before a reboot.
    pub fn restore(&mut self, snapshot: TimerSnapshot) -> bool {
        let now = self.now();
        if snapshot.latest_timestamp() > now {
            warn!(
                latest = snapshot.latest_timestamp(),
                now, "discarding timer snapshot taken before a reboot"
            );
            return false;
        }

        let is_ready = self.snapshot.is_ready;
        self.snapshot = TimerSnapshot {
            is_ready,
            ..snapshot
        };
        let label = self.settings.label.clone();
        if self.snapshot.state.is_active() {
            self.defer_label(label);
        } else {
            self.snapshot.label = label;
        }
        self.publish();
        true
    }

    /// Force-terminate sessions the host could not end on time.
    ///
    /// A running countdown with less than [`FORCE_FINISH_THRESHOLD_MS`] left
    /// is finished; count-up work past [`COUNT_UP_HARD_LIMIT_MS`] is reset,
    /// paused or not. A paused countdown is left alone.
    pub fn check_liveness(&mut self) -> Vec<Event> {
        if !self.snapshot.state.is_active() {
            return Vec::new();
        }
        let now = self.now();
        let base = self.snapshot.base_time(now);
        if self.snapshot.state.is_running()
            && self.snapshot.is_current_session_countdown()
            && base < FORCE_FINISH_THRESHOLD_MS
        {
            info!(remaining_ms = base, "countdown overdue; forcing finish");
            return self.finish(FinishActionType::ForceFinish);
        }
        if self.snapshot.is_count_up_work() && base > COUNT_UP_HARD_LIMIT_MS as i64 {
            warn!(elapsed_ms = base, "count-up session hit the hard limit; resetting");
            return self.reset(FinishActionType::ManualReset);
        }
        Vec::new()
    }

    /// Record that the host UI became visible. Hosts read it back through
    /// [`is_in_foreground`](Self::is_in_foreground); polling itself is driven
    /// by [`ForegroundMonitor`](crate::ForegroundMonitor).
    pub fn on_bring_to_foreground(&mut self) {
        debug!("timer in foreground");
        self.in_foreground = true;
    }

    pub fn on_send_to_background(&mut self) {
        debug!("timer in background");
        self.in_foreground = false;
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> &TimerSnapshot {
        &self.snapshot
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Whether the host UI is visible, for hosts that gate their own work
    /// (notifications, sounds) on it.
    pub fn is_in_foreground(&self) -> bool {
        self.in_foreground
    }

    /// Remaining countdown time or elapsed count-up time, in ms.
    pub fn base_time(&mut self) -> i64 {
        let now = self.now();
        self.snapshot.base_time(now)
    }

    /// Break budget available right now.
    pub fn break_budget(&mut self) -> Duration {
        let now = self.now();
        let s = &self.snapshot;
        self.break_budget
            .current_budget(s.session_type, s.state, s.profile(), s.last_start_time, now)
    }

    pub fn break_budget_ledger(&self) -> &BreakBudgetLedger {
        &self.break_budget
    }

    pub fn streak(&self) -> Streak {
        self.streak.current()
    }

    pub fn streak_tracker(&self) -> &StreakTracker {
        &self.streak
    }

    pub fn listener_count(&self) -> usize {
        self.fanout.len()
    }

    /// Block until every queued persistence write has been applied.
    pub fn flush(&self) {
        self.queue.flush();
    }

    // ── Internals ────────────────────────────────────────────────────

    fn now(&mut self) -> u64 {
        self.guard.observe(self.clock.elapsed_since_boot())
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    fn commit(&mut self, event: Event) -> Vec<Event> {
        self.publish();
        self.fanout.dispatch(&event);
        vec![event]
    }

    fn start_session(&mut self, timer_type: TimerType, auto_started: bool) -> Vec<Event> {
        if self.snapshot.state.is_active() {
            debug!(?timer_type, "start ignored: a session is already active");
            return Vec::new();
        }

        let now = self.now();
        self.apply_pending_label();
        let profile = self.snapshot.profile().clone();
        if timer_type.is_work() {
            self.streak.reset_if_stale(&profile, now);
        }
        let budget = self.persist_budget(now);

        let end_time = if profile.is_countdown {
            now.saturating_add(profile.duration_ms(timer_type))
        } else if timer_type.is_break() {
            now.saturating_add(budget.as_millis() as u64)
        } else {
            0
        };

        self.snapshot = TimerSnapshot {
            is_ready: self.snapshot.is_ready,
            label: self.snapshot.label.clone(),
            start_time: now,
            last_start_time: now,
            end_time,
            state: TimerState::Running,
            session_type: timer_type,
            ..TimerSnapshot::default()
        };
        info!(?timer_type, auto_started, label = %self.snapshot.label.name, "session started");
        let end_time = self.snapshot.alarm_time();
        self.commit(Event::Start {
            end_time,
            auto_started,
        })
    }

    /// Record the active session and move it to `Finished` without emitting.
    ///
    /// Returns the boot-clock instant the session actually ended, which is
    /// earlier than `now` for a countdown finalized after its end time.
    fn close_session(&mut self, action: FinishActionType, now: u64) -> u64 {
        let ended_at = self.snapshot.session_end(now);
        let credited_until = if action == FinishActionType::ForceFinish
            && self.snapshot.is_current_session_countdown()
        {
            // The sub-second remainder the liveness check cut short counts.
            self.snapshot.end_time.max(ended_at)
        } else {
            ended_at
        };
        let completed_minutes = self.snapshot.worked_until(credited_until) / ONE_MINUTE_MS;

        self.persist_budget(now);
        if action != FinishActionType::ManualSkip {
            self.record_session(completed_minutes, ended_at, now);
            if self.snapshot.session_type.is_work() && self.snapshot.profile().is_countdown {
                self.streak.increment(ended_at);
            }
        }

        let s = &mut self.snapshot;
        s.state = TimerState::Finished;
        s.end_time = now;
        s.completed_minutes = completed_minutes;
        info!(?action, completed_minutes, session_type = ?s.session_type, "session finished");
        self.apply_pending_label();
        ended_at
    }

    fn persist_budget(&self, now: u64) -> Duration {
        let s = &self.snapshot;
        self.break_budget
            .persist(s.session_type, s.state, s.profile(), s.last_start_time, now)
    }

    fn persist_count_up_budget(&self, now: u64) {
        if self.snapshot.is_count_up_work() {
            self.persist_budget(now);
        }
    }

    fn record_session(&self, minutes: u64, ended_at: u64, now: u64) {
        if minutes == 0 {
            debug!("session shorter than a minute; not recorded");
            return;
        }
        let late_by = now.saturating_sub(ended_at) as i64;
        let s = &self.snapshot;
        self.queue.session(SessionRecord {
            duration_min: minutes,
            interruptions: s.interruptions,
            label: s.label.name.clone(),
            notes: None,
            is_work: s.session_type.is_work(),
            end_timestamp: self.clock.now().saturating_sub(late_by),
        });
    }

    /// Session type that follows the current one.
    fn next_type(&self, work_end_time: u64) -> TimerType {
        let profile = self.snapshot.profile();
        if self.snapshot.session_type.is_break() || !profile.is_break_enabled {
            TimerType::Work
        } else if self.streak.should_use_long_break(profile, work_end_time) {
            TimerType::LongBreak
        } else {
            TimerType::Break
        }
    }

    fn auto_start_after(&self, finished: TimerType) -> bool {
        if finished.is_work() && self.snapshot.profile().is_break_enabled {
            self.settings.auto_start_break
        } else {
            self.settings.auto_start_work
        }
    }

    fn defer_label(&mut self, label: Label) {
        self.pending_label = (label != self.snapshot.label).then_some(label);
    }

    fn apply_pending_label(&mut self) {
        if let Some(label) = self.pending_label.take() {
            debug!(label = %label.name, "applying deferred label");
            self.snapshot.label = label;
        }
    }
}
