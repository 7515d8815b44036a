//! Long-break streak.
//!
//! Counts consecutive countdown work sessions that were completed close
//! enough to each other. Every `sessions_before_long_break`-th one earns a
//! long break; a gap longer than one work + break cycle plus a grace window
//! expires the streak.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::profile::TimerProfile;
use super::snapshot::ONE_MINUTE_MS;
use crate::storage::WriteQueue;

/// Idle time tolerated on top of one work + break cycle.
pub const STREAK_GRACE_MS: u64 = 30 * ONE_MINUTE_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Streak {
    pub count: u32,
    /// Boot-clock time of the last completed work session; 0 when none.
    pub last_work_end_time: u64,
}

impl Streak {
    pub fn new(count: u32, last_work_end_time: u64) -> Self {
        Self {
            count,
            last_work_end_time,
        }
    }

    /// Position inside the current long-break cycle.
    pub fn streak_in_use(&self, sessions_before_long_break: u32) -> u32 {
        if sessions_before_long_break == 0 {
            0
        } else {
            self.count % sessions_before_long_break
        }
    }
}

/// Longest gap after the last completed work session that keeps the streak.
pub fn max_idle_ms(profile: &TimerProfile) -> u64 {
    u64::from(profile.work_duration)
        .saturating_add(u64::from(profile.break_duration))
        .saturating_mul(ONE_MINUTE_MS)
        .saturating_add(STREAK_GRACE_MS)
}

/// Hot, persisted streak.
pub struct StreakTracker {
    data: watch::Sender<Streak>,
    queue: WriteQueue,
}

impl StreakTracker {
    pub fn new(initial: Streak, queue: WriteQueue) -> Self {
        Self {
            data: watch::Sender::new(initial),
            queue,
        }
    }

    pub fn current(&self) -> Streak {
        *self.data.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Streak> {
        self.data.subscribe()
    }

    pub fn reload(&self, streak: Streak) {
        self.data.send_replace(streak);
    }

    /// A countdown work session completed at `now`.
    pub fn increment(&self, now: u64) {
        let streak = Streak::new(self.current().count.saturating_add(1), now);
        debug!(count = streak.count, "streak incremented");
        self.write(streak);
    }

    /// Expire the streak when the last completed work session is too old.
    pub fn reset_if_stale(&self, profile: &TimerProfile, now: u64) {
        if self.finished_recently(profile, now) {
            return;
        }
        if self.current() != Streak::default() {
            debug!("resetting streak after inactivity");
            self.write(Streak::default());
        }
    }

    /// Whether the work session ending at `work_end_time` earns a long break.
    pub fn should_use_long_break(&self, profile: &TimerProfile, work_end_time: u64) -> bool {
        if !profile.is_countdown || !profile.is_long_break_enabled {
            return false;
        }
        let sessions = profile.sessions_before_long_break;
        if sessions == 0 {
            return false;
        }
        self.current().streak_in_use(sessions) == 0 && self.finished_recently(profile, work_end_time)
    }

    /// Write the in-memory value through again.
    pub fn persist(&self) {
        self.queue.streak(self.current());
    }

    fn finished_recently(&self, profile: &TimerProfile, at: u64) -> bool {
        if !profile.is_countdown {
            return false;
        }
        let last = self.current().last_work_end_time;
        // An end time after `at` was recorded before a reboot: the real gap is unknown.
        if last == 0 || last > at {
            return false;
        }
        at - last < max_idle_ms(profile)
    }

    fn write(&self, streak: Streak) {
        self.data.send_replace(streak);
        self.queue.streak(streak);
    }
}
