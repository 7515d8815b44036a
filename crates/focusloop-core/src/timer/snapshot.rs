//! The authoritative timer snapshot.

use serde::{Deserialize, Serialize};

use super::profile::{Label, TimerProfile, TimerType};

/// Safety ceiling for open-ended work sessions (15 hours).
pub const COUNT_UP_HARD_LIMIT_MS: u64 = 15 * 60 * 60 * 1000;

pub const ONE_MINUTE_MS: u64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    #[default]
    Reset,
    Running,
    Paused,
    Finished,
}

impl TimerState {
    pub fn is_running(self) -> bool {
        self == TimerState::Running
    }

    pub fn is_paused(self) -> bool {
        self == TimerState::Paused
    }

    /// Running or paused: a session is in progress and blocks a second start.
    pub fn is_active(self) -> bool {
        self.is_running() || self.is_paused()
    }

    pub fn is_finished(self) -> bool {
        self == TimerState::Finished
    }

    pub fn is_reset(self) -> bool {
        self == TimerState::Reset
    }
}

/// State of the single timer.
///
/// Every timestamp is a boot-clock value in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub is_ready: bool,
    pub label: Label,
    pub start_time: u64,
    pub last_start_time: u64,
    pub last_pause_time: u64,
    /// Only meaningful for countdown profiles and break sessions.
    pub end_time: u64,
    /// Base time captured when pausing.
    pub time_at_pause: u64,
    pub time_spent_paused: u64,
    pub state: TimerState,
    pub session_type: TimerType,
    pub completed_minutes: u64,
    #[serde(default)]
    pub interruptions: u32,
}

impl TimerSnapshot {
    /// Idle snapshot for `label`.
    pub fn ready(label: Label) -> Self {
        Self {
            is_ready: true,
            label,
            ..Self::default()
        }
    }

    /// Back to `Reset`, keeping readiness and label.
    pub fn reset(&self) -> Self {
        Self {
            is_ready: self.is_ready,
            label: self.label.clone(),
            ..Self::default()
        }
    }

    pub fn profile(&self) -> &TimerProfile {
        &self.label.profile
    }

    /// Countdown profiles count down every session; count-up profiles only
    /// count down their breaks (spending the budget).
    pub fn is_current_session_countdown(&self) -> bool {
        self.profile().is_countdown || self.session_type.is_break()
    }

    pub fn is_count_up_work(&self) -> bool {
        !self.profile().is_countdown && self.session_type.is_work()
    }

    /// Remaining time for countdown sessions, elapsed work for count-up work.
    ///
    /// Negative when a countdown is overdue.
    pub fn base_time(&self, now: u64) -> i64 {
        match self.state {
            TimerState::Reset => {
                if self.profile().is_countdown {
                    self.profile().duration_ms(self.session_type) as i64
                } else {
                    0
                }
            }
            TimerState::Paused => self.time_at_pause as i64,
            TimerState::Running | TimerState::Finished => {
                if self.is_current_session_countdown() {
                    self.end_time as i64 - now as i64
                } else {
                    now as i64 - self.start_time as i64 - self.time_spent_paused as i64
                }
            }
        }
    }

    /// Boot-clock instant the session stopped accruing time.
    ///
    /// A countdown never runs past its `end_time`, however late it is
    /// finalized.
    pub fn session_end(&self, now: u64) -> u64 {
        let until = match self.state {
            TimerState::Paused => self.last_pause_time,
            _ => now,
        };
        if self.is_current_session_countdown() {
            until.min(self.end_time)
        } else {
            until
        }
    }

    /// Time actually spent in the session, pauses excluded.
    pub fn worked_ms(&self, now: u64) -> u64 {
        self.worked_until(self.session_end(now))
    }

    /// Time spent in the session if it ended at `end`, pauses excluded.
    pub fn worked_until(&self, end: u64) -> u64 {
        end.saturating_sub(self.start_time)
            .saturating_sub(self.time_spent_paused)
    }

    /// Instant the host should schedule its alarm for.
    pub fn alarm_time(&self) -> u64 {
        if self.is_current_session_countdown() {
            self.end_time
        } else {
            self.start_time
                .saturating_add(self.time_spent_paused)
                .saturating_add(COUNT_UP_HARD_LIMIT_MS)
        }
    }

    /// Latest boot-clock timestamp recorded in the snapshot.
    pub fn latest_timestamp(&self) -> u64 {
        self.start_time
            .max(self.last_start_time)
            .max(self.last_pause_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(profile: TimerProfile, session_type: TimerType, start: u64) -> TimerSnapshot {
        let end_time = if profile.is_countdown || session_type.is_break() {
            start + profile.duration_ms(session_type)
        } else {
            0
        };
        TimerSnapshot {
            is_ready: true,
            label: Label::new("test", profile),
            start_time: start,
            last_start_time: start,
            end_time,
            state: TimerState::Running,
            session_type,
            ..TimerSnapshot::default()
        }
    }

    #[test]
    fn reset_countdown_base_time_is_full_duration() {
        let snap = TimerSnapshot::ready(Label::default());
        assert_eq!(snap.base_time(123_456), 25 * 60_000);
    }

    #[test]
    fn reset_count_up_base_time_is_zero() {
        let snap = TimerSnapshot::ready(Label::new("flow", TimerProfile::count_up(3)));
        assert_eq!(snap.base_time(99), 0);
    }

    #[test]
    fn overdue_countdown_goes_negative() {
        let snap = running(TimerProfile::default(), TimerType::Work, 0);
        assert_eq!(snap.base_time(25 * 60_000 + 1_000), -1_000);
    }

    #[test]
    fn count_up_base_time_excludes_pauses() {
        let mut snap = running(TimerProfile::count_up(3), TimerType::Work, 1_000);
        snap.time_spent_paused = 500;
        assert_eq!(snap.base_time(11_000), 9_500);
        assert_eq!(snap.worked_ms(11_000), 9_500);
    }

    #[test]
    fn paused_worked_time_stops_at_pause() {
        let mut snap = running(TimerProfile::default(), TimerType::Work, 0);
        snap.state = TimerState::Paused;
        snap.last_pause_time = 60_000;
        assert_eq!(snap.worked_ms(600_000), 60_000);
    }

    #[test]
    fn overdue_countdown_stops_at_end_time() {
        let mut snap = running(TimerProfile::default(), TimerType::Work, 0);
        snap.time_spent_paused = 60_000;
        snap.end_time += 60_000;
        assert_eq!(snap.session_end(85 * 60_000), 26 * 60_000);
        assert_eq!(snap.worked_ms(85 * 60_000), 25 * 60_000);

        // Count-up work has no planned end.
        let snap = running(TimerProfile::count_up(3), TimerType::Work, 0);
        assert_eq!(snap.worked_ms(85 * 60_000), 85 * 60_000);
    }

    #[test]
    fn count_up_alarm_is_hard_limit() {
        let snap = running(TimerProfile::count_up(3), TimerType::Work, 5);
        assert_eq!(snap.alarm_time(), 5 + COUNT_UP_HARD_LIMIT_MS);
        let brk = running(TimerProfile::count_up(3), TimerType::Break, 5);
        assert!(brk.is_current_session_countdown());
    }

    #[test]
    fn reset_keeps_label_and_readiness() {
        let snap = running(TimerProfile::count_up(2), TimerType::Break, 7);
        let reset = snap.reset();
        assert!(reset.is_ready);
        assert_eq!(reset.label, snap.label);
        assert_eq!(reset.state, TimerState::Reset);
        assert_eq!(reset.session_type, TimerType::Work);
        assert_eq!(reset.start_time, 0);
    }
}
