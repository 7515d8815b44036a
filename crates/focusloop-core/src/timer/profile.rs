use serde::{Deserialize, Serialize};

pub const DEFAULT_LABEL_NAME: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerType {
    #[default]
    Work,
    Break,
    LongBreak,
}

impl TimerType {
    pub fn is_work(self) -> bool {
        self == TimerType::Work
    }

    pub fn is_break(self) -> bool {
        !self.is_work()
    }
}

/// Timer configuration of a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerProfile {
    /// Countdown sessions have a fixed duration; count-up work is open-ended
    /// and earns break budget instead.
    #[serde(default = "default_true")]
    pub is_countdown: bool,
    /// Minutes.
    #[serde(default = "default_work_duration")]
    pub work_duration: u32,
    /// Minutes.
    #[serde(default = "default_break_duration")]
    pub break_duration: u32,
    /// Minutes.
    #[serde(default = "default_long_break_duration")]
    pub long_break_duration: u32,
    #[serde(default = "default_true")]
    pub is_break_enabled: bool,
    #[serde(default)]
    pub is_long_break_enabled: bool,
    #[serde(default = "default_sessions_before_long_break")]
    pub sessions_before_long_break: u32,
    /// Work minutes needed to earn one minute of break (count-up only).
    #[serde(default = "default_work_break_ratio")]
    pub work_break_ratio: u32,
}

fn default_true() -> bool {
    true
}
fn default_work_duration() -> u32 {
    25
}
fn default_break_duration() -> u32 {
    5
}
fn default_long_break_duration() -> u32 {
    15
}
fn default_sessions_before_long_break() -> u32 {
    4
}
fn default_work_break_ratio() -> u32 {
    3
}

impl Default for TimerProfile {
    fn default() -> Self {
        Self {
            is_countdown: true,
            work_duration: default_work_duration(),
            break_duration: default_break_duration(),
            long_break_duration: default_long_break_duration(),
            is_break_enabled: true,
            is_long_break_enabled: false,
            sessions_before_long_break: default_sessions_before_long_break(),
            work_break_ratio: default_work_break_ratio(),
        }
    }
}

impl TimerProfile {
    /// Open-ended work profile earning one break minute per `ratio` work minutes.
    pub fn count_up(ratio: u32) -> Self {
        Self {
            is_countdown: false,
            work_break_ratio: ratio,
            ..Self::default()
        }
    }

    /// Configured duration of a session type, in minutes.
    pub fn duration_min(&self, timer_type: TimerType) -> u32 {
        match timer_type {
            TimerType::Work => self.work_duration,
            TimerType::Break => self.break_duration,
            TimerType::LongBreak => self.long_break_duration,
        }
    }

    /// Configured duration of a session type, in milliseconds.
    ///
    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn duration_ms(&self, timer_type: TimerType) -> u64 {
        u64::from(self.duration_min(timer_type))
            .saturating_mul(60)
            .saturating_mul(1000)
    }

    /// Ratio with a floor of 1 so earning never divides by zero.
    pub fn effective_ratio(&self) -> u32 {
        self.work_break_ratio.max(1)
    }

    /// Sessions before a long break, or 0 when long breaks are not in use.
    pub fn sessions_before_long_break_in_use(&self) -> u32 {
        if self.is_countdown && self.is_break_enabled && self.is_long_break_enabled {
            self.sessions_before_long_break
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub profile: TimerProfile,
}

impl Label {
    pub fn new(name: impl Into<String>, profile: TimerProfile) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_LABEL_NAME
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL_NAME, TimerProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_classic_pomodoro() {
        let p = TimerProfile::default();
        assert!(p.is_countdown);
        assert_eq!(p.duration_ms(TimerType::Work), 25 * 60 * 1000);
        assert_eq!(p.duration_ms(TimerType::Break), 5 * 60 * 1000);
        assert_eq!(p.duration_ms(TimerType::LongBreak), 15 * 60 * 1000);
    }

    #[test]
    fn zero_ratio_is_floored() {
        assert_eq!(TimerProfile::count_up(0).effective_ratio(), 1);
        assert_eq!(TimerProfile::count_up(4).effective_ratio(), 4);
    }

    #[test]
    fn long_break_sessions_only_for_countdown_with_long_breaks() {
        let mut p = TimerProfile {
            is_long_break_enabled: true,
            ..TimerProfile::default()
        };
        assert_eq!(p.sessions_before_long_break_in_use(), 4);
        p.is_break_enabled = false;
        assert_eq!(p.sessions_before_long_break_in_use(), 0);
        let c = TimerProfile {
            is_long_break_enabled: true,
            ..TimerProfile::count_up(3)
        };
        assert_eq!(c.sessions_before_long_break_in_use(), 0);
    }

    #[test]
    fn profile_deserializes_with_defaults() {
        let p: TimerProfile = toml::from_str("is_countdown = false").unwrap();
        assert!(!p.is_countdown);
        assert_eq!(p.work_duration, 25);
        assert_eq!(p.work_break_ratio, 3);
    }
}
