//! # Focusloop Core Library
//!
//! Core logic of the focusloop focus timer: a single authoritative timer
//! snapshot driven through countdown and count-up sessions, a break budget
//! earned by open-ended work, a streak that decides when long breaks are due,
//! and a foreground watchdog that ends sessions the host missed.
//!
//! The `focusloop` CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: single-writer state machine on the boot clock; every
//!   transition publishes a snapshot and emits one [`Event`]
//! - **Ledgers**: [`BreakBudgetLedger`] and [`StreakTracker`], hot values
//!   persisted in the background
//! - **Monitor**: 1 s liveness polling while the UI is in the foreground
//! - **Storage**: SQLite for sessions and ledgers, TOML for configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`] / [`TimerHandle`]: the state machine and its shared handle
//! - [`ForegroundMonitor`]: the liveness watchdog
//! - [`Clock`]: injected time source
//! - [`EventListener`]: collaborators notified of timer events

pub mod clock;
pub mod error;
pub mod events;
pub mod monitor;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, MonotonicGuard, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError};
pub use events::{Event, EventFanout, EventListener, LogListener, RecordingListener};
pub use monitor::ForegroundMonitor;
pub use storage::{
    Config, Database, EngineSettings, LocalStore, MemoryStore, SessionRecord, SettingsStore,
    StatsStore, StoredSettings,
};
pub use timer::{
    BreakBudget, BreakBudgetLedger, FinishActionType, Label, Streak, StreakTracker, TimerEngine,
    TimerHandle, TimerProfile, TimerSnapshot, TimerState, TimerType,
};
