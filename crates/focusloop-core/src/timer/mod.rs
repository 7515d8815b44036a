mod break_budget;
mod engine;
mod handle;
mod profile;
mod snapshot;
mod streak;

pub use break_budget::{BreakBudget, BreakBudgetLedger};
pub use engine::{FinishActionType, TimerEngine, FORCE_FINISH_THRESHOLD_MS};
pub use handle::TimerHandle;
pub use profile::{Label, TimerProfile, TimerType, DEFAULT_LABEL_NAME};
pub use snapshot::{TimerSnapshot, TimerState, COUNT_UP_HARD_LIMIT_MS, ONE_MINUTE_MS};
pub use streak::{max_idle_ms, Streak, StreakTracker, STREAK_GRACE_MS};
