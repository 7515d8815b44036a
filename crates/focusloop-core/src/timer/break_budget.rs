//! Break budget accounting for open-ended (count-up) work.
//!
//! Working earns one minute of break per `work_break_ratio` minutes; any time
//! not spent working (paused, idle, on a break) spends it one-to-one. The
//! persisted value is "amount owed as of `anchor_time`", so the current
//! budget can always be derived from the last persisted pair and the clock.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::profile::{TimerProfile, TimerType};
use super::snapshot::TimerState;
use crate::storage::WriteQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakBudget {
    pub amount: Duration,
    /// Boot-clock time at which `amount` was owed.
    pub anchor_time: u64,
}

impl BreakBudget {
    pub fn new(amount: Duration, anchor_time: u64) -> Self {
        Self {
            amount,
            anchor_time,
        }
    }

    /// Budget left at `now` after spending idle time since the anchor.
    ///
    /// An anchor later than `now` comes from before a reboot; no idle time
    /// can be attributed, so the amount is kept as is.
    pub fn remaining(&self, now: u64) -> Duration {
        let idle = Duration::from_millis(now.saturating_sub(self.anchor_time));
        self.amount.saturating_sub(idle)
    }
}

/// Hot, persisted break budget.
pub struct BreakBudgetLedger {
    data: watch::Sender<BreakBudget>,
    queue: WriteQueue,
}

impl BreakBudgetLedger {
    pub fn new(initial: BreakBudget, queue: WriteQueue) -> Self {
        Self {
            data: watch::Sender::new(initial),
            queue,
        }
    }

    /// Current budget for a session in the given situation.
    ///
    /// Always zero for countdown profiles. Running work adds what was earned
    /// since `last_start_time` to the persisted amount; everything else decays
    /// the persisted amount by the time elapsed since its anchor.
    pub fn current_budget(
        &self,
        timer_type: TimerType,
        state: TimerState,
        profile: &TimerProfile,
        last_start_time: u64,
        now: u64,
    ) -> Duration {
        if profile.is_countdown {
            return Duration::ZERO;
        }
        let persisted = *self.data.borrow();
        if timer_type.is_work() && state.is_running() {
            let worked = Duration::from_millis(now.saturating_sub(last_start_time));
            persisted.amount + worked / profile.effective_ratio()
        } else {
            persisted.remaining(now)
        }
    }

    /// Recompute the budget, anchor it at `now` and write it through.
    ///
    /// Returns the persisted amount. Countdown profiles never touch the ledger.
    pub fn persist(
        &self,
        timer_type: TimerType,
        state: TimerState,
        profile: &TimerProfile,
        last_start_time: u64,
        now: u64,
    ) -> Duration {
        if profile.is_countdown {
            return Duration::ZERO;
        }
        let amount = self.current_budget(timer_type, state, profile, last_start_time, now);
        let budget = BreakBudget::new(amount, now);
        debug!(amount_ms = amount.as_millis() as u64, anchor = now, "persisting break budget");
        self.data.send_replace(budget);
        self.queue.break_budget(budget);
        amount
    }

    pub fn persisted(&self) -> BreakBudget {
        *self.data.borrow()
    }

    /// Amount as of the last persist, without decay. This is what a count-up
    /// break is allowed to last when it starts.
    pub fn persisted_amount(&self) -> Duration {
        self.data.borrow().amount
    }

    pub fn subscribe(&self) -> watch::Receiver<BreakBudget> {
        self.data.subscribe()
    }

    /// Replace the in-memory value after the store was changed externally.
    pub fn reload(&self, budget: BreakBudget) {
        self.data.send_replace(budget);
    }
}
