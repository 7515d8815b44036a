//! In-memory stores.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EngineSettings, SessionRecord, SettingsStore, StatsStore, StoredSettings};
use crate::error::{CoreError, Result};
use crate::timer::{BreakBudget, Streak};

#[derive(Default)]
struct Inner {
    settings: StoredSettings,
    sessions: Vec<SessionRecord>,
    failing: bool,
}

/// Settings and stats kept in memory. `set_failing(true)` makes every store
/// call return an error.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: StoredSettings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                settings,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(inner: &Inner) -> Result<()> {
        if inner.failing {
            Err(CoreError::Custom("memory store is failing".into()))
        } else {
            Ok(())
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn set_engine_settings(&self, engine: EngineSettings) {
        self.lock().settings.engine = engine;
    }

    pub fn break_budget(&self) -> BreakBudget {
        self.lock().settings.break_budget
    }

    pub fn streak(&self) -> Streak {
        self.lock().settings.streak
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.lock().sessions.clone()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<StoredSettings> {
        let inner = self.lock();
        Self::check(&inner)?;
        Ok(inner.settings.clone())
    }

    fn set_break_budget(&self, budget: &BreakBudget) -> Result<()> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.settings.break_budget = *budget;
        Ok(())
    }

    fn set_streak(&self, streak: &Streak) -> Result<()> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.settings.streak = *streak;
        Ok(())
    }
}

impl StatsStore for MemoryStore {
    fn record_session(&self, record: &SessionRecord) -> Result<()> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.sessions.push(record.clone());
        Ok(())
    }
}
