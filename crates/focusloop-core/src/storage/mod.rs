mod config;
pub mod database;
pub mod memory;
mod writer;

pub use config::{AutoStartConfig, Config};
pub use database::{Database, Stats};
pub use memory::MemoryStore;
pub use writer::{PersistenceWriter, WriteQueue};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::timer::{BreakBudget, Label, Streak};

/// Settings the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    pub label: Label,
    #[serde(default)]
    pub auto_start_work: bool,
    #[serde(default)]
    pub auto_start_break: bool,
}

/// Everything the engine reads from the settings store at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredSettings {
    pub engine: EngineSettings,
    pub break_budget: BreakBudget,
    pub streak: Streak,
}

/// A finished session as handed to the stats store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub duration_min: u64,
    pub interruptions: u32,
    pub label: String,
    pub notes: Option<String>,
    pub is_work: bool,
    /// Wall-clock epoch milliseconds.
    pub end_timestamp: i64,
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<StoredSettings>;

    fn set_break_budget(&self, budget: &BreakBudget) -> Result<()>;

    fn set_streak(&self, streak: &Streak) -> Result<()>;
}

pub trait StatsStore: Send + Sync {
    fn record_session(&self, record: &SessionRecord) -> Result<()>;
}

/// Returns `~/.config/focusloop[-dev]/` based on FOCUSLOOP_ENV.
///
/// Set FOCUSLOOP_ENV=dev to use the development data directory, or
/// FOCUSLOOP_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("FOCUSLOOP_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSLOOP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusloop-dev")
            } else {
                base_dir.join("focusloop")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// On-disk stores: profile and auto-start flags from the TOML config, break
/// budget, streak and sessions from SQLite.
pub struct LocalStore {
    config_path: PathBuf,
    db: Database,
}

impl LocalStore {
    /// Open the stores under [`data_dir`].
    pub fn open() -> Result<Self> {
        let dir = data_dir()?;
        Ok(Self {
            config_path: dir.join("config.toml"),
            db: Database::open_at(&dir.join("focusloop.db"))?,
        })
    }

    pub fn with_parts(config_path: PathBuf, db: Database) -> Self {
        Self { config_path, db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> Result<Config> {
        Config::load_from(&self.config_path)
    }
}

impl SettingsStore for LocalStore {
    fn load(&self) -> Result<StoredSettings> {
        let config = self.config()?;
        Ok(StoredSettings {
            engine: config.engine_settings(),
            break_budget: self.db.break_budget()?,
            streak: self.db.streak()?,
        })
    }

    fn set_break_budget(&self, budget: &BreakBudget) -> Result<()> {
        self.db.set_break_budget(budget)
    }

    fn set_streak(&self, streak: &Streak) -> Result<()> {
        self.db.set_streak(streak)
    }
}

impl StatsStore for LocalStore {
    fn record_session(&self, record: &SessionRecord) -> Result<()> {
        self.db.record_session(record).map(|_| ())
    }
}
