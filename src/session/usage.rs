//! Metered free attempts with a premium override, and the storage port that
//! persists them across restarts.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AttemptBudget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptBudget {
    pub attempts_left: u32,
    /// Unlimited use; `attempts_left` is then irrelevant.
    pub is_premium: bool,
}

impl AttemptBudget {
    pub fn new(attempts_left: u32, is_premium: bool) -> Self {
        Self {
            attempts_left,
            is_premium,
        }
    }

    /// Whether another recording may start.
    ///
    /// ```
    /// use visionally::session::AttemptBudget;
    ///
    /// assert!(AttemptBudget::new(1, false).can_start());
    /// assert!(!AttemptBudget::new(0, false).can_start());
    /// assert!(AttemptBudget::new(0, true).can_start());
    /// ```
    pub fn can_start(&self) -> bool {
        self.is_premium || self.attempts_left > 0
    }

    /// Charge one successful analysis. Premium budgets are never charged.
    pub fn consume(&mut self) {
        if !self.is_premium {
            self.attempts_left = self.attempts_left.saturating_sub(1);
        }
    }
}

// ---------------------------------------------------------------------------
// UsageStore
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("usage file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("usage file is malformed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialise usage: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Durable home of the [`AttemptBudget`]. Read once at startup, written
/// after every charge and every upgrade.
pub trait UsageStore: Send + Sync {
    fn load(&self) -> Result<Option<AttemptBudget>, UsageError>;
    fn save(&self, budget: &AttemptBudget) -> Result<(), UsageError>;
}

/// `usage.toml` next to `settings.toml`.
#[derive(Debug, Clone)]
pub struct TomlUsageStore {
    path: PathBuf,
}

impl TomlUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UsageStore for TomlUsageStore {
    /// `Ok(None)` when the file does not exist yet.
    fn load(&self) -> Result<Option<AttemptBudget>, UsageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(Some(toml::from_str(&contents)?))
    }

    fn save(&self, budget: &AttemptBudget) -> Result<(), UsageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(budget)?)?;
        Ok(())
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    budget: Mutex<Option<AttemptBudget>>,
    saves: Mutex<usize>,
}

impl MemoryUsageStore {
    pub fn new(initial: Option<AttemptBudget>) -> Self {
        Self {
            budget: Mutex::new(initial),
            saves: Mutex::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UsageStore for MemoryUsageStore {
    fn load(&self) -> Result<Option<AttemptBudget>, UsageError> {
        Ok(*self.budget.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, budget: &AttemptBudget) -> Result<(), UsageError> {
        *self.budget.lock().unwrap_or_else(|e| e.into_inner()) = Some(*budget);
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

/// Load the stored budget, falling back to `free_attempts` on a first run
/// or an unreadable file.
pub fn load_budget(store: &dyn UsageStore, free_attempts: u32) -> AttemptBudget {
    match store.load() {
        Ok(Some(budget)) => budget,
        Ok(None) => AttemptBudget::new(free_attempts, false),
        Err(e) => {
            log::warn!("usage: failed to load stored budget ({e}), starting fresh");
            AttemptBudget::new(free_attempts, false)
        }
    }
}
