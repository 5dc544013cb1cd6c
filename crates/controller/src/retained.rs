//! Wake-counter state that survives deep sleep.
//!
//! On the device target this lives in RTC retained memory; on a host target
//! it is a small JSON file. Either way it is reset only by power loss (or a
//! missing/corrupt backing file, which reads as first power-on).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ports::RetainedStore;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Cumulative boot counter. Incremented exactly once per wake cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedState {
    pub boot_count: u32,
}

impl RetainedState {
    /// True on the very first boot after power-on (counter still at its
    /// initial value, before this cycle's increment).
    pub fn first_boot(&self) -> bool {
        self.boot_count == 0
    }

    /// Whether this cycle samples the sensors' battery characteristic.
    /// Evaluated against the pre-increment counter, so the first boot always
    /// reads battery.
    pub fn reads_battery(&self, interval: u32) -> bool {
        interval != 0 && self.boot_count % interval == 0
    }

    /// The state to persist for the next wake.
    pub fn next(self) -> Self {
        Self {
            boot_count: self.boot_count.saturating_add(1),
        }
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RetainedStore for FileStore {
    fn load(&mut self) -> RetainedState {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(
                    path = %self.path.display(),
                    "retained state unreadable ({e}) — treating as first power-on"
                );
                RetainedState::default()
            }),
            // Missing file is the normal first power-on case.
            Err(_) => RetainedState::default(),
        }
    }

    fn save(&mut self, state: &RetainedState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let contents = serde_json::to_string(state)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
