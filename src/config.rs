//! Process configuration handed to the store by the binary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::store::{StoreConfig, DEFAULT_FLUSH_DEBOUNCE};

pub const DEFAULT_COMPLETED_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_FAILED_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    pub persistence_enabled: bool,
    pub state_dir: PathBuf,
    /// `0` keeps completed missions forever.
    pub completed_retention_days: u32,
    /// `0` keeps failed missions forever.
    pub failed_retention_days: u32,
    pub log_level: String,
    pub flush_debounce: Duration,
}

impl Config {
    /// Defaults with the state directory under the platform data directory.
    pub fn with_default_dir() -> Result<Self> {
        Ok(Self::new(Self::default_state_dir()?))
    }

    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            persistence_enabled: true,
            state_dir: state_dir.into(),
            completed_retention_days: DEFAULT_COMPLETED_RETENTION_DAYS,
            failed_retention_days: DEFAULT_FAILED_RETENTION_DAYS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            flush_debounce: DEFAULT_FLUSH_DEBOUNCE,
        }
    }

    pub fn default_state_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "mission-control")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("state"))
    }

    pub fn store_config(&self) -> StoreConfig {
        let base = if self.persistence_enabled {
            StoreConfig::persistent(&self.state_dir)
        } else {
            StoreConfig::in_memory()
        };

        base.with_debounce(self.flush_debounce)
            .with_retention_days(self.completed_retention_days, self.failed_retention_days)
    }
}
