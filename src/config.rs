use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use tracing::debug;

use crate::core::schedule::DEFAULT_BUFFER_SECS;
use crate::core::timeline::DEFAULT_GROUP_WINDOW_SECS;
use crate::orchestration::OrchestratorConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gap between a step's prerequisites finishing and the step starting.
    pub buffer_secs: u64,
    pub poll_interval_ms: u64,
    pub tick_interval_ms: u64,
    /// Parallel steps starting within this window are shown together.
    pub parallel_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_secs: DEFAULT_BUFFER_SECS as u64,
            poll_interval_ms: 1000,
            tick_interval_ms: 1000,
            parallel_window_secs: DEFAULT_GROUP_WINDOW_SECS as u64,
        }
    }
}

impl Config {
    pub fn mise_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".mise"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::mise_dir()?.join("mise.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Config::load path={}", path.display());
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            buffer_secs = config.buffer_secs,
            poll_interval_ms = config.poll_interval_ms,
            tick_interval_ms = config.tick_interval_ms,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Reject intervals that would spin the background actors.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Validation("poll_interval_ms must be positive".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Validation("tick_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn buffer(&self) -> TimeDelta {
        seconds(self.buffer_secs)
    }

    pub fn group_window(&self) -> TimeDelta {
        seconds(self.parallel_window_secs)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            buffer: self.buffer(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            group_window: self.group_window(),
        }
    }
}

fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
