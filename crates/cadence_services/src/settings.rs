//! Settings management

use cadence_core::{PriorityClock, TickBudget};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write settings: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scheduler: SchedulerSettings,
    pub phases: PhaseSettings,
    pub preload: PreloadSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Clock granularity; time advances in steps of at least this much.
    pub min_granularity_ms: u64,
    /// Task callbacks per tick; 0 is raised to 1.
    pub max_runs_per_tick: Option<usize>,
    pub time_budget_ms: Option<u64>,
    /// Simulated time per frame in the runtime loop.
    pub frame_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSettings {
    /// Parallel phase workers; 0 uses the global rayon pool.
    pub worker_threads: usize,
    /// Index range handed to every update function.
    pub component_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadSettings {
    pub resources_per_frame: usize,
    pub register_names: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `cadence_core=debug`.
    pub level: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            min_granularity_ms: 0,
            max_runs_per_tick: None,
            time_budget_ms: None,
            frame_ms: 1000.0 / 60.0,
        }
    }
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            component_count: 1024,
        }
    }
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            resources_per_frame: 4,
            register_names: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SchedulerSettings {
    pub fn budget(&self) -> TickBudget {
        TickBudget {
            max_runs: self.max_runs_per_tick.map(|max| max.max(1)),
            max_time: self.time_budget_ms.map(Duration::from_millis),
        }
    }

    pub fn clock(&self) -> PriorityClock {
        PriorityClock::with_granularity(Duration::from_millis(self.min_granularity_ms))
    }

    /// Frame delta; non-finite or negative values fall back to 60 Hz.
    pub fn frame_duration(&self) -> Duration {
        if self.frame_ms.is_finite() && self.frame_ms > 0.0 {
            Duration::from_micros((self.frame_ms * 1000.0).round() as u64)
        } else {
            cadence_core::time::DEFAULT_FRAME_DURATION
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(SettingsError::Read)?;
        let settings = serde_json::from_str(&contents).map_err(SettingsError::Parse)?;
        tracing::info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(SettingsError::Write)?;
        }
        let serialized = serde_json::to_string_pretty(self).map_err(SettingsError::Serialize)?;
        std::fs::write(path, serialized).map_err(SettingsError::Write)?;
        Ok(())
    }
}
