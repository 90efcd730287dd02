//! Cadence Services Layer
//!
//! Engine configuration shared by the runtime and tools.

pub mod settings;

pub use settings::{
    LoggingSettings, PhaseSettings, PreloadSettings, SchedulerSettings, Settings, SettingsError,
};
