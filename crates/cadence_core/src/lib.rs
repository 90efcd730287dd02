//! Cadence Engine Core
//!
//! Contains the frame scheduling primitives:
//! - Virtual frame clock
//! - Interval scheduler for periodic tasks
//! - Phase executor for dependency-ordered update functions

pub mod schedule;
pub mod time;

pub use schedule::{
    CallbackResult, IntervalScheduler, PhaseExecutor, PhaseReport, RegistrationError, TaskContext,
    TaskDescriptor, TaskKey, TickBudget, TickReport, UpdateContext, UpdateDescriptor,
    UpdatePhase,
};
pub use time::PriorityClock;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
