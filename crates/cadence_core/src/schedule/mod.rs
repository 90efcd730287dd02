//! Frame scheduling.
//!
//! Two independent drivers share one identity model (`TaskKey`):
//! - `IntervalScheduler` runs periodic tasks, each at its own cadence.
//! - `PhaseExecutor` runs update functions once per phase, ordered by their
//!   declared dependencies and priority, fanning the Parallel phase out to a
//!   rayon pool.
//!
//! Failures in user callbacks are logged and isolated; they never cross the
//! scheduler boundary.

mod callback;
mod dependency_order;
mod interval_scheduler;
mod phase;
mod phase_executor;
mod registration_error;
mod task;
mod task_key;
mod task_registry;
mod update_descriptor;

pub use callback::{CallbackError, CallbackResult};
pub use interval_scheduler::{IntervalScheduler, TickBudget, TickReport};
pub use phase::UpdatePhase;
pub use phase_executor::{PhaseExecutor, PhaseReport};
pub use registration_error::RegistrationError;
pub use task::{TaskContext, TaskDescriptor, TaskFn};
pub use task_key::TaskKey;
pub use update_descriptor::{UpdateContext, UpdateDescriptor, UpdateFn};
