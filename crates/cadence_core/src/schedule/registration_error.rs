use crate::schedule::{TaskKey, UpdatePhase};
use thiserror::Error;

/// Configuration errors reported while registering tasks or update functions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("task {key} is already scheduled")]
    DuplicateTask { key: TaskKey },

    #[error("update function {key} is already registered in phase {phase}")]
    DuplicateKey { key: TaskKey, phase: UpdatePhase },

    #[error("update function '{name}' is already registered in phase {phase}")]
    DuplicateName { name: String, phase: UpdatePhase },

    #[error("update function {key} has an empty name")]
    EmptyName { key: TaskKey },

    #[error("dependency cycle in phase {phase} between: {}", names.join(", "))]
    DependencyCycle { phase: UpdatePhase, names: Vec<String> },
}
