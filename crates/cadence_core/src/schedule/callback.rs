use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};

/// Error type returned by task and update callbacks.
pub type CallbackError = Box<dyn Error + Send + Sync>;

/// Result type returned by task and update callbacks.
pub type CallbackResult = Result<(), CallbackError>;

/// Run a callback, turning both `Err` returns and panics into a message.
///
/// Callbacks are isolated from each other: a failure is reported to the caller,
/// which logs it and moves on to the next unit of work.
pub(crate) fn invoke_guarded<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> CallbackResult,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
