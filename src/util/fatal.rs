//! Fail-fast reporting for unrecoverable errors.
//!
//! Native GPU failures and scheduler misuse are not propagated: they are
//! logged with the failing operation and the process is aborted.

use std::fmt::Display;

/// Log `err` at error level under `operation` and abort the process.
#[cold]
pub fn fatal(operation: &str, err: impl Display) -> ! {
    tracing::error!(operation, error = %err, "fatal error, aborting");
    eprintln!("fatal: {operation}: {err}");
    std::process::abort()
}

/// Unwrap `result` or abort the process with a fatal log line.
pub fn fail_fast<T, E: Display>(operation: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => fatal(operation, err),
    }
}
