//! Error types for scheduler and interop operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
    /// The live-fiber counter was decremented below zero.
    #[error("live fiber counter underflow")]
    CounterUnderflow,
    /// A task let a panic escape its own boundary.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    /// Work was submitted after shutdown was requested.
    #[error("scheduler is not running")]
    NotRunning,
    /// The process-wide scheduler was initialized twice.
    #[error("scheduler already initialized")]
    AlreadyInitialized,
    /// The process-wide scheduler was used before `init`.
    #[error("scheduler not initialized")]
    NotInitialized,
    /// A detached task needs a worker thread and the pool has none.
    #[error("no worker threads to host a detached task")]
    NoWorkers,
    /// `terminate` was called from inside a task, which can never drain.
    #[error("terminate must not be called from inside a task or worker")]
    TerminateFromTask,
}

/// Errors produced while driving a GPU interop resource.
#[derive(Debug, Error)]
pub enum InteropError {
    /// The native graphics or compute API reported a failure.
    #[error("{operation} failed: {message}")]
    Native {
        /// Native call that failed.
        operation: &'static str,
        /// Driver-provided description.
        message: String,
    },
    /// The requested operation is not valid in the current lifecycle state.
    #[error("{operation} is not valid while the resource is {state}")]
    InvalidTransition {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the resource was in.
        state: &'static str,
    },
    /// The resource has no interop registration yet.
    #[error("resource is not registered with the compute API")]
    NotRegistered,
    /// Moving a resource between compute devices is not supported.
    #[error("cross-device migration is not supported")]
    MigrationUnsupported,
    /// The scheduler refused the interop task.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl InteropError {
    /// Shorthand for a native API failure.
    pub fn native(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Native {
            operation,
            message: message.into(),
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
