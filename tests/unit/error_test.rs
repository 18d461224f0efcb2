//! Tests for error types

use soul_scheduler::core::{InteropError, SchedulerError};

#[test]
fn test_not_running_error() {
    let err = SchedulerError::NotRunning;
    assert_eq!(format!("{}", err), "scheduler is not running");
}

#[test]
fn test_counter_underflow_error() {
    let err = SchedulerError::CounterUnderflow;
    assert_eq!(format!("{}", err), "live fiber counter underflow");
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("park_timeout_ms must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: park_timeout_ms must be greater than 0"
    );
}

#[test]
fn test_task_panicked_error() {
    let err = SchedulerError::TaskPanicked("boom".to_string());
    assert_eq!(format!("{}", err), "task panicked: boom");
}

#[test]
fn test_native_interop_error() {
    let err = InteropError::native("map", "device lost");
    assert_eq!(format!("{}", err), "map failed: device lost");
}

#[test]
fn test_invalid_transition_error() {
    let err = InteropError::InvalidTransition {
        operation: "unmap",
        state: "registered",
    };
    assert_eq!(
        format!("{}", err),
        "unmap is not valid while the resource is registered"
    );
}

#[test]
fn test_scheduler_error_converts_into_interop_error() {
    let err: InteropError = SchedulerError::NotRunning.into();
    assert_eq!(format!("{}", err), "scheduler is not running");
}

#[test]
fn test_app_result_wraps_errors() {
    fn fails() -> soul_scheduler::core::AppResult<()> {
        Err(SchedulerError::NoWorkers.into())
    }
    let err = fails().unwrap_err();
    assert!(err.to_string().contains("no worker threads"));
}
