//! Tests for utility functions

use soul_scheduler::core::{LaunchPolicy, Priority, TaskOptions};
use soul_scheduler::util::{fail_fast, init_tracing};

#[test]
fn test_priority_ordering() {
    assert!(Priority::High > Priority::Low);
    assert_eq!(Priority::default(), Priority::High);
    assert_eq!(Priority::DEQUEUE_ORDER, [Priority::High, Priority::Low]);
}

#[test]
fn test_task_options() {
    let opts = TaskOptions::new(Priority::Low, LaunchPolicy::Continue).affine();
    assert_eq!(opts.priority, Priority::Low);
    assert_eq!(opts.launch, LaunchPolicy::Continue);
    assert!(opts.context_affine);
}

#[test]
fn test_fail_fast_passes_ok_through() {
    let value: Result<u32, String> = Ok(7);
    assert_eq!(fail_fast("test", value), 7);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
