//! Tests for builder modules

use soul_scheduler::builders::{build_frame_loop, build_scheduler};
use soul_scheduler::config::{EngineConfig, SchedulerConfig};
use soul_scheduler::core::SchedulerError;

#[test]
fn test_build_scheduler_uses_scheduler_section() {
    let cfg = EngineConfig {
        scheduler: SchedulerConfig::default().with_worker_count(1),
        ..EngineConfig::default()
    };
    let scheduler = build_scheduler(&cfg).unwrap();
    assert_eq!(scheduler.worker_count(), 1);
    assert!(scheduler.running());
    scheduler.terminate().unwrap();
}

#[test]
fn test_build_scheduler_reports_invalid_config() {
    let cfg = EngineConfig {
        scheduler: SchedulerConfig::default().with_thread_stack_size(16),
        ..EngineConfig::default()
    };
    assert!(matches!(build_scheduler(&cfg), Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_build_frame_loop_uses_delta_time() {
    let cfg = EngineConfig {
        scheduler: SchedulerConfig::default().with_worker_count(0),
        delta_time_secs: 0.5,
        ..EngineConfig::default()
    };
    let scheduler = build_scheduler(&cfg).unwrap();
    let frames = build_frame_loop(&scheduler, &cfg);
    assert!((frames.clock().delta_time() - 0.5).abs() < f64::EPSILON);
    scheduler.terminate().unwrap();
}
