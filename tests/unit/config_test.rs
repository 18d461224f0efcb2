//! Tests for configuration validation

use soul_scheduler::config::{EngineConfig, InteropConfig, SchedulerConfig};
use soul_scheduler::core::{RasterApi, RegisterFlags};

#[test]
fn test_scheduler_config_validation() {
    let valid = SchedulerConfig::default().with_worker_count(4);
    assert!(valid.validate().is_ok());
    assert_eq!(valid.resolved_worker_count(), 4);
}

#[test]
fn test_scheduler_config_zero_workers_is_valid() {
    let cfg = SchedulerConfig::default().with_worker_count(0);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.resolved_worker_count(), 0);
}

#[test]
fn test_scheduler_config_invalid_prefix() {
    let invalid = SchedulerConfig::default().with_thread_name_prefix("");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_park_timeout() {
    let invalid = SchedulerConfig::default().with_park_timeout_ms(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "worker_count": 3,
        "thread_stack_size": 1048576,
        "thread_name_prefix": "sim",
        "park_timeout_ms": 5
    }"#;
    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.worker_count, Some(3));
    assert_eq!(cfg.thread_stack_size, 1_048_576);
    assert_eq!(cfg.thread_name_prefix, "sim");
    assert_eq!(cfg.park_timeout().as_millis(), 5);
}

#[test]
fn test_scheduler_config_from_json_invalid() {
    assert!(SchedulerConfig::from_json_str("{not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{"thread_stack_size": 10}"#).is_err());
}

#[test]
fn test_interop_config_defaults() {
    let cfg = InteropConfig::default();
    assert_eq!(cfg.raster_api, RasterApi::OpenGl);
    assert_eq!(cfg.register_flags, RegisterFlags::WriteDiscard);
}

#[test]
fn test_engine_config_round_trip_defaults() {
    let cfg = EngineConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, EngineConfig::default());
    assert!((cfg.alloted_render_time_secs - 0.01).abs() < f64::EPSILON);
}
