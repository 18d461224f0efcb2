//! Tests for runtime utilities

use soul_scheduler::runtime::frame_loop::MAX_FRAME_TIME_SECS;
use soul_scheduler::runtime::{FrameClock, FramePhase};

#[test]
fn test_frame_clock_accumulates() {
    let mut clock = FrameClock::new(0.25);
    assert_eq!(clock.advance(0.125), 0);
    assert_eq!(clock.advance(0.125), 1);
    assert!((clock.time() - 0.25).abs() < f64::EPSILON);
    assert!(clock.alpha().abs() < f64::EPSILON);
}

#[test]
fn test_frame_clock_clamp_constant() {
    assert!((MAX_FRAME_TIME_SECS - 0.25).abs() < f64::EPSILON);
    let mut clock = FrameClock::new(0.0625);
    assert_eq!(clock.advance(5.0), 4);
}

#[test]
fn test_frame_phase_order() {
    assert_eq!(FramePhase::ALL.first(), Some(&FramePhase::EarlyFrame));
    assert_eq!(FramePhase::ALL.last(), Some(&FramePhase::Render));
}
