//! Engine services built on the scheduler: background log pump and
//! fixed-timestep frame loop.

pub mod frame_loop;
pub mod log_pump;

pub use frame_loop::{FrameClock, FrameContext, FrameLoop, FramePhase, FrameReport};
pub use log_pump::{LogPump, LogWriter};
