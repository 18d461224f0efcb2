//! Configuration models for the scheduler, interop resources and frame timing.

pub mod engine;
pub mod scheduler;

pub use engine::{EngineConfig, InteropConfig};
pub use scheduler::{SchedulerConfig, ENV_THREAD_STACK_SIZE, ENV_WORKER_COUNT};
