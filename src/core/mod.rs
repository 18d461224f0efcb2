//! Core scheduling abstractions: tasks, queues, workers, barriers and the
//! interop resources built on them.

pub mod error;
pub mod global;
pub mod interop;
pub mod scheduler;
pub mod task;
pub mod worker_pool;

pub(crate) mod lifecycle;
pub(crate) mod participant;
pub(crate) mod queue;
pub(crate) mod wave;

pub use error::{AppResult, InteropError, SchedulerError};
pub use interop::{
    BufferId, ComputeDevice, ComputeInterop, DeviceBuffer, DevicePtr, DeviceSelector,
    InteropHandle, InteropRasterBuffer, InteropState, MappedRange, RasterApi, RasterBackend,
    RasterBuffer, RasterInterop, RegisterFlags,
};
pub use scheduler::Scheduler;
pub use task::{LaunchPolicy, Priority, TaskId, TaskOptions};
pub use worker_pool::SchedulerStats;
