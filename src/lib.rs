//! # Soul Scheduler
//!
//! A hybrid cooperative/preemptive task scheduler for a real-time rendering
//! and compute engine, together with the GPU interop resources that depend on
//! it for context-affine execution.
//!
//! ## Core Problem Solved
//!
//! Engine work is fine-grained and unevenly shaped:
//!
//! - **Frame-critical work** must be preferred over background work
//! - **Rendering contexts are thread-bound**: some calls may only run on the
//!   thread that owns the native context
//! - **Callers need post-conditions**: a frame that maps a buffer must see the
//!   mapped pointer before it continues
//!
//! ## Key Features
//!
//! - **Worker pool**: hardware concurrency minus one OS threads, plus the
//!   initializing thread as a participant
//! - **Work stealing**: per-thread LIFO deques and global injectors, bucketed
//!   by priority (HIGH before LOW)
//! - **Launch policies**: IMMEDIATE tasks have started before `add_task`
//!   returns; CONTINUE tasks are queued for normal scheduling
//! - **Fork-join barrier**: `block` waits only for the caller's own wave
//! - **Context affinity**: affine tasks never leave their submitting thread
//! - **Interop resources**: raster buffers registered and mapped for compute
//!   access through context-affine tasks
//!
//! ## Scheduler
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use soul_scheduler::config::SchedulerConfig;
//! use soul_scheduler::core::{LaunchPolicy, Priority, Scheduler};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let results = Arc::new(Mutex::new(Vec::new()));
//! for i in 0..3 {
//!     let results = Arc::clone(&results);
//!     scheduler.add_task(Priority::High, LaunchPolicy::Immediate, false, move || {
//!         results.lock().push(i);
//!     });
//! }
//! scheduler.block();
//! assert_eq!(results.lock().len(), 3);
//! scheduler.terminate()?;
//! # Ok::<(), soul_scheduler::core::SchedulerError>(())
//! ```
//!
//! ## Interop Resources
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use soul_scheduler::config::SchedulerConfig;
//! use soul_scheduler::core::{DeviceBuffer, InteropRasterBuffer, RasterInterop, RegisterFlags, Scheduler};
//! use soul_scheduler::infra::{HeadlessRaster, HostInterop};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let compute = Arc::new(HostInterop::new());
//! let mut buffer = InteropRasterBuffer::<f32, _, _>::on_best_device(
//!     scheduler.clone(),
//!     Arc::new(HeadlessRaster::new()),
//!     Arc::clone(&compute),
//!     compute.as_ref(),
//!     RegisterFlags::WriteDiscard,
//! )?;
//! buffer.resize(1024);
//! buffer.map_resources();
//! assert!(buffer.data().is_some());
//! buffer.unmap_resources();
//! drop(buffer);
//! scheduler.terminate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! For complete scenarios, see:
//! - `tests/scheduler_test.rs` - Scheduling, barrier and shutdown properties
//! - `tests/interop_test.rs` - Interop resource lifecycle

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: tasks, queues, workers, barriers and interop.
pub mod core;
/// Configuration models for the scheduler, interop and frame timing.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// In-process raster and compute backends.
pub mod infra;
/// Engine services built on the scheduler.
pub mod runtime;
/// Shared utilities.
pub mod util;
