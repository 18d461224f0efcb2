//! Worker threads and pool statistics.
//!
//! Each worker is a dedicated OS thread running the shared scheduling loop:
//! take the next ready task (own affine queue, own deques, global injectors,
//! then steal, HIGH before LOW, then detached service loops), run it, and park on the live-counter
//! condition variable when nothing is ready.
//!
//! # Design Principles
//!
//! - **No busy waiting**: idle workers park on a `Condvar`; submissions wake one
//! - **Clean shutdown**: workers exit once shutdown was requested and the live
//!   counter drained to zero, then `terminate` joins them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::SchedulerError;
use super::lifecycle::Wake;
use super::participant;
use super::queue::LocalQueues;
use super::scheduler::{Reach, Shared};

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Number of dedicated worker threads.
    pub worker_count: usize,
    /// Tasks accepted by `add_task`.
    pub submitted_tasks: u64,
    /// Tasks that ran to completion.
    pub completed_tasks: u64,
    /// Tasks taken from another participant's deque.
    pub stolen_tasks: u64,
    /// Context-affine tasks executed.
    pub affine_tasks: u64,
    /// Current live-fiber count (includes the initializing context until terminate).
    pub live: usize,
}

/// Internal counters for scheduler statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub stolen_tasks: AtomicU64,
    pub affine_tasks: AtomicU64,
}

impl SchedulerCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, live: usize) -> SchedulerStats {
        SchedulerStats {
            worker_count,
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            stolen_tasks: self.stolen_tasks.load(Ordering::Relaxed),
            affine_tasks: self.affine_tasks.load(Ordering::Relaxed),
            live,
        }
    }
}

/// A spawned worker: its thread and the index of its stealable deques.
#[derive(Debug)]
pub(crate) struct WorkerRecord {
    worker_id: usize,
    participant: usize,
    handle: JoinHandle<()>,
}

impl WorkerRecord {
    pub(crate) fn join(self) {
        let Self {
            worker_id,
            participant,
            handle,
        } = self;
        if handle.join().is_ok() {
            debug!(worker_id, participant, "Worker joined successfully");
        } else {
            warn!(worker_id, participant, "Worker panicked");
        }
    }
}

/// Spawn a worker thread whose deques were already registered as `participant`.
pub(crate) fn spawn_worker(
    worker_id: usize,
    participant: usize,
    local: LocalQueues,
    shared: Arc<Shared>,
) -> Result<WorkerRecord, SchedulerError> {
    let name = format!("{}-{worker_id}", shared.config.thread_name_prefix);
    let stack_size = shared.config.thread_stack_size;
    let handle = thread::Builder::new()
        .name(name)
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, participant, "Worker thread started");
            participant::install_worker(&shared, participant, local);
            worker_loop(&shared);
            participant::remove(&shared);
            debug!(worker_id, "Worker thread exiting");
        })
        .map_err(|e| SchedulerError::WorkerSpawn(e.to_string()))?;

    Ok(WorkerRecord {
        worker_id,
        participant,
        handle,
    })
}

fn worker_loop(shared: &Shared) {
    let timeout = shared.config.park_timeout();
    loop {
        if let Some(task) = shared
            .next_task(Reach::Any)
            .or_else(|| shared.queues.pop_service())
        {
            shared.run_task(task);
            continue;
        }
        if shared.live.park(|| shared.queues.has_work(), timeout) == Wake::Exit {
            break;
        }
    }
}
