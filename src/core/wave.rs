//! Per-wave bookkeeping for the fork-join barrier.
//!
//! A wave is the set of tasks one logical call site submits between two
//! `block` calls. Every executing task (and every participant thread outside
//! a task) owns exactly one open wave, so `block` only waits for the tasks its
//! caller submitted and never for unrelated concurrent waves.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::error::SchedulerError;

/// Outstanding-task counter for one wave.
#[derive(Debug, Default)]
pub(crate) struct Wave {
    /// Submitted but not yet finished.
    pending: Mutex<usize>,
    /// Submitted but not yet picked up by any executor.
    unclaimed: AtomicUsize,
    drained: Condvar,
}

impl Wave {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Account for a newly submitted task.
    pub(crate) fn enter(&self) {
        *self.pending.lock() += 1;
        self.unclaimed.fetch_add(1, Ordering::AcqRel);
    }

    /// A task of this wave was dequeued by some executor.
    pub(crate) fn claim(&self) {
        self.unclaimed.fetch_sub(1, Ordering::AcqRel);
    }

    /// A task of this wave finished. Wakes the blocked submitter on the last one.
    pub(crate) fn leave(&self) -> Result<(), SchedulerError> {
        let mut pending = self.pending.lock();
        *pending = pending
            .checked_sub(1)
            .ok_or(SchedulerError::CounterUnderflow)?;
        if *pending == 0 {
            self.drained.notify_all();
        }
        Ok(())
    }

    pub(crate) fn pending(&self) -> usize {
        *self.pending.lock()
    }

    pub(crate) fn unclaimed(&self) -> usize {
        self.unclaimed.load(Ordering::Acquire)
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.pending() == 0
    }

    /// Wait until the wave drains or `timeout` passes. Returns `true` if drained.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if *pending == 0 {
            return true;
        }
        let _ = self.drained.wait_for(&mut pending, timeout);
        *pending == 0
    }
}
