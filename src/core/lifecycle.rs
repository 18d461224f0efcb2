//! Live-fiber accounting and shutdown coordination.
//!
//! The live counter and the running flag sit behind one mutex. The paired
//! condition variable parks idle workers: it is signalled when new work is
//! queued and broadcast when shutdown was requested and the counter drains
//! to zero.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::error::SchedulerError;

#[derive(Debug)]
struct LiveState {
    live: usize,
    running: bool,
}

/// What a parked worker should do after waking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// Look for work again.
    Rescan,
    /// Shutdown requested and every task finished.
    Exit,
}

/// Process-wide live-fiber counter with its guarding lock.
#[derive(Debug)]
pub(crate) struct LiveCounter {
    state: Mutex<LiveState>,
    wake: Condvar,
}

impl LiveCounter {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LiveState {
                live: 0,
                running: true,
            }),
            wake: Condvar::new(),
        }
    }

    pub(crate) fn increment(&self) {
        self.state.lock().live += 1;
    }

    /// Decrement the counter, returning the new value.
    pub(crate) fn decrement(&self) -> Result<usize, SchedulerError> {
        let mut state = self.state.lock();
        state.live = state
            .live
            .checked_sub(1)
            .ok_or(SchedulerError::CounterUnderflow)?;
        let live = state.live;
        if live == 0 && !state.running {
            drop(state);
            self.wake.notify_all();
        }
        Ok(live)
    }

    /// Clear the running flag and release the initializing context's count.
    pub(crate) fn begin_shutdown(&self) -> Result<usize, SchedulerError> {
        self.state.lock().running = false;
        self.decrement()
    }

    pub(crate) fn live(&self) -> usize {
        self.state.lock().live
    }

    pub(crate) fn running(&self) -> bool {
        self.state.lock().running
    }

    /// Wake one parked worker. Taking the lock orders the notification after
    /// any queue check a worker performs while deciding to park.
    pub(crate) fn notify_work(&self) {
        let _state = self.state.lock();
        self.wake.notify_one();
    }

    /// Park the calling worker until work may be available or shutdown drained.
    pub(crate) fn park(&self, has_work: impl Fn() -> bool, timeout: Duration) -> Wake {
        let mut state = self.state.lock();
        if !state.running && state.live == 0 {
            return Wake::Exit;
        }
        if has_work() {
            return Wake::Rescan;
        }
        let _ = self.wake.wait_for(&mut state, timeout);
        if !state.running && state.live == 0 {
            Wake::Exit
        } else {
            Wake::Rescan
        }
    }

    /// Wait until the counter reaches zero or `timeout` passes.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.live == 0 {
            return true;
        }
        let _ = self.wake.wait_for(&mut state, timeout);
        state.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_drains_to_zero() {
        let counter = LiveCounter::new();
        counter.increment();
        counter.increment();
        assert_eq!(counter.begin_shutdown().unwrap(), 1);
        assert!(!counter.running());
        assert_eq!(counter.decrement().unwrap(), 0);
        assert_eq!(counter.park(|| true, Duration::from_millis(1)), Wake::Exit);
    }

    #[test]
    fn test_underflow() {
        let counter = LiveCounter::new();
        assert!(matches!(
            counter.decrement(),
            Err(SchedulerError::CounterUnderflow)
        ));
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_park_rescans_while_running() {
        let counter = LiveCounter::new();
        assert_eq!(counter.park(|| true, Duration::from_millis(1)), Wake::Rescan);
        assert_eq!(counter.park(|| false, Duration::from_millis(1)), Wake::Rescan);
    }
}
