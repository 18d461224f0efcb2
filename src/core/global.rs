//! Process-wide scheduler facade.
//!
//! Free functions over one installed [`Scheduler`], for engine code that
//! addresses the scheduler as a service rather than threading a handle
//! through every call. Misuse (double init, use before init) is fatal.

use parking_lot::RwLock;
use tracing::warn;

use super::error::SchedulerError;
use super::scheduler::Scheduler;
use super::task::{LaunchPolicy, Priority};
use crate::config::SchedulerConfig;
use crate::util::fail_fast;

static GLOBAL: RwLock<Option<Scheduler>> = RwLock::new(None);

/// Clone of the installed handle. The lock is released before returning.
fn current() -> Result<Scheduler, SchedulerError> {
    GLOBAL.read().clone().ok_or(SchedulerError::NotInitialized)
}

/// Install a scheduler built from `config`.
pub fn try_init_with(config: SchedulerConfig) -> Result<(), SchedulerError> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(SchedulerError::AlreadyInitialized);
    }
    *slot = Some(Scheduler::new(config)?);
    Ok(())
}

/// Install a scheduler built from `config`; fatal on failure.
pub fn init_with(config: SchedulerConfig) {
    fail_fast("init", try_init_with(config));
}

/// Install a scheduler with the default configuration; fatal on failure.
pub fn init() {
    init_with(SchedulerConfig::default());
}

/// Whether a scheduler is installed.
#[must_use]
pub fn is_initialized() -> bool {
    GLOBAL.read().is_some()
}

/// Handle to the installed scheduler.
pub fn handle() -> Result<Scheduler, SchedulerError> {
    current()
}

/// Drain and stop the installed scheduler, then uninstall it.
pub fn try_terminate() -> Result<(), SchedulerError> {
    let scheduler = current()?;
    scheduler.terminate()?;
    GLOBAL.write().take();
    Ok(())
}

/// Drain and stop the installed scheduler; fatal on failure.
pub fn terminate() {
    fail_fast("terminate", try_terminate());
}

/// Submit work to the installed scheduler.
pub fn add_task<F>(priority: Priority, launch: LaunchPolicy, context_affine: bool, work: F)
where
    F: FnOnce() + Send + 'static,
{
    fail_fast("add_task", current()).add_task(priority, launch, context_affine, work);
}

/// Wait for the calling context's outstanding wave.
pub fn block() {
    fail_fast("block", current()).block();
}

/// Yield the calling context once.
pub fn defer() {
    match current() {
        Ok(scheduler) => scheduler.defer(),
        Err(e) => {
            warn!(error = %e, "defer without a scheduler");
            std::thread::yield_now();
        }
    }
}

/// `true` while a scheduler is installed and not shutting down.
#[must_use]
pub fn running() -> bool {
    current().is_ok_and(|scheduler| scheduler.running())
}
