//! Thread-local participant state.
//!
//! Every thread that submits or runs tasks for a scheduler is a participant:
//! worker threads are installed at spawn, any other thread (the initializing
//! thread included) is registered on first use. A participant owns its LIFO
//! deques, its context-affine queue and its wave stack. The affine queue is
//! plain thread-local storage: nothing outside the owning thread can reach
//! it, so affine tasks can never migrate to another thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use tracing::debug;

use super::queue::{LocalQueues, StealerRegistry};
use super::scheduler::Shared;
use super::task::{Priority, Task};
use super::wave::Wave;

struct Participant {
    scheduler: u64,
    /// Also serves as the liveness token of the owning scheduler.
    registry: Weak<StealerRegistry>,
    index: usize,
    worker: bool,
    local: LocalQueues,
    affine: VecDeque<Task>,
    /// Wave of submissions made outside any task.
    root: Arc<Wave>,
    /// One wave per task currently executing on this thread, innermost last.
    nested: Vec<Arc<Wave>>,
}

impl Participant {
    fn new(shared: &Shared, index: usize, local: LocalQueues, worker: bool) -> Self {
        Self {
            scheduler: shared.id,
            registry: Arc::downgrade(shared.queues.registry()),
            index,
            worker,
            local,
            affine: VecDeque::new(),
            root: Wave::new(),
            nested: Vec::new(),
        }
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        // Deques still holding work stay stealable until the scheduler goes.
        if !self.local.is_empty() {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.index);
            debug!(scheduler = self.scheduler, participant = self.index, "Participant left");
        }
    }
}

thread_local! {
    static PARTICIPANTS: RefCell<Vec<Participant>> = const { RefCell::new(Vec::new()) };
}

fn with<R>(shared: &Shared, f: impl FnOnce(&mut Participant) -> R) -> R {
    PARTICIPANTS.with(|cell| {
        let mut list = cell.borrow_mut();
        let pos = if let Some(pos) = list.iter().position(|p| p.scheduler == shared.id) {
            pos
        } else {
            list.retain(|p| p.registry.strong_count() > 0);
            let local = LocalQueues::new();
            let index = shared.queues.register(&local);
            debug!(scheduler = shared.id, participant = index, "Participant registered");
            list.push(Participant::new(shared, index, local, false));
            list.len() - 1
        };
        f(&mut list[pos])
    })
}

/// Install a worker's pre-registered deques on the current thread.
pub(crate) fn install_worker(shared: &Shared, index: usize, local: LocalQueues) {
    PARTICIPANTS.with(|cell| {
        cell.borrow_mut()
            .push(Participant::new(shared, index, local, true));
    });
}

/// Forget this thread's participant state for `shared`.
pub(crate) fn remove(shared: &Shared) {
    PARTICIPANTS.with(|cell| cell.borrow_mut().retain(|p| p.scheduler != shared.id));
}

pub(crate) fn index(shared: &Shared) -> usize {
    with(shared, |p| p.index)
}

pub(crate) fn is_worker(shared: &Shared) -> bool {
    with(shared, |p| p.worker)
}

/// Whether this thread is currently executing a task of `shared`.
pub(crate) fn in_task(shared: &Shared) -> bool {
    with(shared, |p| !p.nested.is_empty())
}

pub(crate) fn push_local(shared: &Shared, task: Task) {
    with(shared, |p| p.local.push(task));
}

pub(crate) fn pop_local(shared: &Shared, priority: Priority) -> Option<Task> {
    with(shared, |p| p.local.pop(priority))
}

pub(crate) fn push_affine(shared: &Shared, task: Task) {
    with(shared, |p| p.affine.push_back(task));
}

/// Oldest HIGH affine task, else the oldest LOW one.
pub(crate) fn pop_affine(shared: &Shared) -> Option<Task> {
    with(shared, |p| {
        let pos = p
            .affine
            .iter()
            .position(|t| t.options.priority == Priority::High)
            .unwrap_or(0);
        p.affine.remove(pos)
    })
}

pub(crate) fn affine_len(shared: &Shared) -> usize {
    with(shared, |p| p.affine.len())
}

/// The wave new submissions from this thread belong to.
pub(crate) fn current_wave(shared: &Shared) -> Arc<Wave> {
    with(shared, |p| Arc::clone(p.nested.last().unwrap_or(&p.root)))
}

/// Open a fresh wave for a task about to execute on this thread.
pub(crate) fn enter_task(shared: &Shared) {
    with(shared, |p| p.nested.push(Wave::new()));
}

pub(crate) fn exit_task(shared: &Shared) {
    with(shared, |p| {
        p.nested.pop();
    });
}
