//! Task model: priority classes, launch policies and the boxed unit of work.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::wave::Wave;

/// Unique identifier assigned to every submitted task.
pub type TaskId = u64;

/// Priority class of a task.
///
/// HIGH tasks are preferred over LOW tasks at dequeue time. A running task is
/// never preempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work (log draining, housekeeping).
    Low,
    /// Frame-critical work.
    #[default]
    High,
}

impl Priority {
    /// Bucket visit order used by every dequeue path.
    pub const DEQUEUE_ORDER: [Self; 2] = [Self::High, Self::Low];

    /// Index of this priority's queue bucket.
    pub(crate) const fn bucket(self) -> usize {
        match self {
            Self::High => 0,
            Self::Low => 1,
        }
    }
}

/// How a submitted task is started relative to its submitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPolicy {
    /// The submitter yields until the new task has started.
    #[default]
    Immediate,
    /// The task is queued and started by normal scheduling.
    Continue,
}

/// Scheduling options attached to a task at submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Priority class.
    pub priority: Priority,
    /// Launch policy.
    pub launch: LaunchPolicy,
    /// Must run on the thread that holds the native context.
    pub context_affine: bool,
}

impl TaskOptions {
    /// Options for a free-floating task.
    #[must_use]
    pub const fn new(priority: Priority, launch: LaunchPolicy) -> Self {
        Self {
            priority,
            launch,
            context_affine: false,
        }
    }

    /// Mark the task as bound to the submitting thread's native context.
    #[must_use]
    pub const fn affine(mut self) -> Self {
        self.context_affine = true;
        self
    }
}

/// Boxed unit of work.
pub(crate) type Work = Box<dyn FnOnce() + Send + 'static>;

/// A submitted unit of work. Immutable once queued.
pub(crate) struct Task {
    pub id: TaskId,
    pub options: TaskOptions,
    work: Work,
    wave: Arc<Wave>,
    started: Option<Arc<AtomicBool>>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        options: TaskOptions,
        work: Work,
        wave: Arc<Wave>,
        started: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            id,
            options,
            work,
            wave,
            started,
        }
    }

    /// Mark the task as claimed by an executor and hand out its parts.
    pub(crate) fn claim(self) -> (Work, Arc<Wave>) {
        self.wave.claim();
        if let Some(flag) = &self.started {
            flag.store(true, Ordering::Release);
        }
        (self.work, self.wave)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
