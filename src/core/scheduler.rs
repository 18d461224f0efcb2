//! Hybrid cooperative/preemptive task scheduler.
//!
//! A fixed pool of worker threads (one fewer than the hardware concurrency by
//! default) executes tasks. The initializing thread is a participant too: it
//! runs work whenever it waits in [`Scheduler::block`] or yields through
//! [`Scheduler::defer`], and it is the only thread that ever runs the
//! context-affine tasks it submitted.
//!
//! # Architecture
//!
//! ```text
//! add_task ──► affine? ──yes──► submitter's affine queue (never stolen)
//!                 │
//!                 no ──► IMMEDIATE ──► submitter's LIFO deque ──► yield until started
//!                 │
//!                 └────► CONTINUE ───► global injector (per priority)
//!
//! worker / block / defer: affine → local HIGH → global HIGH → steal HIGH
//!                                → local LOW  → global LOW  → steal LOW
//! ```
//!
//! # Lifecycle
//!
//! `new` starts the workers and counts the initializing context as one live
//! fiber. Every accepted task adds one more and removes it when it finishes.
//! `terminate` clears the running flag, drops the initializing context's
//! count, helps until the counter reaches zero and joins the workers.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::error::SchedulerError;
use super::lifecycle::LiveCounter;
use super::participant;
use super::queue::{LocalQueues, SharedQueues};
use super::task::{LaunchPolicy, Priority, Task, TaskOptions, Work};
use super::wave::Wave;
use super::worker_pool::{spawn_worker, SchedulerCounters, SchedulerStats, WorkerRecord};
use crate::config::SchedulerConfig;
use crate::util::{fail_fast, fatal};

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// Which queues a dequeue may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reach {
    /// Only queues the calling thread owns (affine queue, own deques).
    Owned,
    /// Owned queues, then the global injectors, then other participants' deques.
    Any,
}

/// State shared by the handle, every worker and every participant thread.
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) config: SchedulerConfig,
    pub(crate) live: LiveCounter,
    pub(crate) queues: SharedQueues,
    counters: SchedulerCounters,
    worker_count: usize,
    workers: Mutex<Vec<WorkerRecord>>,
    next_task_id: AtomicU64,
    shutdown_requested: AtomicBool,
    terminated: AtomicBool,
}

impl Shared {
    /// Next ready task for the calling thread, HIGH before LOW.
    pub(crate) fn next_task(&self, reach: Reach) -> Option<Task> {
        if let Some(task) = participant::pop_affine(self) {
            return Some(task);
        }
        let me = participant::index(self);
        for priority in Priority::DEQUEUE_ORDER {
            if let Some(task) = participant::pop_local(self, priority) {
                return Some(task);
            }
            if reach == Reach::Owned {
                continue;
            }
            if let Some(task) = self.queues.pop_global(priority) {
                return Some(task);
            }
            if let Some(task) = self.queues.steal(priority, Some(me)) {
                self.counters.stolen_tasks.fetch_add(1, Ordering::Relaxed);
                return Some(task);
            }
        }
        None
    }

    /// Execute one task to completion and release its accounting.
    pub(crate) fn run_task(&self, task: Task) {
        let task_id = task.id;
        let affine = task.options.context_affine;
        let (work, wave) = task.claim();
        trace!(task_id, affine, "Running task");

        participant::enter_task(self);
        let outcome = panic::catch_unwind(AssertUnwindSafe(work));
        participant::exit_task(self);
        if let Err(payload) = outcome {
            fatal(
                "task execution",
                SchedulerError::TaskPanicked(panic_message(payload.as_ref())),
            );
        }

        self.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
        if affine {
            self.counters.affine_tasks.fetch_add(1, Ordering::Relaxed);
        }
        fail_fast("live fiber counter", self.live.decrement());
        // Last, so a returning `block` observes the counters above.
        fail_fast("wave barrier", wave.leave());
    }

    fn enqueue(
        &self,
        options: TaskOptions,
        work: Work,
        wave: Arc<Wave>,
        service: bool,
    ) -> Result<(), SchedulerError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(SchedulerError::NotRunning);
        }

        wave.enter();
        self.live.increment();
        self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let started = (options.launch == LaunchPolicy::Immediate)
            .then(|| Arc::new(AtomicBool::new(false)));
        let task = Task::new(task_id, options, work, wave, started.clone());
        trace!(
            task_id,
            priority = ?options.priority,
            launch = ?options.launch,
            affine = options.context_affine,
            service,
            "Task submitted"
        );

        if service {
            self.queues.push_service(task);
            self.live.notify_work();
        } else if options.context_affine {
            participant::push_affine(self, task);
        } else if options.launch == LaunchPolicy::Immediate {
            participant::push_local(self, task);
            self.live.notify_work();
        } else {
            self.queues.push_global(task);
            self.live.notify_work();
        }

        if let Some(started) = started {
            self.yield_until_started(&started);
        }
        Ok(())
    }

    /// Suspend the submitter until its IMMEDIATE task has been picked up.
    ///
    /// Runs the caller's own queues meanwhile, so the task usually starts
    /// right here on the submitting thread.
    fn yield_until_started(&self, started: &AtomicBool) {
        while !started.load(Ordering::Acquire) {
            match self.next_task(Reach::Owned) {
                Some(task) => self.run_task(task),
                None => thread::yield_now(),
            }
        }
    }

    fn block(&self) {
        let wave = participant::current_wave(self);
        let timeout = self.config.park_timeout();
        while !wave.is_drained() {
            // Outside work is only taken while this wave still has tasks
            // nobody has picked up; otherwise a long task could delay return.
            let reach = if wave.unclaimed() > 0 || self.worker_count == 0 {
                Reach::Any
            } else {
                Reach::Owned
            };
            if let Some(task) = self.next_task(reach) {
                self.run_task(task);
                continue;
            }
            wave.wait_for(timeout);
        }
    }

    fn defer(&self) {
        match self.next_task(Reach::Any) {
            Some(task) => self.run_task(task),
            None => thread::yield_now(),
        }
    }

    fn request_shutdown(&self) -> Result<bool, SchedulerError> {
        if self.shutdown_requested.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let remaining = self.live.begin_shutdown()?;
        debug!(
            scheduler = self.id,
            remaining,
            queued = self.queues.global_len(),
            "Shutdown requested"
        );
        Ok(true)
    }

    fn terminate(&self) -> Result<(), SchedulerError> {
        if participant::is_worker(self) || participant::in_task(self) {
            return Err(SchedulerError::TerminateFromTask);
        }
        if !self.request_shutdown()? {
            debug!(scheduler = self.id, "Terminate called again, ignoring");
            return Ok(());
        }
        info!(scheduler = self.id, "Terminating scheduler");

        let timeout = self.config.park_timeout();
        while self.live.live() != 0 {
            match self.next_task(Reach::Any) {
                Some(task) => self.run_task(task),
                None => {
                    self.live.wait_drained(timeout);
                }
            }
        }

        let workers: Vec<WorkerRecord> = self.workers.lock().drain(..).collect();
        for worker in workers {
            worker.join();
        }
        self.terminated.store(true, Ordering::Release);
        participant::remove(self);

        let stats = self.stats();
        info!(
            scheduler = self.id,
            completed = stats.completed_tasks,
            stolen = stats.stolen_tasks,
            "Scheduler terminated"
        );
        Ok(())
    }

    fn stats(&self) -> SchedulerStats {
        self.counters.snapshot(self.worker_count, self.live.live())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Owner of the shared state. Dropping the last handle without `terminate`
/// signals shutdown; workers exit on their own once drained.
struct Inner {
    shared: Arc<Shared>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.shared.terminated.load(Ordering::Acquire) {
            return;
        }
        match self.shared.request_shutdown() {
            Ok(true) => debug!(
                scheduler = self.shared.id,
                "Scheduler dropped without terminate, workers exit once drained"
            ),
            Ok(false) => {}
            Err(e) => warn!(scheduler = self.shared.id, error = %e, "Shutdown on drop failed"),
        }
    }
}

/// Handle to a running scheduler. Cheap to clone; all clones drive the same pool.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Start the worker pool and register the calling thread as the
    /// initializing context.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let worker_count = config.resolved_worker_count();

        let shared = Arc::new(Shared {
            id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            live: LiveCounter::new(),
            queues: SharedQueues::new(),
            counters: SchedulerCounters::default(),
            worker_count,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            next_task_id: AtomicU64::new(1),
            shutdown_requested: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        });
        // The initializing context counts as one live fiber until terminate.
        shared.live.increment();
        let inner = Arc::new(Inner {
            shared: Arc::clone(&shared),
        });

        // Register the initializing thread before any worker exists.
        participant::index(&shared);

        for worker_id in 0..worker_count {
            let local = LocalQueues::new();
            let index = shared.queues.register(&local);
            match spawn_worker(worker_id, index, local, Arc::clone(&shared)) {
                Ok(record) => shared.workers.lock().push(record),
                Err(e) => {
                    // Dropping `inner` releases the workers already started.
                    drop(inner);
                    return Err(e);
                }
            }
        }

        info!(
            scheduler = shared.id,
            worker_count,
            stack_size = shared.config.thread_stack_size,
            "Scheduler started"
        );
        Ok(Self { inner })
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    /// Submit a unit of work.
    ///
    /// With [`LaunchPolicy::Immediate`] the caller yields until the task has
    /// started. A context-affine task only ever runs on the calling thread.
    /// Rejected submissions (after `terminate`) are logged and dropped.
    pub fn add_task<F>(&self, priority: Priority, launch: LaunchPolicy, context_affine: bool, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = self.try_add_task(priority, launch, context_affine, work) {
            warn!(error = %e, "Task rejected");
        }
    }

    /// Submit a unit of work, reporting rejection to the caller.
    pub fn try_add_task<F>(
        &self,
        priority: Priority,
        launch: LaunchPolicy,
        context_affine: bool,
        work: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut options = TaskOptions::new(priority, launch);
        options.context_affine = context_affine;
        self.submit(options, work)
    }

    /// Submit a unit of work described by `options`.
    pub fn submit<F>(&self, options: TaskOptions, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = self.shared();
        let wave = participant::current_wave(shared);
        shared.enqueue(options, Box::new(work), wave, false)
    }

    /// Queue a long-lived service loop on a worker thread.
    ///
    /// The task belongs to no `block` wave; only shutdown waits for it. It is
    /// never picked up by a thread helping in `block`, `defer` or
    /// `terminate`, so it should poll [`Scheduler::running`] and call
    /// [`Scheduler::defer`] between polls. Fails when the pool has no workers.
    pub fn spawn_detached<F>(&self, priority: Priority, work: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = self.shared();
        if shared.worker_count == 0 {
            return Err(SchedulerError::NoWorkers);
        }
        shared.enqueue(
            TaskOptions::new(priority, LaunchPolicy::Continue),
            Box::new(work),
            Wave::new(),
            true,
        )
    }

    /// Park until queued work is visible or `timeout` passes. Returns
    /// whether work is ready. Submissions wake the caller like an idle worker.
    pub(crate) fn wait_for_work(&self, timeout: Duration) -> bool {
        let shared = self.shared();
        if shared.queues.has_work() {
            return true;
        }
        shared.live.park(|| shared.queues.has_work(), timeout);
        shared.queues.has_work()
    }

    /// Wait until every task the calling context submitted since its last
    /// `block` has finished, running ready work meanwhile.
    pub fn block(&self) {
        self.shared().block();
    }

    /// Yield the current execution context once so other ready work can run.
    pub fn defer(&self) {
        self.shared().defer();
    }

    /// `true` from construction until `terminate` has been requested.
    #[must_use]
    pub fn running(&self) -> bool {
        self.shared().live.running()
    }

    /// Stop the scheduler: wait for every outstanding task, then join the
    /// workers. A second call is a no-op.
    pub fn terminate(&self) -> Result<(), SchedulerError> {
        self.shared().terminate()
    }

    /// Number of dedicated worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared().worker_count
    }

    /// Current value of the live-fiber counter.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.shared().live.live()
    }

    /// Context-affine tasks queued on the calling thread and not yet run.
    #[must_use]
    pub fn pending_affine(&self) -> usize {
        participant::affine_len(self.shared())
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.shared().stats()
    }

    /// The configuration this scheduler was started with.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared().config
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared();
        f.debug_struct("Scheduler")
            .field("id", &shared.id)
            .field("worker_count", &shared.worker_count)
            .field("running", &shared.live.running())
            .field("live", &shared.live.live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config(workers: usize) -> SchedulerConfig {
        SchedulerConfig::default().with_worker_count(workers)
    }

    #[test]
    fn test_start_and_terminate() {
        let scheduler = Scheduler::new(config(2)).unwrap();
        assert!(scheduler.running());
        assert_eq!(scheduler.worker_count(), 2);
        assert_eq!(scheduler.live_count(), 1);
        scheduler.terminate().unwrap();
        assert!(!scheduler.running());
        assert_eq!(scheduler.live_count(), 0);
    }

    #[test]
    fn test_terminate_twice_is_noop() {
        let scheduler = Scheduler::new(config(1)).unwrap();
        scheduler.terminate().unwrap();
        scheduler.terminate().unwrap();
        assert_eq!(scheduler.live_count(), 0);
    }

    #[test]
    fn test_add_task_after_terminate_is_rejected() {
        let scheduler = Scheduler::new(config(1)).unwrap();
        scheduler.terminate().unwrap();
        let result = scheduler.try_add_task(Priority::High, LaunchPolicy::Continue, false, || {});
        assert!(matches!(result, Err(SchedulerError::NotRunning)));
        assert_eq!(scheduler.live_count(), 0);
    }

    #[test]
    fn test_block_without_tasks_returns() {
        let scheduler = Scheduler::new(config(1)).unwrap();
        scheduler.block();
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_zero_workers_runs_on_caller() {
        let scheduler = Scheduler::new(config(0)).unwrap();
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&ran_on);
        scheduler.add_task(Priority::Low, LaunchPolicy::Continue, false, move || {
            *slot.lock() = Some(thread::current().id());
        });
        scheduler.block();
        assert_eq!(*ran_on.lock(), Some(caller));
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_immediate_has_started_on_return() {
        let scheduler = Scheduler::new(config(2)).unwrap();
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        scheduler.add_task(Priority::High, LaunchPolicy::Immediate, false, move || {
            flag.store(true, Ordering::SeqCst);
        });
        // The task was claimed before add_task returned; block waits for its end.
        scheduler.block();
        assert!(started.load(Ordering::SeqCst));
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_nested_block_waits_for_children() {
        let scheduler = Scheduler::new(config(2)).unwrap();
        let children = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicUsize::new(0));

        let inner = scheduler.clone();
        let (c, o) = (Arc::clone(&children), Arc::clone(&observed));
        scheduler.add_task(Priority::High, LaunchPolicy::Continue, false, move || {
            for _ in 0..4 {
                let c = Arc::clone(&c);
                inner.add_task(Priority::High, LaunchPolicy::Continue, false, move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            }
            inner.block();
            o.store(c.load(Ordering::SeqCst), Ordering::SeqCst);
        });
        scheduler.block();
        assert_eq!(observed.load(Ordering::SeqCst), 4);
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_affine_runs_on_submitter() {
        let scheduler = Scheduler::new(config(3)).unwrap();
        let caller = thread::current().id();
        let hits = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..8 {
            let hits = Arc::clone(&hits);
            scheduler.add_task(Priority::High, LaunchPolicy::Continue, true, move || {
                hits.lock().push(thread::current().id());
            });
        }
        assert_eq!(scheduler.pending_affine(), 8);
        scheduler.block();
        let hits = hits.lock();
        assert_eq!(hits.len(), 8);
        assert!(hits.iter().all(|id| *id == caller));
        assert_eq!(scheduler.stats().affine_tasks, 8);
        drop(hits);
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_terminate_from_task_is_rejected() {
        let scheduler = Scheduler::new(config(1)).unwrap();
        let result = Arc::new(Mutex::new(None));
        let (inner, slot) = (scheduler.clone(), Arc::clone(&result));
        scheduler.add_task(Priority::High, LaunchPolicy::Continue, false, move || {
            *slot.lock() = Some(inner.terminate().is_err());
        });
        scheduler.block();
        assert_eq!(*result.lock(), Some(true));
        assert!(scheduler.running());
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_stats_after_work() {
        let scheduler = Scheduler::new(config(2)).unwrap();
        for _ in 0..16 {
            scheduler.add_task(Priority::Low, LaunchPolicy::Continue, false, || {});
        }
        scheduler.block();
        let stats = scheduler.stats();
        assert_eq!(stats.submitted_tasks, 16);
        assert_eq!(stats.completed_tasks, 16);
        assert_eq!(stats.live, 1);
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_short_lived_threads_release_registry_slots() {
        let scheduler = Scheduler::new(config(2)).unwrap();
        // Two workers and the initializing thread.
        let baseline = scheduler.shared().queues.registry().len();
        assert_eq!(baseline, 3);

        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let (submitter, ran) = (scheduler.clone(), Arc::clone(&ran));
            thread::spawn(move || {
                let counter = Arc::clone(&ran);
                submitter.add_task(Priority::High, LaunchPolicy::Immediate, false, move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                submitter.block();
            })
            .join()
            .unwrap();
            assert!(scheduler.shared().queues.registry().len() <= baseline);
        }

        assert_eq!(ran.load(Ordering::SeqCst), 50);
        assert_eq!(scheduler.shared().queues.registry().len(), baseline);
        scheduler.terminate().unwrap();
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
