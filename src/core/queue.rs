//! Priority-bucketed work-stealing queues.
//!
//! `Continue` tasks go to one global injector per priority. `Immediate` tasks
//! go to the submitting participant's own LIFO deques, which every other
//! participant may steal from. Detached service loops go to a separate
//! injector that only worker threads poll. Context-affine tasks never enter
//! these queues (see `participant`).

use std::sync::Arc;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use parking_lot::RwLock;

use super::task::{Priority, Task};

/// Pull the first successful item out of a steal operation, retrying on contention.
fn retry_steal(mut op: impl FnMut() -> Steal<Task>) -> Option<Task> {
    loop {
        match op() {
            Steal::Success(task) => return Some(task),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}

/// A participant's own deques, one per priority.
pub(crate) struct LocalQueues {
    buckets: [Worker<Task>; 2],
}

impl LocalQueues {
    pub(crate) fn new() -> Self {
        Self {
            buckets: [Worker::new_lifo(), Worker::new_lifo()],
        }
    }

    pub(crate) fn push(&self, task: Task) {
        self.buckets[task.options.priority.bucket()].push(task);
    }

    pub(crate) fn pop(&self, priority: Priority) -> Option<Task> {
        self.buckets[priority.bucket()].pop()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.iter().all(Worker::is_empty)
    }

    fn stealers(&self) -> StealerSet {
        StealerSet {
            buckets: [self.buckets[0].stealer(), self.buckets[1].stealer()],
        }
    }
}

struct StealerSet {
    buckets: [Stealer<Task>; 2],
}

/// Stealable deques of every live participant. Slots of departed
/// participants are reused.
#[derive(Default)]
pub(crate) struct StealerRegistry {
    slots: RwLock<Vec<Option<StealerSet>>>,
}

impl StealerRegistry {
    /// Expose `local` to thieves. Returns the participant index.
    pub(crate) fn register(&self, local: &LocalQueues) -> usize {
        let mut slots = self.slots.write();
        if let Some(index) = slots.iter().position(Option::is_none) {
            slots[index] = Some(local.stealers());
            return index;
        }
        slots.push(Some(local.stealers()));
        slots.len() - 1
    }

    /// Free the slot of a participant whose deques are gone.
    pub(crate) fn unregister(&self, index: usize) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(index) {
            *slot = None;
        }
        while matches!(slots.last(), Some(None)) {
            slots.pop();
        }
    }

    /// Number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.slots.read().iter().flatten().count()
    }

    fn steal(&self, priority: Priority, thief: Option<usize>) -> Option<Task> {
        let slots = self.slots.read();
        slots
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != thief)
            .filter_map(|(_, slot)| slot.as_ref())
            .find_map(|set| retry_steal(|| set.buckets[priority.bucket()].steal()))
    }

    fn has_work(&self) -> bool {
        self.slots
            .read()
            .iter()
            .flatten()
            .any(|set| set.buckets.iter().any(|bucket| !bucket.is_empty()))
    }
}

/// Queues shared by every participant of one scheduler.
pub(crate) struct SharedQueues {
    injectors: [Injector<Task>; 2],
    services: Injector<Task>,
    stealers: Arc<StealerRegistry>,
}

impl SharedQueues {
    pub(crate) fn new() -> Self {
        Self {
            injectors: [Injector::new(), Injector::new()],
            services: Injector::new(),
            stealers: Arc::new(StealerRegistry::default()),
        }
    }

    /// Expose `local` to thieves. Returns the participant index.
    pub(crate) fn register(&self, local: &LocalQueues) -> usize {
        self.stealers.register(local)
    }

    /// The stealer registry, for participants that outlive a borrow of `self`.
    pub(crate) fn registry(&self) -> &Arc<StealerRegistry> {
        &self.stealers
    }

    pub(crate) fn push_global(&self, task: Task) {
        self.injectors[task.options.priority.bucket()].push(task);
    }

    pub(crate) fn pop_global(&self, priority: Priority) -> Option<Task> {
        let injector = &self.injectors[priority.bucket()];
        retry_steal(|| injector.steal())
    }

    pub(crate) fn push_service(&self, task: Task) {
        self.services.push(task);
    }

    pub(crate) fn pop_service(&self) -> Option<Task> {
        retry_steal(|| self.services.steal())
    }

    /// Steal one task of `priority` from any participant other than `thief`.
    pub(crate) fn steal(&self, priority: Priority, thief: Option<usize>) -> Option<Task> {
        self.stealers.steal(priority, thief)
    }

    /// Whether any globally visible queue holds a task.
    pub(crate) fn has_work(&self) -> bool {
        self.injectors.iter().any(|injector| !injector.is_empty())
            || !self.services.is_empty()
            || self.stealers.has_work()
    }

    /// Number of tasks waiting in the global injectors.
    pub(crate) fn global_len(&self) -> usize {
        self.injectors.iter().map(Injector::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{LaunchPolicy, TaskOptions};
    use crate::core::wave::Wave;

    fn make_task(id: u64, priority: Priority) -> Task {
        let wave = Wave::new();
        wave.enter();
        Task::new(
            id,
            TaskOptions::new(priority, LaunchPolicy::Continue),
            Box::new(|| {}),
            wave,
            None,
        )
    }

    #[test]
    fn test_global_buckets_by_priority() {
        let queues = SharedQueues::new();
        queues.push_global(make_task(1, Priority::Low));
        queues.push_global(make_task(2, Priority::High));
        assert_eq!(queues.global_len(), 2);
        assert_eq!(queues.pop_global(Priority::High).unwrap().id, 2);
        assert!(queues.pop_global(Priority::High).is_none());
        assert_eq!(queues.pop_global(Priority::Low).unwrap().id, 1);
        assert!(!queues.has_work());
    }

    #[test]
    fn test_services_are_separate() {
        let queues = SharedQueues::new();
        queues.push_service(make_task(5, Priority::Low));
        assert!(queues.has_work());
        assert_eq!(queues.global_len(), 0);
        assert!(queues.pop_global(Priority::Low).is_none());
        assert_eq!(queues.pop_service().unwrap().id, 5);
    }

    #[test]
    fn test_local_is_lifo() {
        let local = LocalQueues::new();
        local.push(make_task(1, Priority::High));
        local.push(make_task(2, Priority::High));
        assert_eq!(local.pop(Priority::High).unwrap().id, 2);
        assert_eq!(local.pop(Priority::High).unwrap().id, 1);
        assert!(local.pop(Priority::Low).is_none());
    }

    #[test]
    fn test_steal_skips_thief() {
        let queues = SharedQueues::new();
        let mine = LocalQueues::new();
        let theirs = LocalQueues::new();
        let me = queues.register(&mine);
        let them = queues.register(&theirs);
        mine.push(make_task(10, Priority::Low));
        assert!(queues.has_work());
        assert!(queues.steal(Priority::Low, Some(me)).is_none());
        assert_eq!(queues.steal(Priority::Low, Some(them)).unwrap().id, 10);
        assert!(!queues.has_work());
    }

    #[test]
    fn test_registry_reuses_freed_slots() {
        let registry = StealerRegistry::default();
        let (a, b, c) = (LocalQueues::new(), LocalQueues::new(), LocalQueues::new());
        assert_eq!(registry.register(&a), 0);
        assert_eq!(registry.register(&b), 1);
        registry.unregister(0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.register(&c), 0);
        assert_eq!(registry.len(), 2);

        // Freed tail slots are trimmed.
        registry.unregister(1);
        registry.unregister(0);
        assert_eq!(registry.len(), 0);
        assert!(registry.slots.read().is_empty());
    }

    #[test]
    fn test_unregistered_deques_are_not_stolen() {
        let queues = SharedQueues::new();
        let theirs = LocalQueues::new();
        let index = queues.register(&theirs);
        theirs.push(make_task(3, Priority::High));
        queues.registry().unregister(index);
        assert!(queues.steal(Priority::High, None).is_none());
        assert!(!queues.has_work());
        assert!(!theirs.is_empty());
    }
}
