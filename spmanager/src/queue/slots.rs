//! Key-indexed slot storage shared by both queue flavours.
//!
//! Every path that mutates `tasks` also mutates `index` under the same
//! exclusive lock, so a mismatch is a bug. When one is detected the slots
//! rebuild the index from the vector, log a `[BUG]` line and emit a
//! [`MetricEvent::QueueReset`]. Nothing aborts.

use super::{FilterFn, QueueError, RetireFn};
use crate::metrics::{MetricEvent, MetricsSink};
use crate::task::{Task, TaskKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// A task plus the instant it entered the queue.
pub(crate) struct QueuedTask {
    pub task: Task,
    pub enqueued_at: Instant,
}

#[derive(Default)]
struct Slots {
    tasks: Vec<QueuedTask>,
    index: HashMap<TaskKey, usize>,
    retire: Option<RetireFn>,
    filter: Option<FilterFn>,
}

impl Slots {
    fn consistent(&self) -> bool {
        self.tasks.len() == self.index.len()
    }

    /// Rebuilds the index from the vector, dropping later duplicates.
    fn rebuild(&mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        self.index.clear();
        for queued in tasks {
            if self.index.contains_key(queued.task.key()) {
                continue;
            }
            self.index
                .insert(queued.task.key().clone(), self.tasks.len());
            self.tasks.push(queued);
        }
    }

    fn remove_at(&mut self, i: usize) -> QueuedTask {
        let removed = self.tasks.remove(i);
        self.index.remove(removed.task.key());
        for (j, queued) in self.tasks.iter().enumerate().skip(i) {
            self.index.insert(queued.task.key().clone(), j);
        }
        removed
    }

    fn insert(&mut self, task: Task) {
        self.index.insert(task.key().clone(), self.tasks.len());
        self.tasks.push(QueuedTask {
            task,
            enqueued_at: Instant::now(),
        });
    }

    fn is_retired(&mut self, i: usize) -> bool {
        match &self.retire {
            Some(retire) => retire(&mut self.tasks[i].task),
            None => false,
        }
    }

    fn passes_filter(&self, i: usize) -> bool {
        match &self.filter {
            Some(filter) => filter(&self.tasks[i].task),
            None => true,
        }
    }
}

/// Capacity-bounded, key-indexed task storage guarded by one lock.
pub(crate) struct QueueCore {
    name: String,
    cap: usize,
    slots: RwLock<Slots>,
    metrics: Arc<dyn MetricsSink>,
}

impl QueueCore {
    pub fn new(name: impl Into<String>, cap: usize, metrics: Arc<dyn MetricsSink>) -> Self {
        let name = name.into();
        metrics.emit(MetricEvent::QueueCapacity {
            queue: name.clone(),
            cap,
        });
        Self {
            name,
            cap,
            slots: RwLock::new(Slots::default()),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.slots.read().tasks.len()
    }

    pub fn set_retire_strategy(&self, retire: RetireFn) {
        self.slots.write().retire = Some(retire);
    }

    pub fn set_filter_strategy(&self, filter: FilterFn) {
        self.slots.write().filter = Some(filter);
    }

    pub fn scan(&self, visit: &mut dyn FnMut(&Task)) {
        let slots = self.slots.read();
        for queued in &slots.tasks {
            visit(&queued.task);
        }
    }

    fn reset(&self, slots: &mut Slots, reason: &str) {
        error!(
            queue = %self.name,
            tasks = slots.tasks.len(),
            index = slots.index.len(),
            reason = reason,
            "[BUG] queue index inconsistent, rebuilding"
        );
        slots.rebuild();
        self.metrics.emit(MetricEvent::QueueReset {
            queue: self.name.clone(),
        });
    }

    fn ensure_consistent(&self, slots: &mut Slots) {
        if !slots.consistent() {
            self.reset(slots, "length mismatch");
        }
    }

    /// Finds the slot holding `key`, healing a stale index first if needed.
    fn locate(&self, slots: &mut Slots, key: &TaskKey) -> Option<usize> {
        self.ensure_consistent(slots);
        let i = *slots.index.get(key)?;
        if i < slots.tasks.len() && slots.tasks[i].task.key() == key {
            return Some(i);
        }
        self.reset(slots, "stale index entry");
        slots.index.get(key).copied()
    }

    fn emit_size(&self, slots: &Slots) {
        self.metrics.emit(MetricEvent::QueueSize {
            queue: self.name.clone(),
            len: slots.tasks.len(),
        });
    }

    fn emit_dequeued(&self, queued: &QueuedTask) {
        self.metrics.emit(MetricEvent::TimeInQueue {
            queue: self.name.clone(),
            seconds: queued.enqueued_at.elapsed().as_secs_f64(),
        });
    }

    /// Admits a task, evicting one retirable task when the queue is full.
    pub fn push(&self, task: Task) -> Result<(), QueueError> {
        let mut slots = self.slots.write();
        self.ensure_consistent(&mut slots);

        if slots.index.contains_key(task.key()) {
            return Err(QueueError::Repeated {
                queue: self.name.clone(),
                key: task.key().clone(),
            });
        }

        if slots.tasks.len() >= self.cap {
            let victim = (0..slots.tasks.len())
                .rev()
                .find(|&i| slots.is_retired(i));
            match victim {
                Some(i) => {
                    let evicted = slots.remove_at(i);
                    debug!(
                        queue = %self.name,
                        evicted = %evicted.task.key(),
                        "Evicted retired task to admit new task"
                    );
                }
                None => {
                    return Err(QueueError::Exceed {
                        queue: self.name.clone(),
                        cap: self.cap,
                    });
                }
            }
        }

        slots.insert(task);
        self.emit_size(&slots);
        Ok(())
    }

    /// Scans tail to head for the first task that is not retired, passes
    /// the filter and satisfies `fits`. Retired tasks met on the way are
    /// evicted.
    pub fn select(&self, fits: &dyn Fn(&Task) -> bool, remove: bool) -> Option<Task> {
        let mut slots = self.slots.write();
        self.ensure_consistent(&mut slots);

        let mut retired = Vec::new();
        let mut chosen = None;
        for i in (0..slots.tasks.len()).rev() {
            if slots.is_retired(i) {
                retired.push(i);
                continue;
            }
            if slots.passes_filter(i) && fits(&slots.tasks[i].task) {
                chosen = Some(i);
                break;
            }
        }

        // `retired` is descending and every entry is above `chosen`
        for &i in &retired {
            let evicted = slots.remove_at(i);
            debug!(queue = %self.name, evicted = %evicted.task.key(), "Retired task");
        }

        let result = chosen.map(|i| {
            if remove {
                let queued = slots.remove_at(i);
                self.emit_dequeued(&queued);
                queued.task
            } else {
                slots.tasks[i].task.clone()
            }
        });

        if remove || !retired.is_empty() {
            self.emit_size(&slots);
        }
        result
    }

    pub fn pop_by_key(&self, key: &TaskKey) -> Option<Task> {
        let mut slots = self.slots.write();
        let i = self.locate(&mut slots, key)?;
        let queued = slots.remove_at(i);
        self.emit_dequeued(&queued);
        self.emit_size(&slots);
        Some(queued.task)
    }

    /// Returns whether `key` is queued, evicting it if it is retired.
    pub fn has(&self, key: &TaskKey) -> bool {
        let mut slots = self.slots.write();
        let Some(i) = self.locate(&mut slots, key) else {
            return false;
        };
        if slots.is_retired(i) {
            let evicted = slots.remove_at(i);
            debug!(queue = %self.name, evicted = %evicted.task.key(), "Retired task on lookup");
            self.emit_size(&slots);
            return false;
        }
        true
    }

    /// Returns a copy of the task stored under `key` without retiring it.
    pub fn peek(&self, key: &TaskKey) -> Option<Task> {
        let mut slots = self.slots.write();
        let i = self.locate(&mut slots, key)?;
        Some(slots.tasks[i].task.clone())
    }

    #[cfg(test)]
    pub fn corrupt_index_for_test(&self) {
        let mut slots = self.slots.write();
        let keys: Vec<TaskKey> = slots.index.keys().cloned().collect();
        if keys.len() >= 2 {
            let a = slots.index[&keys[0]];
            let b = slots.index[&keys[1]];
            slots.index.insert(keys[0].clone(), b);
            slots.index.insert(keys[1].clone(), a);
        } else if let Some(key) = keys.first() {
            slots.index.insert(key.clone(), usize::MAX);
        }
    }

    /// Checks the index against the vector. Used by property tests.
    pub fn invariants_hold(&self) -> bool {
        let slots = self.slots.read();
        slots.consistent()
            && slots.tasks.len() <= self.cap
            && slots
                .index
                .iter()
                .all(|(k, &i)| i < slots.tasks.len() && slots.tasks[i].task.key() == k)
    }
}
