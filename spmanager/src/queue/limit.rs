//! Queue whose selection is bounded by a resource budget.

use super::slots::QueueCore;
use super::{FilterFn, Queue, QueueError, RetireFn};
use crate::metrics::MetricsSink;
use crate::resource::ResourceBudget;
use crate::task::{Task, TaskKey};
use std::sync::Arc;

/// Limit-aware task queue with `top_by_limit`/`pop_by_limit` selection.
///
/// Every queued task is expected to carry a resource estimate.
pub struct LimitTaskQueue {
    core: QueueCore,
}

fn fits(budget: &ResourceBudget, task: &Task) -> bool {
    let estimate = task.resource_estimate();
    debug_assert!(
        estimate.is_some(),
        "task {} in a limit-aware queue has no resource estimate",
        task
    );
    budget.not_less(&estimate.unwrap_or_default())
}

impl LimitTaskQueue {
    pub fn new(name: impl Into<String>, cap: usize, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            core: QueueCore::new(name, cap, metrics),
        }
    }

    /// Returns a copy of the first eligible task that fits `budget`.
    pub fn top_by_limit(&self, budget: &ResourceBudget) -> Option<Task> {
        self.core.select(&|t: &Task| fits(budget, t), false)
    }

    /// Removes and returns the first eligible task that fits `budget`.
    pub fn pop_by_limit(&self, budget: &ResourceBudget) -> Option<Task> {
        self.core.select(&|t: &Task| fits(budget, t), true)
    }

    pub fn invariants_hold(&self) -> bool {
        self.core.invariants_hold()
    }
}

impl Queue for LimitTaskQueue {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn len(&self) -> usize {
        self.core.len()
    }

    fn cap(&self) -> usize {
        self.core.cap()
    }

    fn push(&self, task: Task) -> Result<(), QueueError> {
        self.core.push(task)
    }

    fn pop_by_key(&self, key: &TaskKey) -> Option<Task> {
        self.core.pop_by_key(key)
    }

    fn has(&self, key: &TaskKey) -> bool {
        self.core.has(key)
    }

    fn peek(&self, key: &TaskKey) -> Option<Task> {
        self.core.peek(key)
    }

    fn scan(&self, visit: &mut dyn FnMut(&Task)) {
        self.core.scan(visit)
    }

    fn set_retire_strategy(&self, retire: RetireFn) {
        self.core.set_retire_strategy(retire)
    }

    fn set_filter_strategy(&self, filter: FilterFn) {
        self.core.set_filter_strategy(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::StorageParams;
    use crate::metrics::NullMetricsSink;
    use crate::queue::test_support::{object, replicate};

    fn queue(cap: usize) -> LimitTaskQueue {
        LimitTaskQueue::new("replicate", cap, Arc::new(NullMetricsSink))
    }

    #[test]
    fn test_top_by_limit_respects_budget() {
        let q = queue(4);
        let task = replicate(1);
        let estimate = task.resource_estimate().unwrap();
        q.push(task.clone()).unwrap();

        assert!(q.top_by_limit(&ResourceBudget::zero()).is_none());
        assert_eq!(q.top_by_limit(&estimate), Some(task));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_pop_by_limit_skips_oversized_tasks() {
        let q = queue(4);
        let small = Task::new_seal(object(1), StorageParams::default(), 1, vec![], vec![]);
        let big = replicate(2);
        let small_budget = small.resource_estimate().unwrap();
        q.push(small.clone()).unwrap();
        q.push(big.clone()).unwrap();

        assert!(!small_budget.not_less(&big.resource_estimate().unwrap()));
        assert_eq!(q.pop_by_limit(&small_budget).unwrap().key(), small.key());
        assert_eq!(q.pop_by_limit(&ResourceBudget::unlimited()).unwrap().key(), big.key());
    }

    #[test]
    fn test_retirement_under_pressure() {
        let q = queue(3);
        q.set_retire_strategy(Arc::new(|t: &mut Task| t.exceed_retry()));
        for (id, retry) in [(1, 5), (2, 4), (3, 2)] {
            let mut t = replicate(id).with_max_retry(3);
            t.set_retry(retry);
            q.push(t).unwrap();
        }

        q.push(replicate(4).with_max_retry(3)).unwrap();

        assert_eq!(q.len(), 3);
        assert!(q.peek(replicate(2).key()).is_none(), "tail-most retirable is evicted");
        assert!(q.peek(replicate(1).key()).is_some());
        assert!(q.peek(replicate(4).key()).is_some());
        assert!(q.invariants_hold());
    }
}
