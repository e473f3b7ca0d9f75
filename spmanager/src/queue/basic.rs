//! Queue that operates on every task regardless of resource cost.

use super::slots::QueueCore;
use super::{FilterFn, Queue, QueueError, RetireFn};
use crate::metrics::MetricsSink;
use crate::task::{Task, TaskKey};
use std::sync::Arc;

/// Basic task queue with `top`/`pop` selection.
pub struct TaskQueue {
    core: QueueCore,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>, cap: usize, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            core: QueueCore::new(name, cap, metrics),
        }
    }

    /// Returns a copy of the first eligible task, scanning tail to head.
    pub fn top(&self) -> Option<Task> {
        self.core.select(&|_: &Task| true, false)
    }

    /// Removes and returns the first eligible task, scanning tail to head.
    pub fn pop(&self) -> Option<Task> {
        self.core.select(&|_: &Task| true, true)
    }

    pub fn invariants_hold(&self) -> bool {
        self.core.invariants_hold()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_index_for_test(&self) {
        self.core.corrupt_index_for_test();
    }
}

impl Queue for TaskQueue {
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
    use crate::metrics::{NullMetricsSink, RecordingMetricsSink};
    use crate::queue::test_support::upload;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn queue(cap: usize) -> TaskQueue {
        TaskQueue::new("upload", cap, Arc::new(NullMetricsSink))
    }

    #[test]
    fn test_push_and_pop_by_key_round_trip() {
        let q = queue(4);
        let task = upload(1);
        q.push(task.clone()).unwrap();
        assert_eq!(q.pop_by_key(task.key()), Some(task));
        assert!(q.is_empty());
    }

    #[test]
    fn test_push_repeated_key() {
        let q = queue(4);
        q.push(upload(1)).unwrap();
        let err = q.push(upload(1)).unwrap_err();
        assert!(matches!(err, QueueError::Repeated { .. }));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_push_at_cap_minus_one_succeeds() {
        let q = queue(2);
        q.push(upload(1)).unwrap();
        q.push(upload(2)).unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_push_full_without_retire_fails() {
        let q = queue(1);
        q.push(upload(1)).unwrap();
        let err = q.push(upload(2)).unwrap_err();
        assert!(matches!(err, QueueError::Exceed { cap: 1, .. }));
        assert_eq!(q.len(), 1);
        assert!(q.has(upload(1).key()));
    }

    #[test]
    fn test_push_full_evicts_exactly_one_retired() {
        let q = queue(3);
        q.set_retire_strategy(Arc::new(|t: &mut Task| t.retry() > 0));
        let mut retired = upload(2);
        retired.set_retry(1);
        q.push(upload(1)).unwrap();
        q.push(retired.clone()).unwrap();
        q.push(upload(3)).unwrap();

        q.push(upload(4)).unwrap();

        assert_eq!(q.len(), 3);
        assert!(q.peek(retired.key()).is_none());
        assert!(q.peek(upload(4).key()).is_some());
    }

    #[test]
    fn test_pop_is_tail_first() {
        let q = queue(4);
        q.push(upload(1)).unwrap();
        q.push(upload(2)).unwrap();
        assert_eq!(q.top().unwrap().key(), upload(2).key());
        assert_eq!(q.pop().unwrap().key(), upload(2).key());
        assert_eq!(q.pop().unwrap().key(), upload(1).key());
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_filter_skips_without_evicting() {
        let q = queue(4);
        q.set_filter_strategy(Arc::new(|t: &Task| t.retry() == 0));
        let mut busy = upload(2);
        busy.set_retry(1);
        q.push(upload(1)).unwrap();
        q.push(busy).unwrap();

        assert_eq!(q.top().unwrap().key(), upload(1).key());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_filter_rejecting_all_returns_none() {
        let q = queue(4);
        q.set_filter_strategy(Arc::new(|_: &Task| false));
        q.push(upload(1)).unwrap();
        assert!(q.pop().is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_pop_evicts_retired_on_the_way() {
        let q = queue(4);
        q.set_retire_strategy(Arc::new(|t: &mut Task| t.retry() > 0));
        let mut retired = upload(2);
        retired.set_retry(1);
        q.push(upload(1)).unwrap();
        q.push(retired).unwrap();

        assert_eq!(q.pop().unwrap().key(), upload(1).key());
        assert!(q.is_empty());
        assert!(q.invariants_hold());
    }

    #[test]
    fn test_has_evicts_retired() {
        let q = queue(4);
        q.set_retire_strategy(Arc::new(|_: &mut Task| true));
        q.push(upload(1)).unwrap();
        assert!(!q.has(upload(1).key()));
        assert!(q.is_empty());
    }

    #[test]
    fn test_popped_task_is_gone() {
        let q = queue(4);
        let task = upload(1);
        q.push(task.clone()).unwrap();
        q.pop().unwrap();
        assert!(q.top().is_none());
        assert!(q.pop_by_key(task.key()).is_none());
    }

    #[test]
    fn test_stale_index_is_rebuilt() {
        let sink = Arc::new(RecordingMetricsSink::new());
        let q = TaskQueue::new("upload", 4, sink.clone());
        q.push(upload(1)).unwrap();
        q.push(upload(2)).unwrap();
        q.corrupt_index_for_test();

        assert_eq!(q.pop_by_key(upload(1).key()).unwrap().key(), upload(1).key());
        assert!(q.invariants_hold());
        assert_eq!(sink.reset_count(), 1);
    }

    #[test]
    fn test_scan_visits_every_task() {
        let q = queue(4);
        q.push(upload(1)).unwrap();
        q.push(upload(2)).unwrap();
        let mut seen = 0;
        q.scan(&mut |_| seen += 1);
        assert_eq!(seen, 2);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(u64),
        PopByKey(u64),
        Pop,
        Has(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..12).prop_map(Op::Push),
            (0u64..12).prop_map(Op::PopByKey),
            Just(Op::Pop),
            (0u64..12).prop_map(Op::Has),
        ]
    }

    proptest! {
        /// Property: any operation sequence keeps keys unique, the index in
        /// step with storage and the length within capacity.
        #[test]
        fn prop_operations_preserve_invariants(
            cap in 1usize..8,
            ops in prop::collection::vec(op(), 0..64),
        ) {
            let q = queue(cap);
            let mut model: HashSet<u64> = HashSet::new();
            for op in ops {
                match op {
                    Op::Push(id) => {
                        let result = q.push(upload(id));
                        if model.contains(&id) {
                            let repeated = matches!(result, Err(QueueError::Repeated { .. }));
                            prop_assert!(repeated);
                        } else if model.len() == cap {
                            let exceeded = matches!(result, Err(QueueError::Exceed { .. }));
                            prop_assert!(exceeded);
                        } else {
                            prop_assert!(result.is_ok());
                            model.insert(id);
                        }
                    }
                    Op::PopByKey(id) => {
                        let popped = q.pop_by_key(upload(id).key());
                        prop_assert_eq!(popped.is_some(), model.remove(&id));
                    }
                    Op::Pop => {
                        if let Some(task) = q.pop() {
                            let id = task.object().map(|o| o.id).unwrap_or_default();
                            prop_assert!(model.remove(&id));
                        } else {
                            prop_assert!(model.is_empty());
                        }
                    }
                    Op::Has(id) => prop_assert_eq!(q.has(upload(id).key()), model.contains(&id)),
                }
                prop_assert!(q.invariants_hold());
                prop_assert_eq!(q.len(), model.len());
                prop_assert!(q.len() <= cap);
            }
        }
    }
}
