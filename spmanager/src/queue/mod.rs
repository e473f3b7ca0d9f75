//! Capacity-bounded, key-indexed task queues.
//!
//! Two flavours share one storage core:
//!
//! - [`TaskQueue`] hands out any eligible task via `top`/`pop`
//! - [`LimitTaskQueue`] hands out only tasks whose resource estimate fits a
//!   caller-supplied [`ResourceBudget`](crate::resource::ResourceBudget)
//!
//! Selection scans tail to head, so the most recently pushed task is
//! considered first. A retire strategy marks tasks for silent eviction and
//! a filter strategy gates selection without evicting.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use spmanager::client::types::{ObjectInfo, StorageParams};
//! use spmanager::metrics::NullMetricsSink;
//! use spmanager::queue::{Queue, TaskQueue};
//! use spmanager::task::Task;
//!
//! let queue = TaskQueue::new("upload", 2, Arc::new(NullMetricsSink));
//! let task = Task::new_upload(ObjectInfo::default(), StorageParams::default(), 0);
//! let key = task.key().clone();
//!
//! queue.push(task.clone()).unwrap();
//! assert!(queue.push(task).is_err());
//! assert!(queue.has(&key));
//! assert_eq!(queue.pop().map(|t| t.key().clone()), Some(key));
//! ```

mod basic;
mod limit;
mod slots;

pub use basic::TaskQueue;
pub use limit::LimitTaskQueue;

use crate::task::{Task, TaskKey};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by [`Queue::push`]. No other queue operation fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// A task with the same key is already queued.
    #[error("queue {queue}: task {key} already exists")]
    Repeated { queue: String, key: TaskKey },

    /// The queue is full and no queued task could be retired.
    #[error("queue {queue}: capacity {cap} exceeded")]
    Exceed { queue: String, cap: usize },
}

/// Predicate marking a task for silent eviction.
///
/// Receives the task mutably so a strategy can reset bookkeeping (for
/// example clear the retry counter) instead of evicting.
pub type RetireFn = Arc<dyn Fn(&mut Task) -> bool + Send + Sync>;

/// Predicate gating whether a queued task may be selected.
pub type FilterFn = Arc<dyn Fn(&Task) -> bool + Send + Sync>;

/// Operations common to both queue flavours.
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cap(&self) -> usize;

    /// Admits a task.
    ///
    /// On a full queue exactly one retirable task, found from the tail, is
    /// evicted first. Fails with `Repeated` if the key is present or
    /// `Exceed` if nothing could be evicted; on failure the queue is
    /// unchanged.
    fn push(&self, task: Task) -> Result<(), QueueError>;

    fn pop_by_key(&self, key: &TaskKey) -> Option<Task>;

    /// Runs the retire check for `key`; a retired task is evicted and
    /// reported as absent.
    fn has(&self, key: &TaskKey) -> bool;

    /// Returns a copy of the task under `key` without running the retire
    /// check.
    fn peek(&self, key: &TaskKey) -> Option<Task>;

    /// Visits every task under the shared lock.
    fn scan(&self, visit: &mut dyn FnMut(&Task));

    fn set_retire_strategy(&self, retire: RetireFn);

    fn set_filter_strategy(&self, filter: FilterFn);
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::client::types::{ObjectInfo, StorageParams};
    use crate::task::Task;

    pub fn object(id: u64) -> ObjectInfo {
        ObjectInfo {
            id,
            bucket_name: "bucket".into(),
            object_name: format!("object-{}", id),
            payload_size: 1024,
            ..Default::default()
        }
    }

    pub fn replicate(id: u64) -> Task {
        Task::new_replicate(object(id), StorageParams::default(), 1)
    }

    pub fn upload(id: u64) -> Task {
        Task::new_upload(object(id), StorageParams::default(), 1)
    }
}
