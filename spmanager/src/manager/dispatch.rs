//! Handing work to executors.

use super::{Manager, Queues};
use crate::metrics::MetricEvent;
use crate::queue::{LimitTaskQueue, Queue};
use crate::resource::ResourceBudget;
use crate::task::{Task, TaskKind};
use crate::time::now_unix;
use rand::Rng;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Picks one task with probability proportional to its priority.
///
/// Tasks are ordered by ascending priority and a draw in `[0, total)` selects
/// the first task whose running priority sum exceeds it. Returns `None` when
/// the priorities sum to zero.
pub fn pick_up_with<R: Rng>(rng: &mut R, mut tasks: Vec<Task>) -> Option<Task> {
    tasks.sort_by_key(|t| t.priority());
    let total: u64 = tasks.iter().map(|t| u64::from(t.priority())).sum();
    if total == 0 {
        return None;
    }
    let draw = rng.random_range(0..total);
    let mut sum = 0u64;
    tasks.into_iter().find(|t| {
        sum += u64::from(t.priority());
        sum > draw
    })
}

impl Queues {
    /// Dispatchable queue holding tasks of `kind`.
    fn for_kind(&self, kind: TaskKind) -> Option<&LimitTaskQueue> {
        let queue = match kind {
            TaskKind::ReplicatePiece => &self.replicate,
            TaskKind::SealObject => &self.seal,
            TaskKind::ReceivePiece => &self.receive,
            TaskKind::GcObject => &self.gc_object,
            TaskKind::GcZombiePiece => &self.gc_zombie,
            TaskKind::GcMeta => &self.gc_meta,
            TaskKind::RecoverPiece => &self.recovery,
            TaskKind::MigrateGvg => &self.migrate_gvg,
            _ => return None,
        };
        Some(queue.as_ref())
    }
}

impl Manager {
    /// Hands one task that fits `budget` to `executor`.
    ///
    /// The task stays queued: its retry is bumped, its error cleared and its
    /// update time reset, so the timeout filters hide it until the executor
    /// reports back or goes quiet. The pop and re-push happen under the
    /// dispatch lock, which upload admission also takes, so an object never
    /// looks absent from the queues while it is being dispatched.
    pub fn dispatch(&self, budget: &ResourceBudget, executor: &str) -> Option<Task> {
        let _guard = self.dispatch_lock.lock();
        let backup: Vec<Task> = self
            .queues
            .dispatchable()
            .iter()
            .filter_map(|q| q.top_by_limit(budget))
            .collect();
        self.backup.store(backup.len(), Ordering::Release);
        let picked = pick_up_with(&mut rand::rng(), backup)?;

        let kind = picked.kind();
        let queue = self.queues.for_kind(kind)?;
        let Some(mut task) = queue.pop_by_key(picked.key()) else {
            debug!(task_key = %picked.key(), "Picked task left its queue before dispatch");
            return None;
        };
        task.inc_retry();
        task.set_error(None);
        task.set_update_time(now_unix());
        task.set_address(executor);
        task.append_log("manager-dispatch-task");
        if let Err(e) = queue.push(task.clone()) {
            warn!(task_key = %task.key(), error = %e, "Failed to re-queue dispatched task");
        }

        self.metrics.emit(MetricEvent::TaskDispatched { kind });
        debug!(task_key = %task.key(), executor, retry = task.retry(), "Dispatched task");
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::resource::default_executor_budget;
    use crate::task::{DEFAULT_LARGER_PRIORITY, DEFAULT_SMALLER_PRIORITY};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn with_priority(id: u64, priority: u8) -> Task {
        Task::new_replicate(object(id), params(), 11).with_priority(priority)
    }

    #[test]
    fn test_pick_up_empty_or_zero_weight() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(pick_up_with(&mut rng, Vec::new()).is_none());
        assert!(pick_up_with(&mut rng, vec![with_priority(1, 0), with_priority(2, 0)]).is_none());
    }

    #[test]
    fn test_pick_up_never_picks_zero_priority() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let picked =
                pick_up_with(&mut rng, vec![with_priority(1, 0), with_priority(2, 10)]).unwrap();
            assert_eq!(picked.as_replicate().unwrap().object.as_ref().unwrap().id, 2);
        }
    }

    #[test]
    fn test_pick_up_is_weighted_by_priority() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut heavy = 0;
        let rounds = 4000;
        for _ in 0..rounds {
            let tasks = vec![with_priority(1, 10), with_priority(2, 30)];
            let picked = pick_up_with(&mut rng, tasks).unwrap();
            if picked.priority() == 30 {
                heavy += 1;
            }
        }
        let share = heavy as f64 / rounds as f64;
        assert!((0.70..0.80).contains(&share), "share {share}");
    }

    #[tokio::test]
    async fn test_dispatch_bumps_retry_and_hides_task() {
        let f = fixture().await;
        let task = Task::new_replicate(object(1), params(), 11)
            .with_priority(DEFAULT_LARGER_PRIORITY)
            .with_timeout(600)
            .with_max_retry(3);
        f.manager.queues.replicate.push(task.clone()).unwrap();

        let dispatched = f
            .manager
            .dispatch(&default_executor_budget(), "executor-1")
            .unwrap();
        assert_eq!(dispatched.key(), task.key());
        assert_eq!(dispatched.retry(), 1);
        assert_eq!(dispatched.header.address, "executor-1");
        assert!(dispatched.header.logs.ends_with("manager-dispatch-task"));

        let queued = f.manager.queues.replicate.peek(task.key()).unwrap();
        assert_eq!(queued.retry(), 1);
        assert!(f
            .manager
            .dispatch(&default_executor_budget(), "executor-2")
            .is_none());
        assert_eq!(f.manager.statistics().backup, 0);
    }

    #[tokio::test]
    async fn test_dispatch_respects_budget() {
        let f = fixture().await;
        let task = Task::new_gc_object(1, 100).with_priority(DEFAULT_SMALLER_PRIORITY);
        f.manager.queues.gc_object.push(task).unwrap();

        assert!(f
            .manager
            .dispatch(&ResourceBudget::zero(), "executor-1")
            .is_none());
        let dispatched = f
            .manager
            .dispatch(&default_executor_budget(), "executor-1")
            .unwrap();
        assert_eq!(dispatched.kind(), TaskKind::GcObject);
    }

    #[tokio::test]
    async fn test_dispatch_never_exposes_object_to_upload_admission() {
        let f = fixture().await;
        // A negative timeout keeps the task dispatchable on every call
        let replicate = Task::new_replicate(object(1), params(), 11)
            .with_priority(DEFAULT_LARGER_PRIORITY)
            .with_timeout(-1)
            .with_max_retry(100_000);
        f.manager.queues.replicate.push(replicate).unwrap();
        let rounds = 2000;

        std::thread::scope(|s| {
            s.spawn(|| {
                let budget = default_executor_budget();
                for _ in 0..rounds {
                    assert!(f.manager.dispatch(&budget, "executor-1").is_some());
                }
            });
            s.spawn(|| {
                for _ in 0..rounds {
                    let upload = Task::new_upload(object(1), params(), 1);
                    assert_eq!(
                        f.manager.handle_create_upload(upload),
                        Err(crate::error::ManagerError::RepeatedTask)
                    );
                }
            });
        });

        let tasks = f.manager.query_tasks("object-1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind(), TaskKind::ReplicatePiece);
        assert_eq!(tasks[0].retry(), rounds);
    }
}
