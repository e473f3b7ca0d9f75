//! Retire and filter strategies installed on the manager's queues.
//!
//! Retire strategies run under the queue lock, so anything that touches
//! the database is handed to the [`BackgroundPool`].

use super::background::BackgroundPool;
use super::Queues;
use crate::queue::{FilterFn, Queue, RetireFn};
use crate::spdb::{SpDb, TaskState, UploadObjectMeta};
use crate::task::Task;
use std::sync::Arc;
use tracing::{error, warn};

/// Error description persisted for tasks retired after expiring.
pub const EXPIRED_DESCRIPTION: &str = "expired";

/// Retires expired tasks and records `state` with an `expired` description.
fn retire_expired_with_state(
    state: TaskState,
    db: Arc<dyn SpDb>,
    background: Arc<BackgroundPool>,
) -> RetireFn {
    Arc::new(move |task: &mut Task| {
        if !task.expired() {
            return false;
        }
        let Some(object_id) = task.object().map(|o| o.id) else {
            return true;
        };
        let db = Arc::clone(&db);
        let key = task.key().clone();
        background.spawn("persist_expired", async move {
            let meta = UploadObjectMeta::new(object_id, state).with_error(EXPIRED_DESCRIPTION);
            if let Err(e) = db.update_upload_progress(&meta) {
                error!(task_key = %key, error = %e, "Failed to update task state");
            }
        });
        true
    })
}

/// GC-object tasks are never evicted; an expired one gets its retry reset.
fn reset_gc_object() -> RetireFn {
    Arc::new(|task: &mut Task| {
        if task.expired() {
            warn!(task_key = %task.key(), retry = task.retry(), "Reset gc object task");
            task.set_retry(0);
        }
        false
    })
}

fn retire_exceed_retry() -> RetireFn {
    Arc::new(|task: &mut Task| task.exceed_retry())
}

fn retire_exceed_retry_or_timeout() -> RetireFn {
    Arc::new(|task: &mut Task| task.exceed_retry() || task.exceed_timeout())
}

fn retire_finished_migration() -> RetireFn {
    Arc::new(|task: &mut Task| task.as_migrate_gvg().is_some_and(|m| m.finished))
}

fn retire_always() -> RetireFn {
    Arc::new(|_: &mut Task| true)
}

/// New work, or work whose executor went quiet, as long as retries remain.
pub fn filter_uploading(task: &Task) -> bool {
    if task.exceed_retry() {
        return false;
    }
    task.exceed_timeout() || task.retry() == 0
}

/// Receive confirmations are re-dispatched only after timing out.
pub fn filter_receive(task: &Task) -> bool {
    !task.exceed_retry() && task.exceed_timeout()
}

pub fn filter_gc(task: &Task) -> bool {
    task.retry() == 0
}

pub fn filter_migrate_gvg(task: &Task) -> bool {
    task.retry() == 0 || task.exceed_timeout()
}

fn filter(f: fn(&Task) -> bool) -> FilterFn {
    Arc::new(f)
}

/// Installs every strategy on `queues`.
pub(super) fn install(queues: &Queues, db: &Arc<dyn SpDb>, background: &Arc<BackgroundPool>) {
    queues.upload.set_retire_strategy(retire_expired_with_state(
        TaskState::UploadObjectError,
        Arc::clone(db),
        Arc::clone(background),
    ));
    queues
        .resumable_upload
        .set_retire_strategy(retire_expired_with_state(
            TaskState::UploadObjectError,
            Arc::clone(db),
            Arc::clone(background),
        ));

    queues.replicate.set_retire_strategy(retire_expired_with_state(
        TaskState::ReplicateObjectError,
        Arc::clone(db),
        Arc::clone(background),
    ));
    queues.replicate.set_filter_strategy(filter(filter_uploading));

    queues.seal.set_retire_strategy(retire_expired_with_state(
        TaskState::SealObjectError,
        Arc::clone(db),
        Arc::clone(background),
    ));
    queues.seal.set_filter_strategy(filter(filter_uploading));

    queues.receive.set_retire_strategy(retire_exceed_retry());
    queues.receive.set_filter_strategy(filter(filter_receive));

    queues.gc_object.set_retire_strategy(reset_gc_object());
    queues.gc_object.set_filter_strategy(filter(filter_gc));

    queues.download.set_retire_strategy(retire_always());
    queues.challenge.set_retire_strategy(retire_always());

    queues
        .recovery
        .set_retire_strategy(retire_exceed_retry_or_timeout());
    queues.recovery.set_filter_strategy(filter(filter_uploading));

    queues
        .migrate_gvg
        .set_retire_strategy(retire_finished_migration());
    queues
        .migrate_gvg
        .set_filter_strategy(filter(filter_migrate_gvg));
}
