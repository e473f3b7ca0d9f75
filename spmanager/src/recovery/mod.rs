//! Recovery of objects lost with an exited storage provider.
//!
//! A successor provider rebuilds the pieces it is now responsible for.
//! Recovery is scoped to a virtual group family (as primary) or a single
//! global virtual group (as secondary) and runs as cooperating loops:
//!
//! ```text
//! RecoverVgfScheduler ──spawns──► RecoverGvgScheduler ─┐ recovery queue
//!                      └─spawns─► VerifyGvgScheduler   │       │
//!                                        │             ▼       ▼
//!                                        └──► recover_failed ◄─ executor reports
//!                                             rows               (ObjectSegmentsStats)
//!                                               │
//!                                 RecoverFailedObjectScheduler
//! ```
//!
//! Progress lives in `RecoverGvgStats` rows, so a restart resumes every
//! group still in `Processing` (see [`RecoveryContext::resume`]).

mod config;
mod integrity;
mod recover_failed;
mod recover_gvg;
mod stats;
mod verify_gvg;
mod vgf;

pub use config::RecoveryConfig;
pub use integrity::verify_integrity;
pub use recover_failed::RecoverFailedObjectScheduler;
pub use recover_gvg::RecoverGvgScheduler;
pub use stats::ObjectSegmentsStats;
pub use verify_gvg::VerifyGvgScheduler;
pub use vgf::RecoverVgfScheduler;

use crate::client::types::{ObjectInfo, StorageParams};
use crate::client::{Consensus, MetaClient};
use crate::error::ManagerResult;
use crate::manager::TaskPolicy;
use crate::queue::{LimitTaskQueue, Queue, QueueError};
use crate::spdb::{RecoverStatus, SpDb};
use crate::task::Task;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Redundancy index of the primary copy.
pub const PRIMARY_REDUNDANCY_INDEX: i32 = -1;

/// Outcome of pushing one recover-piece task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Pushed,
    Repeated,
    Exceed,
}

/// State shared by every recovery loop.
pub struct RecoveryContext {
    queue: Arc<LimitTaskQueue>,
    stats: ObjectSegmentsStats,
    db: Arc<dyn SpDb>,
    chain: Arc<dyn Consensus>,
    meta: Arc<dyn MetaClient>,
    config: RecoveryConfig,
    policy: TaskPolicy,
    operator_address: String,
    recover_running: AtomicUsize,
    verify_running: AtomicUsize,
    failed_running: AtomicBool,
    shutdown: CancellationToken,
}

impl RecoveryContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<LimitTaskQueue>,
        db: Arc<dyn SpDb>,
        chain: Arc<dyn Consensus>,
        meta: Arc<dyn MetaClient>,
        config: RecoveryConfig,
        policy: TaskPolicy,
        operator_address: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            stats: ObjectSegmentsStats::new(),
            db,
            chain,
            meta,
            config,
            policy,
            operator_address: operator_address.into(),
            recover_running: AtomicUsize::new(0),
            verify_running: AtomicUsize::new(0),
            failed_running: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn queue(&self) -> &Arc<LimitTaskQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &ObjectSegmentsStats {
        &self.stats
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<dyn SpDb> {
        &self.db
    }

    /// Recover-GVG loops currently running.
    pub fn recover_running(&self) -> usize {
        self.recover_running.load(Ordering::Acquire)
    }

    /// Verify-GVG loops currently running.
    pub fn verify_running(&self) -> usize {
        self.verify_running.load(Ordering::Acquire)
    }

    pub fn failed_running(&self) -> bool {
        self.failed_running.load(Ordering::Acquire)
    }

    // =========================================================================
    // Task construction
    // =========================================================================

    /// Builds a recover-piece task on behalf of this successor provider.
    pub(crate) fn recover_task(
        &self,
        object: &ObjectInfo,
        params: StorageParams,
        gvg_id: u32,
        segment_idx: u32,
        redundancy_index: i32,
    ) -> Task {
        let mut task =
            Task::new_recover_piece(object.clone(), params, gvg_id, segment_idx, redundancy_index)
                .with_priority(self.policy.priority)
                .with_timeout(self.policy.timeout)
                .with_max_retry(self.policy.max_retry);
        if let Some(recover) = task.as_recover_piece_mut() {
            recover.by_successor_sp = true;
        }
        task
    }

    pub(crate) fn push(&self, task: Task) -> PushOutcome {
        let key = task.key().clone();
        match self.queue.push(task) {
            Ok(()) => PushOutcome::Pushed,
            Err(QueueError::Repeated { .. }) => {
                debug!(task_key = %key, "Recover task already queued");
                PushOutcome::Repeated
            }
            Err(e @ QueueError::Exceed { .. }) => {
                warn!(task_key = %key, error = %e, "Recovery queue is full");
                PushOutcome::Exceed
            }
        }
    }

    // =========================================================================
    // Loop helpers
    // =========================================================================

    /// Ticker whose first tick fires one period from now.
    pub(crate) fn ticker(period: Duration) -> Interval {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Waits for the next tick. Returns false once shut down.
    pub(crate) async fn tick(&self, ticker: &mut Interval) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = ticker.tick() => true,
        }
    }

    // =========================================================================
    // Spawning
    // =========================================================================

    pub fn spawn_recover_gvg(self: &Arc<Self>, scheduler: RecoverGvgScheduler) {
        self.recover_running.fetch_add(1, Ordering::AcqRel);
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run().await;
            ctx.recover_running.fetch_sub(1, Ordering::AcqRel);
        });
    }

    pub fn spawn_verify_gvg(self: &Arc<Self>, scheduler: VerifyGvgScheduler) {
        self.verify_running.fetch_add(1, Ordering::AcqRel);
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run().await;
            ctx.verify_running.fetch_sub(1, Ordering::AcqRel);
        });
        self.ensure_failed_scheduler();
    }

    /// Starts the failed-object loop unless one is already running.
    pub fn ensure_failed_scheduler(self: &Arc<Self>) {
        if self
            .failed_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            RecoverFailedObjectScheduler::new(Arc::clone(&ctx)).run().await;
            ctx.failed_running.store(false, Ordering::Release);
        });
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Starts recovery of a family (`vgf_id != 0`) or a single group.
    pub async fn start_recovery(
        self: &Arc<Self>,
        vgf_id: u32,
        gvg_id: u32,
        redundancy_index: i32,
    ) -> ManagerResult<()> {
        if vgf_id != 0 {
            if let Some(scheduler) = RecoverVgfScheduler::new(Arc::clone(self), vgf_id).await? {
                scheduler.start();
            }
            return Ok(());
        }
        let recover =
            RecoverGvgScheduler::new(Arc::clone(self), 0, gvg_id, redundancy_index)?;
        let verify = VerifyGvgScheduler::new(Arc::clone(self), 0, gvg_id, redundancy_index);
        info!(gvg_id, redundancy_index, "Starting gvg recovery");
        self.spawn_recover_gvg(recover);
        self.spawn_verify_gvg(verify);
        Ok(())
    }

    /// Restarts loops for every group whose recovery was interrupted.
    ///
    /// `Processing` groups get a recover and a verify loop; `Processed`
    /// groups only need verifying.
    pub fn resume(self: &Arc<Self>) -> ManagerResult<usize> {
        let mut resumed = 0;
        for row in self.db.get_recover_gvg_stats_by_status(RecoverStatus::Processing)? {
            let recover = RecoverGvgScheduler::resume(Arc::clone(self), &row);
            self.spawn_recover_gvg(recover);
            self.spawn_verify_gvg(VerifyGvgScheduler::new(
                Arc::clone(self),
                row.vgf_id,
                row.gvg_id,
                row.redundancy_index,
            ));
            resumed += 1;
        }
        for row in self.db.get_recover_gvg_stats_by_status(RecoverStatus::Processed)? {
            self.spawn_verify_gvg(VerifyGvgScheduler::new(
                Arc::clone(self),
                row.vgf_id,
                row.gvg_id,
                row.redundancy_index,
            ));
            resumed += 1;
        }
        if resumed > 0 {
            info!(resumed, "Resumed interrupted recoveries");
        }
        Ok(resumed)
    }

    pub(crate) fn chain(&self) -> &Arc<dyn Consensus> {
        &self.chain
    }

    pub(crate) fn meta(&self) -> &Arc<dyn MetaClient> {
        &self.meta
    }

    pub(crate) fn operator_address(&self) -> &str {
        &self.operator_address
    }
}
