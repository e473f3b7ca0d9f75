//! Batch recovery of the objects stored in one global virtual group.

use super::{PushOutcome, RecoveryContext};
use crate::client::types::{ObjectInfo, StorageParams};
use crate::error::ManagerResult;
use crate::queue::Queue;
use crate::spdb::{RecoverFailedObject, RecoverGvgStats, RecoverStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Walks a group's objects in batches and queues a recover-piece task per
/// segment, waiting for each batch to be reported before moving on.
pub struct RecoverGvgScheduler {
    ctx: Arc<RecoveryContext>,
    vgf_id: u32,
    gvg_id: u32,
    redundancy_index: i32,
    batch: HashSet<u64>,
}

impl RecoverGvgScheduler {
    /// Creates a scheduler. A group recovered on its own (`vgf_id == 0`)
    /// gets its stats row here; family recovery writes the rows up front.
    pub fn new(
        ctx: Arc<RecoveryContext>,
        vgf_id: u32,
        gvg_id: u32,
        redundancy_index: i32,
    ) -> ManagerResult<Self> {
        if vgf_id == 0 {
            ctx.db().set_recover_gvg_stats(&[RecoverGvgStats::new(
                vgf_id,
                gvg_id,
                redundancy_index,
                ctx.config().batch_size,
            )])?;
        }
        Ok(Self::resume(ctx, &RecoverGvgStats::new(vgf_id, gvg_id, redundancy_index, 0)))
    }

    /// Creates a scheduler for an existing stats row.
    pub fn resume(ctx: Arc<RecoveryContext>, row: &RecoverGvgStats) -> Self {
        Self {
            ctx,
            vgf_id: row.vgf_id,
            gvg_id: row.gvg_id,
            redundancy_index: row.redundancy_index,
            batch: HashSet::new(),
        }
    }

    pub fn gvg_id(&self) -> u32 {
        self.gvg_id
    }

    /// Runs until the group is `Processed` or the context shuts down.
    pub async fn run(mut self) {
        let params = match self.ctx.chain().query_storage_params().await {
            Ok(params) => params,
            Err(e) => {
                error!(gvg_id = self.gvg_id, error = %e, "Failed to get storage params");
                return;
            }
        };
        match self.ctx.db().get_recover_gvg_stats(self.gvg_id) {
            Ok(stats) if stats.status == RecoverStatus::Processing => {}
            Ok(_) => {
                info!(gvg_id = self.gvg_id, "Gvg is already processed");
                return;
            }
            Err(e) => {
                error!(gvg_id = self.gvg_id, error = %e, "Failed to get gvg stats");
                return;
            }
        }

        let mut ticker = RecoveryContext::ticker(self.ctx.config().recover_interval);
        while self.ctx.tick(&mut ticker).await {
            let mut stats = match self.ctx.db().get_recover_gvg_stats(self.gvg_id) {
                Ok(stats) => stats,
                Err(e) => {
                    error!(gvg_id = self.gvg_id, error = %e, "Failed to get gvg stats");
                    continue;
                }
            };
            if stats.status != RecoverStatus::Processing {
                info!(gvg_id = self.gvg_id, status = %stats.status, "Gvg recovery stopped");
                return;
            }

            let limit = if stats.limit == 0 {
                self.ctx.config().batch_size
            } else {
                stats.limit
            };
            let objects = match self
                .ctx
                .meta()
                .list_objects_in_gvg(self.gvg_id, stats.start_after, limit)
                .await
            {
                Ok(objects) => objects,
                Err(e) => {
                    error!(
                        gvg_id = self.gvg_id,
                        start_after = stats.start_after,
                        error = %e,
                        "Failed to list objects in gvg"
                    );
                    continue;
                }
            };
            info!(
                gvg_id = self.gvg_id,
                start_after = stats.start_after,
                limit,
                objects = objects.len(),
                "Listed objects in gvg"
            );

            let Some(last) = objects.last() else {
                stats.status = RecoverStatus::Processed;
                if let Err(e) = self.ctx.db().update_recover_gvg_stats(&stats) {
                    error!(gvg_id = self.gvg_id, error = %e, "Failed to mark gvg processed");
                    continue;
                }
                info!(gvg_id = self.gvg_id, "All objects in gvg processed");
                return;
            };
            if last.id != stats.next_start_after {
                stats.next_start_after = last.id;
                if let Err(e) = self.ctx.db().update_recover_gvg_stats(&stats) {
                    error!(gvg_id = self.gvg_id, error = %e, "Failed to update gvg stats");
                    continue;
                }
            }

            if self.queue_batch(&objects, params, stats.redundancy_index) {
                continue;
            }
            if !self.monitor_batch().await {
                return;
            }
        }
        debug!(gvg_id = self.gvg_id, vgf_id = self.vgf_id, "Recover gvg scheduler stopped");
    }

    /// Queues tasks for every object not already in the batch. Returns true
    /// when the recovery queue filled up and the batch must wait.
    fn queue_batch(
        &mut self,
        objects: &[ObjectInfo],
        params: StorageParams,
        redundancy_index: i32,
    ) -> bool {
        let cap = self.ctx.queue().cap();
        for object in objects {
            if self.batch.contains(&object.id) {
                debug!(object_id = object.id, "Object is being recovered");
                continue;
            }
            let segment_count = params.segment_count(object.payload_size);
            if segment_count == 0 {
                debug!(object_id = object.id, "Empty object, nothing to recover");
                continue;
            }
            if segment_count as usize >= cap {
                let row = RecoverFailedObject::new(object.id, self.gvg_id, redundancy_index);
                match self.ctx.db().insert_recover_failed_object(&row) {
                    Ok(()) => info!(object_id = object.id, segment_count, "Object too large to recover in one batch"),
                    Err(e) => {
                        error!(object_id = object.id, error = %e, "Failed to insert recover failed object");
                        break;
                    }
                }
                continue;
            }
            let pending = self.ctx.queue().len();
            if pending + segment_count as usize >= cap {
                warn!(
                    object_id = object.id,
                    pending,
                    segment_count,
                    cap,
                    "Exceeding recovery limit"
                );
                return true;
            }

            info!(object_id = object.id, segment_count, "Starting to recover object");
            for segment_idx in 0..segment_count {
                let task = self.ctx.recover_task(
                    object,
                    params,
                    self.gvg_id,
                    segment_idx,
                    self.redundancy_index,
                );
                if self.ctx.push(task) == PushOutcome::Exceed {
                    return true;
                }
            }
            if !self.ctx.stats().has(object.id) {
                self.ctx.stats().put(object.id, segment_count);
            }
            self.batch.insert(object.id);
        }
        false
    }

    /// Waits until every object in the batch is processed, then advances
    /// `start_after`. Returns false once shut down.
    async fn monitor_batch(&mut self) -> bool {
        let mut ticker = RecoveryContext::ticker(self.ctx.config().recover_interval);
        let started = Instant::now();
        loop {
            if !self.ctx.tick(&mut ticker).await {
                return false;
            }
            let timed_out = started.elapsed() > self.ctx.config().monitor_timeout;
            debug!(gvg_id = self.gvg_id, batch = self.batch.len(), timed_out, "Monitoring batch");

            let mut processed = true;
            for object_id in self.batch.clone() {
                if self.ctx.stats().is_processed(object_id) {
                    self.ctx.stats().remove(object_id);
                    self.batch.remove(&object_id);
                    continue;
                }
                if !timed_out {
                    processed = false;
                    break;
                }
                error!(object_id, gvg_id = self.gvg_id, "Object not processed before timeout");
                let row = RecoverFailedObject::new(object_id, self.gvg_id, self.redundancy_index);
                if let Err(e) = self.ctx.db().insert_recover_failed_object(&row) {
                    error!(object_id, error = %e, "Failed to insert recover failed object");
                    processed = false;
                    break;
                }
                self.ctx.stats().remove(object_id);
                self.batch.remove(&object_id);
            }
            if !processed {
                continue;
            }

            let mut stats = match self.ctx.db().get_recover_gvg_stats(self.gvg_id) {
                Ok(stats) => stats,
                Err(_) => continue,
            };
            stats.start_after = stats.next_start_after;
            if let Err(e) = self.ctx.db().update_recover_gvg_stats(&stats) {
                error!(gvg_id = self.gvg_id, error = %e, "Failed to advance gvg stats");
                continue;
            }
            self.batch.clear();
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, context_with, fast_config, object};
    use super::super::RecoveryConfig;
    use super::*;
    use crate::client::SimulatedChain;
    use crate::spdb::{MemorySpDb, SpDb};
    use std::time::Duration;

    #[test]
    fn test_new_writes_stats_for_single_group() {
        let db = Arc::new(MemorySpDb::new());
        let ctx = context(Arc::new(SimulatedChain::new()), db.clone(), 16);
        RecoverGvgScheduler::new(ctx, 0, 7, 2).unwrap();

        let row = db.get_recover_gvg_stats(7).unwrap();
        assert_eq!(row.redundancy_index, 2);
        assert_eq!(row.limit, 10);
        assert_eq!(row.status, RecoverStatus::Processing);
    }

    #[test]
    fn test_queue_batch_skips_empty_and_oversized_objects() {
        let db = Arc::new(MemorySpDb::new());
        let ctx = context(Arc::new(SimulatedChain::new()), db.clone(), 4);
        let mut scheduler = RecoverGvgScheduler::new(Arc::clone(&ctx), 0, 7, -1).unwrap();
        let params = StorageParams {
            max_segment_size: 10,
            ..StorageParams::default()
        };

        let objects = vec![object(1, 7, 0), object(2, 7, 100), object(3, 7, 15)];
        assert!(!scheduler.queue_batch(&objects, params, -1));

        assert_eq!(ctx.queue().len(), 2);
        assert!(!ctx.stats().has(1));
        assert!(db.get_recover_failed_object(2).is_ok());
        assert!(ctx.stats().has(3));
        assert_eq!(scheduler.batch.len(), 1);
    }

    #[test]
    fn test_queue_batch_holds_when_queue_fills() {
        let ctx = context(
            Arc::new(SimulatedChain::new()),
            Arc::new(MemorySpDb::new()),
            4,
        );
        let mut scheduler = RecoverGvgScheduler::new(Arc::clone(&ctx), 0, 7, -1).unwrap();
        let params = StorageParams {
            max_segment_size: 10,
            ..StorageParams::default()
        };

        let objects = vec![object(1, 7, 25), object(2, 7, 25)];
        assert!(scheduler.queue_batch(&objects, params, -1));
        assert_eq!(ctx.queue().len(), 3);
        assert_eq!(scheduler.batch.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_timeout_records_unreported_objects() {
        let db = Arc::new(MemorySpDb::new());
        let config = RecoveryConfig {
            monitor_timeout: Duration::from_secs(3),
            ..fast_config()
        };
        let ctx = context_with(Arc::new(SimulatedChain::new()), db.clone(), 16, config);
        let mut scheduler = RecoverGvgScheduler::new(Arc::clone(&ctx), 0, 7, -1).unwrap();
        let mut stats = db.get_recover_gvg_stats(7).unwrap();
        stats.next_start_after = 2;
        db.update_recover_gvg_stats(&stats).unwrap();

        let params = StorageParams {
            max_segment_size: 10,
            ..StorageParams::default()
        };
        let objects = vec![object(1, 7, 5), object(2, 7, 5)];
        assert!(!scheduler.queue_batch(&objects, params, -1));
        assert_eq!(scheduler.batch.len(), 2);

        // Nothing reports back, so the batch only ends by timing out
        let started = Instant::now();
        assert!(scheduler.monitor_batch().await);
        assert!(started.elapsed() > Duration::from_secs(3));

        for id in [1, 2] {
            let row = db.get_recover_failed_object(id).unwrap();
            assert_eq!(row.gvg_id, 7);
            assert_eq!(row.retry_time, 0);
            assert!(!ctx.stats().has(id));
        }
        assert!(scheduler.batch.is_empty());
        assert_eq!(db.get_recover_gvg_stats(7).unwrap().start_after, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_advances_once_batch_reported() {
        let db = Arc::new(MemorySpDb::new());
        let ctx = context(Arc::new(SimulatedChain::new()), db.clone(), 16);
        let mut scheduler = RecoverGvgScheduler::new(Arc::clone(&ctx), 0, 7, -1).unwrap();
        let params = StorageParams {
            max_segment_size: 10,
            ..StorageParams::default()
        };
        assert!(!scheduler.queue_batch(&[object(1, 7, 5)], params, -1));
        ctx.stats().add_segment(1, true, 0);

        assert!(scheduler.monitor_batch().await);
        assert!(db.get_recover_failed_object(1).is_err());
        assert!(!ctx.stats().has(1));
    }
}
