//! Verification that every object in a recovered group has integrity.

use super::{verify_integrity, RecoveryContext};
use crate::client::types::CompleteSwapInRequest;
use crate::spdb::{RecoverFailedObject, RecoverStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Re-walks a group once its recovery is `Processed`, collecting objects
/// without an integrity record, then completes the swap-in when none remain.
pub struct VerifyGvgScheduler {
    ctx: Arc<RecoveryContext>,
    vgf_id: u32,
    gvg_id: u32,
    redundancy_index: i32,
    cur_start_after: u64,
    verify_success: HashSet<u64>,
    verify_failed: HashSet<u64>,
}

enum Reconcile {
    /// Every object verified; the group can be completed.
    Clean,
    /// Only objects that exhausted their retries remain.
    Stuck,
    Pending,
}

impl VerifyGvgScheduler {
    pub fn new(ctx: Arc<RecoveryContext>, vgf_id: u32, gvg_id: u32, redundancy_index: i32) -> Self {
        Self {
            ctx,
            vgf_id,
            gvg_id,
            redundancy_index,
            cur_start_after: 0,
            verify_success: HashSet::new(),
            verify_failed: HashSet::new(),
        }
    }

    pub async fn run(mut self) {
        let mut ticker = RecoveryContext::ticker(self.ctx.config().verify_interval);
        while self.ctx.tick(&mut ticker).await {
            let stats = match self.ctx.db().get_recover_gvg_stats(self.gvg_id) {
                Ok(stats) => stats,
                Err(e) => {
                    error!(gvg_id = self.gvg_id, error = %e, "Failed to get gvg stats");
                    continue;
                }
            };
            match stats.status {
                RecoverStatus::Processing => continue,
                RecoverStatus::Completed => {
                    info!(gvg_id = self.gvg_id, "Gvg recovery already completed");
                    return;
                }
                RecoverStatus::Processed => {}
            }

            let objects = match self
                .ctx
                .meta()
                .list_objects_in_gvg(
                    self.gvg_id,
                    self.cur_start_after,
                    self.ctx.config().verify_query_limit,
                )
                .await
            {
                Ok(objects) => objects,
                Err(e) => {
                    error!(gvg_id = self.gvg_id, error = %e, "Failed to list objects in gvg");
                    continue;
                }
            };

            let Some(last) = objects.last() else {
                self.cur_start_after = 0;
                match self.reconcile_failed().await {
                    Reconcile::Clean => {
                        if self.complete().await {
                            return;
                        }
                    }
                    Reconcile::Stuck => {
                        warn!(
                            gvg_id = self.gvg_id,
                            remaining = self.verify_failed.len(),
                            "Objects exhausted recovery retries, gvg needs discontinuing"
                        );
                        return;
                    }
                    Reconcile::Pending => {}
                }
                continue;
            };
            self.cur_start_after = last.id;

            for object in &objects {
                if self.verify_success.contains(&object.id) {
                    continue;
                }
                let verified =
                    match verify_integrity(self.ctx.db().as_ref(), object.id, self.redundancy_index) {
                        Ok(verified) => verified,
                        Err(e) => {
                            error!(object_id = object.id, error = %e, "Failed to verify integrity");
                            break;
                        }
                    };
                if verified {
                    self.verify_success.insert(object.id);
                    continue;
                }
                self.verify_failed.insert(object.id);
                let row = RecoverFailedObject::new(object.id, self.gvg_id, self.redundancy_index);
                match self.ctx.db().insert_recover_failed_object(&row) {
                    Ok(()) => debug!(object_id = object.id, "Object failed verification"),
                    Err(e) if e.is_duplicate() => {}
                    Err(e) => {
                        error!(object_id = object.id, error = %e, "Failed to insert recover failed object");
                        break;
                    }
                }
            }
        }
        debug!(gvg_id = self.gvg_id, "Verify gvg scheduler stopped");
    }

    /// Drops failed objects that have since been recovered or deleted.
    async fn reconcile_failed(&mut self) -> Reconcile {
        let mut need_discontinue = 0;
        for object_id in self.verify_failed.clone() {
            let row = match self.ctx.db().get_recover_failed_object(object_id) {
                Ok(row) => row,
                Err(e) if e.is_not_found() => {
                    self.verify_failed.remove(&object_id);
                    continue;
                }
                Err(e) => {
                    error!(object_id, error = %e, "Failed to get recover failed object");
                    continue;
                }
            };

            match self.ctx.chain().query_object_info_by_id(object_id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    info!(object_id, "Object deleted, dropping from verification");
                    if let Err(e) = self.ctx.db().delete_recover_failed_object(object_id) {
                        error!(object_id, error = %e, "Failed to delete recover failed object");
                    }
                    self.verify_failed.remove(&object_id);
                    continue;
                }
                Err(e) => {
                    error!(object_id, error = %e, "Failed to query object");
                    continue;
                }
            }

            if row.retry_time < self.ctx.config().max_recovery_retry {
                continue;
            }
            if self.ctx.meta().get_object_by_id(object_id).await.is_err() {
                continue;
            }
            match verify_integrity(self.ctx.db().as_ref(), object_id, self.redundancy_index) {
                Ok(true) => {
                    if let Err(e) = self.ctx.db().delete_recover_failed_object(object_id) {
                        error!(object_id, error = %e, "Failed to delete recover failed object");
                    }
                    self.verify_failed.remove(&object_id);
                }
                Ok(false) => need_discontinue += 1,
                Err(e) => error!(object_id, error = %e, "Failed to verify integrity"),
            }
        }

        let remaining = self.verify_failed.len();
        debug!(gvg_id = self.gvg_id, remaining, need_discontinue, "Reconciled failed objects");
        if remaining == 0 {
            Reconcile::Clean
        } else if remaining == need_discontinue {
            Reconcile::Stuck
        } else {
            Reconcile::Pending
        }
    }

    /// Completes the pending swap-in, if any, and marks the group
    /// `Completed`. Returns false when the swap-in is still outstanding.
    async fn complete(&self) -> bool {
        let (vgf_id, gvg_id) = if self.vgf_id != 0 {
            (self.vgf_id, 0)
        } else {
            (0, self.gvg_id)
        };
        let swap_in = match self.ctx.chain().query_swap_in_info(vgf_id, gvg_id).await {
            Ok(swap_in) => swap_in,
            Err(e) => {
                error!(vgf_id, gvg_id, error = %e, "Failed to query swap in info");
                return false;
            }
        };

        if swap_in.is_some() {
            let request = CompleteSwapInRequest { vgf_id, gvg_id };
            match self.ctx.meta().complete_swap_in(request).await {
                Ok(tx_hash) => info!(vgf_id, gvg_id, tx_hash = %tx_hash, "Completed swap in"),
                Err(e) => {
                    error!(vgf_id, gvg_id, error = %e, "Failed to complete swap in");
                    return false;
                }
            }
            match self.ctx.chain().query_swap_in_info(vgf_id, gvg_id).await {
                Ok(None) => {}
                Ok(Some(_)) => return false,
                Err(e) => {
                    error!(vgf_id, gvg_id, error = %e, "Failed to query swap in info");
                    return false;
                }
            }
        }

        let mut stats = match self.ctx.db().get_recover_gvg_stats(self.gvg_id) {
            Ok(stats) => stats,
            Err(e) => {
                error!(gvg_id = self.gvg_id, error = %e, "Failed to get gvg stats");
                return false;
            }
        };
        stats.status = RecoverStatus::Completed;
        if let Err(e) = self.ctx.db().update_recover_gvg_stats(&stats) {
            error!(gvg_id = self.gvg_id, error = %e, "Failed to mark gvg completed");
            return false;
        }
        info!(gvg_id = self.gvg_id, vgf_id = self.vgf_id, "Gvg recovery completed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, object};
    use super::*;
    use crate::client::types::SwapInInfo;
    use crate::client::SimulatedChain;
    use crate::spdb::{IntegrityMeta, MemorySpDb, RecoverGvgStats, SpDb};
    use std::time::Duration;

    fn processed(db: &MemorySpDb, vgf_id: u32, gvg_id: u32) {
        let mut row = RecoverGvgStats::new(vgf_id, gvg_id, -1, 10);
        row.status = RecoverStatus::Processed;
        db.set_recover_gvg_stats(&[row]).unwrap();
    }

    fn integrity(db: &MemorySpDb, object_id: u64) {
        db.set_object_integrity(&IntegrityMeta {
            object_id,
            redundancy_index: -1,
            ..Default::default()
        })
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_swap_in_when_all_verified() {
        let chain = Arc::new(SimulatedChain::new());
        let db = Arc::new(MemorySpDb::new());
        for id in 1..=3 {
            chain.add_object(object(id, 5, 10));
            integrity(&db, id);
        }
        chain.set_swap_in(0, 5, SwapInInfo::default());
        processed(&db, 0, 5);

        let ctx = context(chain.clone(), db.clone(), 16);
        let scheduler = VerifyGvgScheduler::new(ctx, 0, 5, -1);
        tokio::time::timeout(Duration::from_secs(30), scheduler.run())
            .await
            .unwrap();

        assert_eq!(db.get_recover_gvg_stats(5).unwrap().status, RecoverStatus::Completed);
        assert_eq!(
            chain.completed_swap_ins(),
            vec![CompleteSwapInRequest { vgf_id: 0, gvg_id: 5 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_integrity_records_failed_object() {
        let chain = Arc::new(SimulatedChain::new());
        let db = Arc::new(MemorySpDb::new());
        chain.add_object(object(1, 5, 10));
        chain.add_object(object(2, 5, 10));
        integrity(&db, 1);
        processed(&db, 0, 5);

        let ctx = context(chain.clone(), db.clone(), 16);
        let handle = tokio::spawn(VerifyGvgScheduler::new(ctx, 0, 5, -1).run());
        tokio::time::sleep(Duration::from_secs(5)).await;

        let row = db.get_recover_failed_object(2).unwrap();
        assert_eq!(row.gvg_id, 5);
        assert!(db.get_recover_failed_object(1).is_err());
        assert_eq!(db.get_recover_gvg_stats(5).unwrap().status, RecoverStatus::Processed);

        // The object arrives once recovery retries succeed.
        integrity(&db, 2);
        db.delete_recover_failed_object(2).unwrap();
        tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(db.get_recover_gvg_stats(5).unwrap().status, RecoverStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_object_is_dropped() {
        let chain = Arc::new(SimulatedChain::new());
        let db = Arc::new(MemorySpDb::new());
        chain.add_object(object(1, 5, 10));
        processed(&db, 0, 5);

        let ctx = context(chain.clone(), db.clone(), 16);
        let handle = tokio::spawn(VerifyGvgScheduler::new(ctx, 0, 5, -1).run());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(db.get_recover_failed_object(1).is_ok());

        chain.remove_object(1);
        tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(db.get_recover_failed_object(1).is_err());
        assert_eq!(db.get_recover_gvg_stats(5).unwrap().status, RecoverStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_without_swap_in() {
        let chain = Arc::new(SimulatedChain::new());
        let db = Arc::new(MemorySpDb::new());
        for id in 1..=2 {
            chain.add_object(object(id, 5, 10));
            integrity(&db, id);
        }
        processed(&db, 0, 5);

        let ctx = context(chain.clone(), db.clone(), 16);
        tokio::time::timeout(
            Duration::from_secs(30),
            VerifyGvgScheduler::new(ctx, 0, 5, -1).run(),
        )
        .await
        .unwrap();

        assert_eq!(db.get_recover_gvg_stats(5).unwrap().status, RecoverStatus::Completed);
        assert!(chain.completed_swap_ins().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_only_exhausted_objects_remain() {
        let chain = Arc::new(SimulatedChain::new());
        let db = Arc::new(MemorySpDb::new());
        chain.add_object(object(1, 5, 10));
        chain.add_object(object(2, 5, 10));
        chain.set_swap_in(0, 5, SwapInInfo::default());
        integrity(&db, 1);
        let mut row = RecoverFailedObject::new(2, 5, -1);
        row.retry_time = 2;
        db.insert_recover_failed_object(&row).unwrap();
        processed(&db, 0, 5);

        let ctx = context(chain.clone(), db.clone(), 16);
        tokio::time::timeout(
            Duration::from_secs(30),
            VerifyGvgScheduler::new(ctx, 0, 5, -1).run(),
        )
        .await
        .unwrap();

        // The group is left for discontinuing rather than completed
        assert_eq!(db.get_recover_gvg_stats(5).unwrap().status, RecoverStatus::Processed);
        assert_eq!(db.get_recover_failed_object(2).unwrap().retry_time, 2);
        assert!(chain.completed_swap_ins().is_empty());
    }
}
