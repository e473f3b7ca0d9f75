//! Recovery of a whole virtual group family as its new primary.

use super::{RecoverGvgScheduler, RecoveryContext, VerifyGvgScheduler, PRIMARY_REDUNDANCY_INDEX};
use crate::client::types::CompleteSwapInRequest;
use crate::error::ManagerResult;
use crate::spdb::RecoverGvgStats;
use std::sync::Arc;
use tracing::info;

/// One recover loop and one verify loop per group in the family.
pub struct RecoverVgfScheduler {
    ctx: Arc<RecoveryContext>,
    vgf_id: u32,
    recover: Vec<RecoverGvgScheduler>,
    verify: Vec<VerifyGvgScheduler>,
}

impl RecoverVgfScheduler {
    /// Writes a stats row per group and prepares their loops.
    ///
    /// A family without groups has nothing to recover, so its swap-in is
    /// completed straight away and `None` is returned.
    pub async fn new(ctx: Arc<RecoveryContext>, vgf_id: u32) -> ManagerResult<Option<Self>> {
        let family = ctx.chain().query_virtual_group_family(vgf_id).await?;
        if family.gvg_ids.is_empty() {
            let tx_hash = ctx
                .meta()
                .complete_swap_in(CompleteSwapInRequest { vgf_id, gvg_id: 0 })
                .await?;
            info!(vgf_id, tx_hash = %tx_hash, "Empty family, completed swap in");
            return Ok(None);
        }

        let batch_size = ctx.config().batch_size;
        let rows: Vec<RecoverGvgStats> = family
            .gvg_ids
            .iter()
            .map(|&gvg_id| RecoverGvgStats::new(vgf_id, gvg_id, PRIMARY_REDUNDANCY_INDEX, batch_size))
            .collect();
        ctx.db().set_recover_gvg_stats(&rows)?;

        let recover = rows
            .iter()
            .map(|row| RecoverGvgScheduler::resume(Arc::clone(&ctx), row))
            .collect();
        let verify = rows
            .iter()
            .map(|row| {
                VerifyGvgScheduler::new(Arc::clone(&ctx), vgf_id, row.gvg_id, PRIMARY_REDUNDANCY_INDEX)
            })
            .collect();
        info!(vgf_id, gvgs = rows.len(), operator = ctx.operator_address(), "Prepared family recovery");

        Ok(Some(Self {
            ctx,
            vgf_id,
            recover,
            verify,
        }))
    }

    pub fn vgf_id(&self) -> u32 {
        self.vgf_id
    }

    /// Number of groups being recovered.
    pub fn len(&self) -> usize {
        self.recover.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recover.is_empty()
    }

    /// Spawns every loop.
    pub fn start(self) {
        for scheduler in self.recover {
            self.ctx.spawn_recover_gvg(scheduler);
        }
        for scheduler in self.verify {
            self.ctx.spawn_verify_gvg(scheduler);
        }
    }
}
