//! Retries objects whose recovery failed or whose verification did not pass.

use super::{verify_integrity, PushOutcome, RecoveryContext};
use crate::spdb::RecoverFailedObject;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Re-queues the missing segments of every failed object with retries left.
///
/// Runs while at least one verify loop is alive; the verify loops decide
/// when an object has exhausted its retries.
pub struct RecoverFailedObjectScheduler {
    ctx: Arc<RecoveryContext>,
}

impl RecoverFailedObjectScheduler {
    pub fn new(ctx: Arc<RecoveryContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(self) {
        let params = match self.ctx.chain().query_storage_params().await {
            Ok(params) => params,
            Err(e) => {
                error!(error = %e, "Failed to get storage params");
                return;
            }
        };

        let mut ticker = RecoveryContext::ticker(self.ctx.config().recover_failed_interval);
        while self.ctx.tick(&mut ticker).await {
            if self.ctx.verify_running() == 0 {
                info!("No verify scheduler running, stopping failed object recovery");
                return;
            }
            let rows = match self.ctx.db().get_recover_failed_objects(
                self.ctx.config().max_recovery_retry,
                self.ctx.config().batch_size as usize,
            ) {
                Ok(rows) => rows,
                Err(e) => {
                    error!(error = %e, "Failed to get recover failed objects");
                    continue;
                }
            };

            'rows: for mut row in rows {
                let object = match self.ctx.meta().get_object_by_id(row.object_id).await {
                    Ok(object) => object,
                    Err(e) => {
                        error!(object_id = row.object_id, error = %e, "Failed to get object");
                        continue;
                    }
                };
                match verify_integrity(self.ctx.db().as_ref(), row.object_id, row.redundancy_index) {
                    Ok(true) => {
                        info!(object_id = row.object_id, "Failed object recovered");
                        if let Err(e) = self.ctx.db().delete_recover_failed_object(row.object_id) {
                            error!(object_id = row.object_id, error = %e, "Failed to delete recover failed object");
                        }
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(object_id = row.object_id, error = %e, "Failed to verify integrity");
                        continue;
                    }
                }

                let segment_count = params.segment_count(object.payload_size);
                for segment_idx in 0..segment_count {
                    match self.ctx.db().get_replicate_piece_checksum(
                        row.object_id,
                        segment_idx,
                        row.redundancy_index,
                    ) {
                        Ok(_) => continue,
                        Err(e) if e.is_not_found() => {}
                        Err(e) => {
                            error!(object_id = row.object_id, segment_idx, error = %e, "Failed to get piece checksum");
                            break 'rows;
                        }
                    }
                    let task = self.ctx.recover_task(
                        &object,
                        params,
                        row.gvg_id,
                        segment_idx,
                        row.redundancy_index,
                    );
                    if self.ctx.push(task) == PushOutcome::Exceed {
                        break 'rows;
                    }
                }

                if !self.bump_retry(&mut row) {
                    break;
                }
            }
        }
        debug!("Recover failed object scheduler stopped");
    }

    fn bump_retry(&self, row: &mut RecoverFailedObject) -> bool {
        row.retry_time += 1;
        match self.ctx.db().update_recover_failed_object(row) {
            Ok(()) => true,
            Err(e) => {
                error!(object_id = row.object_id, error = %e, "Failed to update recover failed object");
                false
            }
        }
    }
}
