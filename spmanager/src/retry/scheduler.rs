//! Background retry of replicate, seal and reject-unseal work.

use super::{RetryConfig, RetryError, RetryKind, TaskIterator};
use crate::client::types::{ObjectInfo, ObjectStatus, RejectUnsealRequest, SealObjectRequest};
use crate::client::{BoxFuture, Consensus, MetaClient};
use crate::error::ManagerResult;
use crate::manager::TaskPolicy;
use crate::spdb::{SpDb, UploadObjectMeta};
use crate::task::Task;
use crate::time::now_unix;
use crate::vgm::GvgMeta;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where retried replicate tasks go.
pub trait RetryTarget: Send + Sync {
    /// Picks a group in the family, creating one when none fits.
    fn pick_gvg(&self, vgf_id: u32) -> BoxFuture<'_, ManagerResult<GvgMeta>>;

    fn push_replicate(&self, task: Task) -> ManagerResult<()>;
}

/// Three loops that walk persisted upload progress and finish work a
/// restart or a dropped task left behind.
pub struct TaskRetryScheduler {
    db: Arc<dyn SpDb>,
    chain: Arc<dyn Consensus>,
    meta: Arc<dyn MetaClient>,
    target: Arc<dyn RetryTarget>,
    policy: TaskPolicy,
    config: RetryConfig,
}

impl TaskRetryScheduler {
    pub fn new(
        db: Arc<dyn SpDb>,
        chain: Arc<dyn Consensus>,
        meta: Arc<dyn MetaClient>,
        target: Arc<dyn RetryTarget>,
        policy: TaskPolicy,
        config: RetryConfig,
    ) -> Self {
        Self {
            db,
            chain,
            meta,
            target,
            policy,
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Spawns the replicate, seal and reject-unseal loops.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            threshold_secs = self.config.threshold_secs(),
            "Task retry scheduler starting"
        );
        [RetryKind::Replicate, RetryKind::Seal, RetryKind::RejectUnseal]
            .into_iter()
            .map(|kind| {
                let scheduler = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.run_loop(kind, shutdown).await })
            })
            .collect()
    }

    async fn run_loop(&self, kind: RetryKind, shutdown: CancellationToken) {
        let mut loop_number: u64 = 0;
        let mut total: u64 = 0;
        loop {
            if !pause(self.config.loop_interval, &shutdown).await {
                break;
            }
            let iter = TaskIterator::new(
                Arc::clone(&self.db),
                kind,
                self.config.threshold_secs(),
                self.config.prefetch_limit,
                now_unix(),
            );
            info!(kind = %kind, ?iter, loop_number, total, "Starting retry loop");

            let mut current: u64 = 0;
            for row in iter {
                if !pause(self.config.item_interval, &shutdown).await {
                    return;
                }
                let result = self.retry(kind, &row).await;
                current += 1;
                total += 1;
                match result {
                    Ok(()) => info!(
                        kind = %kind,
                        object_id = row.object_id,
                        loop_number,
                        current,
                        total,
                        "Retried task"
                    ),
                    Err(e) => {
                        info!(
                            kind = %kind,
                            object_id = row.object_id,
                            loop_number,
                            current,
                            total,
                            error = %e,
                            "Retry failed, will try again next loop"
                        );
                        if e.needs_backoff() && !pause(self.config.backoff, &shutdown).await {
                            return;
                        }
                    }
                }
            }
            loop_number += 1;
        }
        debug!(kind = %kind, "Retry loop stopped");
    }

    /// Retries one row.
    pub async fn retry(&self, kind: RetryKind, row: &UploadObjectMeta) -> Result<(), RetryError> {
        match kind {
            RetryKind::Replicate => self.retry_replicate(row).await,
            RetryKind::Seal => self.retry_seal(row).await,
            RetryKind::RejectUnseal => self.retry_reject_unseal(row).await,
        }
    }

    async fn created_object(&self, object_id: u64) -> Result<ObjectInfo, RetryError> {
        let object = self.chain.query_object_info_by_id(object_id).await?;
        if object.status != ObjectStatus::Created {
            return Err(RetryError::NotCreated {
                object_id,
                status: object.status,
            });
        }
        Ok(object)
    }

    async fn retry_replicate(&self, row: &UploadObjectMeta) -> Result<(), RetryError> {
        let object = self.created_object(row.object_id).await?;
        let params = self
            .chain
            .query_storage_params_by_timestamp(object.create_at)
            .await
            .map_err(RetryError::Params)?;

        let (gvg_id, endpoints) = if row.gvg_id == 0 {
            let bucket = self.meta.get_bucket_by_bucket_name(&object.bucket_name).await?;
            let gvg = self.target.pick_gvg(bucket.vgf_id).await?;
            debug!(object_id = row.object_id, gvg_id = gvg.id, "Picked gvg for retried replicate");
            (gvg.id, gvg.secondary_sp_endpoints)
        } else {
            (row.gvg_id, row.secondary_endpoints.clone())
        };

        let mut task = Task::new_replicate(object, params, gvg_id)
            .with_priority(self.policy.priority)
            .with_timeout(self.policy.timeout)
            .with_max_retry(self.policy.max_retry);
        if let Some(replicate) = task.as_replicate_mut() {
            replicate.secondary_endpoints = endpoints;
        }
        self.target.push_replicate(task)?;
        Ok(())
    }

    async fn retry_seal(&self, row: &UploadObjectMeta) -> Result<(), RetryError> {
        let object = self.created_object(row.object_id).await?;
        let request = SealObjectRequest {
            bucket_name: object.bucket_name,
            object_name: object.object_name,
            gvg_id: row.gvg_id,
            secondary_signatures: row.secondary_signatures.clone(),
        };
        let tx_hash = self.meta.seal_object(request).await?;
        debug!(object_id = row.object_id, tx_hash = %tx_hash, "Retried seal");
        self.db.delete_upload_progress(row.object_id)?;
        Ok(())
    }

    async fn retry_reject_unseal(&self, row: &UploadObjectMeta) -> Result<(), RetryError> {
        let object = self.created_object(row.object_id).await?;
        let request = RejectUnsealRequest {
            bucket_name: object.bucket_name,
            object_name: object.object_name,
        };
        let tx_hash = self.meta.reject_unseal_object(request).await?;
        debug!(object_id = row.object_id, tx_hash = %tx_hash, "Rejected unsealed object");
        self.db.delete_upload_progress(row.object_id)?;
        Ok(())
    }
}

/// Sleeps for `period`. Returns false if shut down first.
async fn pause(period: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
