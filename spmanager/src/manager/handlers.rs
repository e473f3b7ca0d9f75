//! Executor reports.
//!
//! Each handler validates the reported task, moves it between queues and
//! hands persistence to the background pool. Handlers never hold a queue
//! lock across an await.

use super::Manager;
use crate::client::types::{ObjectInfo, StorageParams};
use crate::error::{ManagerError, ManagerResult};
use crate::manager::SwapOutNotice;
use crate::metrics::outcome;
use crate::queue::{LimitTaskQueue, Queue};
use crate::spdb::{GcObjectMeta, PutObjectEvent, TaskState, UploadObjectMeta};
use crate::task::Task;
use crate::time::now_unix;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error description persisted when a task ran out of retries.
pub const EXCEED_RETRY_DESCRIPTION: &str = "exceed_retry";

/// Object and storage params of an object-bound task, or `DanglingTask`.
fn object_and_params(task: &Task) -> ManagerResult<(ObjectInfo, StorageParams)> {
    match (task.object(), task.params()) {
        (Some(object), Some(params)) => Ok((object.clone(), *params)),
        _ => Err(ManagerError::DanglingTask),
    }
}

impl Manager {
    // =========================================================================
    // Persistence helpers
    // =========================================================================

    fn persist_upload_progress(&self, meta: UploadObjectMeta) {
        let db = Arc::clone(&self.db);
        self.background.spawn("update_upload_progress", async move {
            if let Err(e) = db.update_upload_progress(&meta) {
                error!(object_id = meta.object_id, state = %meta.task_state.as_str(), error = %e, "Failed to update upload progress");
            }
        });
    }

    /// Records a put event and the terminal state of an object.
    fn persist_upload_outcome(&self, task: &Task, meta: UploadObjectMeta) {
        let db = Arc::clone(&self.db);
        let event = PutObjectEvent::new(meta.object_id, meta.task_state.as_str(), task.info());
        self.background.spawn("upload_outcome", async move {
            if let Err(e) = db.insert_put_event(event) {
                warn!(object_id = meta.object_id, error = %e, "Failed to insert put event");
            }
            if let Err(e) = db.update_upload_progress(&meta) {
                error!(object_id = meta.object_id, state = %meta.task_state.as_str(), error = %e, "Failed to update upload progress");
            }
        });
    }

    /// Pops the queued copy of a failed task and re-queues it while retries
    /// remain. Returns the popped copy once its retries are exhausted.
    fn requeue_failed(
        &self,
        queue: &LimitTaskQueue,
        reported: &Task,
        step: &str,
    ) -> ManagerResult<Option<Task>> {
        let Some(mut old) = queue.pop_by_key(reported.key()) else {
            warn!(task_key = %reported.key(), "Failed task is no longer queued");
            return Err(ManagerError::CanceledTask);
        };
        if old.exceed_retry() {
            return Ok(Some(old));
        }
        old.append_log(step);
        old.set_update_time(now_unix());
        queue.push(old)?;
        debug!(task_key = %reported.key(), "Re-queued failed task");
        Ok(None)
    }

    // =========================================================================
    // Upload
    // =========================================================================

    fn check_upload_admission(&self, task: &Task) -> ManagerResult<()> {
        let uploading = self.uploading_count();
        if uploading >= self.config.max_upload_parallelism {
            warn!(
                task_key = %task.key(),
                uploading,
                max = self.config.max_upload_parallelism,
                "Upload parallelism exhausted"
            );
            return Err(ManagerError::ExceedTask);
        }
        if self.task_uploading(task) {
            return Err(ManagerError::RepeatedTask);
        }
        Ok(())
    }

    /// Admits a new upload and creates its progress row.
    ///
    /// A failed progress write is returned but the task stays queued; the
    /// upload itself may still succeed.
    pub fn handle_create_upload(&self, task: Task) -> ManagerResult<()> {
        let object_id = task
            .as_upload()
            .and_then(|u| u.object.as_ref())
            .map(|o| o.id)
            .ok_or(ManagerError::DanglingTask)?;
        let key = task.key().clone();
        {
            let _guard = self.dispatch_lock.lock();
            self.check_upload_admission(&task)?;
            self.queues.upload.push(task)?;
        }
        if let Err(e) = self.db.insert_upload_progress(object_id) {
            error!(task_key = %key, error = %e, "Failed to create upload progress");
            return Err(e.into());
        }
        Ok(())
    }

    /// Like [`handle_create_upload`](Self::handle_create_upload). A resumed
    /// upload already has a progress row, which is fine.
    pub fn handle_create_resumable_upload(&self, task: Task) -> ManagerResult<()> {
        let object_id = task
            .as_resumable_upload()
            .and_then(|u| u.object.as_ref())
            .map(|o| o.id)
            .ok_or(ManagerError::DanglingTask)?;
        let key = task.key().clone();
        {
            let _guard = self.dispatch_lock.lock();
            self.check_upload_admission(&task)?;
            self.queues.resumable_upload.push(task)?;
        }
        match self.db.insert_upload_progress(object_id) {
            Ok(()) => Ok(()),
            Err(e) if e.is_duplicate() => Ok(()),
            Err(e) => {
                error!(task_key = %key, error = %e, "Failed to create upload progress");
                Err(e.into())
            }
        }
    }

    /// Finishes the upload phase and queues replication.
    pub async fn handle_done_upload(&self, task: Task) -> ManagerResult<()> {
        let vgf_id = task.as_upload().ok_or(ManagerError::DanglingTask)?.vgf_id;
        let (object, params) = object_and_params(&task)?;

        self.queues.upload.pop_by_key(task.key());
        if self.task_uploading(&task) {
            return Err(ManagerError::RepeatedTask);
        }
        if let Some(err) = task.error() {
            warn!(task_key = %task.key(), error = %err, "Upload failed");
            self.persist_upload_progress(
                UploadObjectMeta::new(object.id, TaskState::UploadObjectError)
                    .with_error(err.to_string()),
            );
            self.emit_outcome(outcome::FAILED_UPLOAD, task.create_time());
            return Ok(());
        }
        self.emit_outcome(outcome::SUCCEED_UPLOAD, task.create_time());
        self.pick_gvg_and_replicate(vgf_id, &task, object, params)
            .await
    }

    /// Finishes one part of a resumable upload; replication starts once the
    /// last part is in.
    pub async fn handle_done_resumable_upload(&self, task: Task) -> ManagerResult<()> {
        let upload = task
            .as_resumable_upload()
            .ok_or(ManagerError::DanglingTask)?;
        let (vgf_id, completed) = (upload.vgf_id, upload.completed);
        let (object, params) = object_and_params(&task)?;

        self.queues.resumable_upload.pop_by_key(task.key());
        if self.task_uploading(&task) {
            return Err(ManagerError::RepeatedTask);
        }
        if let Some(err) = task.error() {
            warn!(task_key = %task.key(), error = %err, "Resumable upload failed");
            self.persist_upload_progress(
                UploadObjectMeta::new(object.id, TaskState::UploadObjectError)
                    .with_error(err.to_string()),
            );
            self.emit_outcome(outcome::FAILED_UPLOAD, task.create_time());
            return Ok(());
        }
        if !completed {
            debug!(task_key = %task.key(), "Resumable upload part done");
            return Ok(());
        }
        self.emit_outcome(outcome::SUCCEED_UPLOAD, task.create_time());
        self.pick_gvg_and_replicate(vgf_id, &task, object, params)
            .await
    }

    /// Picks a group in `vgf_id` and queues a replicate task derived from
    /// `source`.
    async fn pick_gvg_and_replicate(
        &self,
        vgf_id: u32,
        source: &Task,
        object: ObjectInfo,
        params: StorageParams,
    ) -> ManagerResult<()> {
        let gvg = self
            .pick_global_virtual_group(vgf_id, params)
            .await
            .inspect_err(|e| {
                error!(task_key = %source.key(), vgf_id, error = %e, "Failed to pick global virtual group");
            })?;

        let object_id = object.id;
        let policy = self.config.tasks.replicate;
        let mut replicate = Task::new_replicate(object, params, gvg.id)
            .with_priority(policy.priority)
            .with_timeout(policy.timeout)
            .with_max_retry(policy.max_retry);
        replicate.header.create_time = source.create_time();
        replicate.header.logs = source.header.logs.clone();
        replicate.append_log("manager-create-replicate-task");
        if let Some(r) = replicate.as_replicate_mut() {
            r.secondary_endpoints = gvg.secondary_sp_endpoints.clone();
        }

        self.queues.replicate.push(replicate).inspect_err(|e| {
            error!(task_key = %source.key(), error = %e, "Failed to push replicate task");
        })?;
        self.refresh_backup();

        let mut meta = UploadObjectMeta::new(object_id, TaskState::ReplicateObjectDoing);
        meta.gvg_id = gvg.id;
        meta.secondary_endpoints = gvg.secondary_sp_endpoints;
        self.persist_upload_progress(meta);
        Ok(())
    }

    // =========================================================================
    // Replicate
    // =========================================================================

    /// Handles a replication report.
    ///
    /// A failure is handled in the background. A success either finishes
    /// the object, when the executor also sealed it, or queues a seal task.
    pub fn handle_replicate(&self, task: Task) -> ManagerResult<()> {
        let replicate = task.as_replicate().ok_or(ManagerError::DanglingTask)?;
        let (object, params) = object_and_params(&task)?;

        if task.error().is_some() {
            self.emit_outcome(outcome::FAILED_REPLICATE, task.update_time());
            if let Some(this) = self.arc() {
                self.background.spawn("failed_replicate", async move {
                    let key = task.key().clone();
                    if let Err(e) = this.handle_failed_replicate(task).await {
                        warn!(task_key = %key, error = %e, "Failed replicate handling did not complete");
                    }
                });
            }
            return Ok(());
        }

        self.emit_outcome(outcome::SUCCEED_REPLICATE, task.update_time());
        self.queues.replicate.pop_by_key(task.key());
        if self.task_uploading(&task) {
            return Err(ManagerError::RepeatedTask);
        }

        if replicate.sealed {
            info!(task_key = %task.key(), "Replicated and sealed");
            self.emit_outcome(outcome::SUCCEED_REPLICATE_AND_SEAL, task.update_time());
            let mut task = task.clone();
            task.append_log("manager-handle-succeed-replicate-and-seal");
            self.persist_upload_outcome(
                &task,
                UploadObjectMeta::new(object.id, TaskState::SealObjectDone),
            );
            return Ok(());
        }
        self.emit_outcome(outcome::FAILED_REPLICATE_AND_SEAL, task.update_time());

        let policy = self.config.tasks.seal;
        let mut seal = Task::new_seal(
            object,
            params,
            replicate.gvg_id,
            replicate.secondary_addresses.clone(),
            replicate.secondary_signatures.clone(),
        )
        .with_priority(policy.priority)
        .with_timeout(policy.timeout)
        .with_max_retry(policy.max_retry);
        seal.header.create_time = task.create_time();
        seal.header.logs = task.header.logs.clone();
        seal.append_log("manager-create-seal-task");
        let object_id = seal.object().map(|o| o.id).unwrap_or_default();

        self.queues.seal.push(seal).inspect_err(|e| {
            error!(task_key = %task.key(), error = %e, "Failed to push seal task");
        })?;
        self.refresh_backup();

        let mut meta = UploadObjectMeta::new(object_id, TaskState::SealObjectDoing);
        meta.gvg_id = replicate.gvg_id;
        meta.secondary_endpoints = replicate.secondary_endpoints.clone();
        meta.secondary_signatures = replicate.secondary_signatures.clone();
        self.persist_upload_progress(meta);
        Ok(())
    }

    /// Retries a failed replication, or gives up once its retries are
    /// exhausted.
    ///
    /// When the executor names an unreachable secondary, that provider and
    /// every group it serves for us are frozen and a fresh group is picked.
    pub async fn handle_failed_replicate(&self, task: Task) -> ManagerResult<()> {
        let replicate = task.as_replicate().ok_or(ManagerError::DanglingTask)?;
        if replicate.not_available_sp_idx != -1 {
            return self.replace_unavailable_secondary(task).await;
        }

        let popped = self.queues.replicate.pop_by_key(task.key());
        if self.task_uploading(&task) {
            return Err(ManagerError::RepeatedTask);
        }
        let Some(mut old) = popped else {
            warn!(task_key = %task.key(), "Failed replicate task is no longer queued");
            return Err(ManagerError::CanceledTask);
        };
        let key = old.key().clone();
        if !old.exceed_retry() {
            old.append_log("manager-handle-failed-replicate-task-repush");
            old.set_update_time(now_unix());
            self.queues.replicate.push(old)?;
            debug!(task_key = %key, "Re-queued failed replicate task");
            return Ok(());
        }

        let mut exhausted = old;
        warn!(task_key = %key, retry = exhausted.retry(), "Replicate retries exhausted");
        self.emit_outcome(outcome::CANCEL_REPLICATE, exhausted.create_time());
        exhausted.append_log("manager-cancel-replicate-task");
        if let Some(object) = exhausted.object() {
            let meta = UploadObjectMeta::new(object.id, TaskState::ReplicateObjectError)
                .with_error(EXCEED_RETRY_DESCRIPTION);
            self.persist_upload_outcome(&exhausted, meta);
        }
        Ok(())
    }

    async fn replace_unavailable_secondary(&self, task: Task) -> ManagerResult<()> {
        let replicate = task.as_replicate().ok_or(ManagerError::DanglingTask)?;
        let (object, params) = object_and_params(&task)?;
        let gvg = self
            .chain
            .query_global_virtual_group(replicate.gvg_id)
            .await?;
        let idx = replicate.not_available_sp_idx;
        let Some(&sp_id) = usize::try_from(idx)
            .ok()
            .and_then(|i| gvg.secondary_sp_ids.get(i))
        else {
            warn!(task_key = %task.key(), gvg_id = gvg.id, idx, "Unavailable secondary index out of range");
            return Err(ManagerError::DanglingTask);
        };

        let self_sp_id = self.self_sp_id();
        let gvgs: Vec<_> = self
            .meta
            .list_global_virtual_groups_by_secondary_sp(sp_id)
            .await?
            .into_iter()
            .filter(|g| Some(g.primary_sp_id) == self_sp_id)
            .collect();
        info!(sp_id, gvgs = gvgs.len(), "Freezing unavailable secondary");
        self.vgm.freeze_sp_and_gvgs(sp_id, gvgs);

        self.queues.replicate.pop_by_key(task.key());
        self.pick_gvg_and_replicate(gvg.family_id, &task, object, params)
            .await
    }

    /// Id of this provider from the virtual group snapshot, falling back to
    /// the persisted provider info.
    pub(crate) fn self_sp_id(&self) -> Option<u32> {
        self.vgm
            .self_sp_id()
            .or_else(|| self.db.get_own_sp_info().ok().map(|sp| sp.id))
    }

    // =========================================================================
    // Seal
    // =========================================================================

    /// Handles a seal report. The object is finished on success.
    pub fn handle_seal(&self, task: Task) -> ManagerResult<()> {
        task.as_seal().ok_or(ManagerError::DanglingTask)?;
        let (object, _) = object_and_params(&task)?;

        if task.error().is_some() {
            if let Err(e) = self.handle_failed_seal(&task) {
                warn!(task_key = %task.key(), error = %e, "Failed seal handling did not complete");
            }
            self.emit_outcome(outcome::FAILED_SEAL, task.update_time());
            return Ok(());
        }

        self.emit_outcome(outcome::SUCCEED_SEAL, task.update_time());
        self.queues.seal.pop_by_key(task.key());
        let mut task = task;
        task.append_log("manager-handle-succeed-seal");
        self.persist_upload_outcome(
            &task,
            UploadObjectMeta::new(object.id, TaskState::SealObjectDone),
        );
        Ok(())
    }

    /// Retries a failed seal, or gives up once its retries are exhausted.
    pub fn handle_failed_seal(&self, task: &Task) -> ManagerResult<()> {
        task.as_seal().ok_or(ManagerError::DanglingTask)?;
        if !self.queues.seal.has(task.key()) {
            warn!(task_key = %task.key(), "Failed seal task is no longer queued");
            return Err(ManagerError::CanceledTask);
        }
        let Some(mut exhausted) =
            self.requeue_failed(&self.queues.seal, task, "manager-handle-failed-seal-task-repush")?
        else {
            return Ok(());
        };
        warn!(task_key = %task.key(), retry = exhausted.retry(), "Seal retries exhausted");
        self.emit_outcome(outcome::CANCEL_SEAL, exhausted.create_time());
        exhausted.append_log("manager-cancel-seal-task");
        if let Some(object) = exhausted.object() {
            let meta = UploadObjectMeta::new(object.id, TaskState::SealObjectError)
                .with_error(EXCEED_RETRY_DESCRIPTION);
            self.persist_upload_outcome(&exhausted, meta);
        }
        Ok(())
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Handles a secondary's piece-receive confirmation.
    pub fn handle_receive(&self, task: Task) -> ManagerResult<()> {
        let sealed = task
            .as_receive()
            .ok_or(ManagerError::DanglingTask)?
            .sealed;
        object_and_params(&task)?;

        if sealed {
            self.queues.receive.pop_by_key(task.key());
            self.emit_outcome(outcome::SUCCEED_CONFIRM_RECEIVE, task.create_time());
            debug!(task_key = %task.key(), "Receive confirmed");
            return Ok(());
        }

        if task.error().is_some() {
            self.emit_outcome(outcome::FAILED_CONFIRM_RECEIVE, task.create_time());
            if let Some(exhausted) = self.requeue_failed(
                &self.queues.receive,
                &task,
                "manager-handle-failed-receive-task-repush",
            )? {
                warn!(task_key = %exhausted.key(), "Receive confirmation retries exhausted");
            }
            return Ok(());
        }

        let policy = self.config.tasks.receive;
        let mut task = task;
        task.set_retry(0);
        task.set_max_retry(policy.max_retry);
        task.set_timeout(policy.timeout);
        task.set_priority(policy.priority);
        task.set_update_time(now_unix());
        self.queues.receive.pop_by_key(task.key());
        self.queues.receive.push(task)?;
        self.refresh_backup();
        Ok(())
    }

    // =========================================================================
    // GC
    // =========================================================================

    /// Handles GC-object progress.
    ///
    /// Reports that move the cursor backwards are rejected and the queued
    /// task is kept.
    pub fn handle_gc_object(&self, task: Task) -> ManagerResult<()> {
        let gc = task
            .as_gc_object()
            .ok_or(ManagerError::DanglingTask)?
            .clone();
        let key = task.key().clone();
        if !self.queues.gc_object.has(&key) {
            warn!(task_key = %key, "GC object task is not queued");
            return Err(ManagerError::CanceledTask);
        }

        if gc.current_block > gc.end_block {
            info!(task_key = %key, end_block = gc.end_block, "GC object task finished");
            self.queues.gc_object.pop_by_key(&key);
            if let Err(e) = self.db.delete_gc_object_progress(key.as_str()) {
                error!(task_key = %key, error = %e, "Failed to delete gc object progress");
            }
            return Ok(());
        }

        let Some(old) = self.queues.gc_object.pop_by_key(&key) else {
            warn!(task_key = %key, "GC object task was canceled");
            return Err(ManagerError::CanceledTask);
        };
        let behind = old.as_gc_object().is_some_and(|o| {
            o.current_block > gc.current_block
                || (o.current_block == gc.current_block
                    && o.last_deleted_object_id > gc.last_deleted_object_id)
        });
        if behind {
            warn!(task_key = %key, reported = gc.current_block, "GC object report is behind");
            if let Err(e) = self.queues.gc_object.push(old) {
                error!(task_key = %key, error = %e, "Failed to restore gc object task");
            }
            return Err(ManagerError::CanceledTask);
        }

        let mut task = task;
        task.set_update_time(now_unix());
        if let Err(e) = self.queues.gc_object.push(task) {
            error!(task_key = %key, error = %e, "Failed to push gc object task");
        }
        let meta = GcObjectMeta {
            task_key: key.to_string(),
            current_block_height: gc.current_block,
            last_deleted_object_id: gc.last_deleted_object_id,
            ..Default::default()
        };
        if let Err(e) = self.db.update_gc_object_progress(&meta) {
            error!(task_key = %key, error = %e, "Failed to update gc object progress");
        }
        Ok(())
    }

    pub fn handle_gc_zombie(&self, _task: Task) -> ManagerResult<()> {
        Err(ManagerError::FutureSupport)
    }

    pub fn handle_gc_meta(&self, _task: Task) -> ManagerResult<()> {
        Err(ManagerError::FutureSupport)
    }

    // =========================================================================
    // Caches
    // =========================================================================

    /// Caches a served download. A full or repeated cache is not an error.
    pub fn handle_download(&self, task: Task) -> ManagerResult<()> {
        if let Err(e) = self.queues.download.push(task) {
            debug!(error = %e, "Download cache push skipped");
        }
        Ok(())
    }

    pub fn handle_challenge(&self, task: Task) -> ManagerResult<()> {
        if let Err(e) = self.queues.challenge.push(task) {
            debug!(error = %e, "Challenge cache push skipped");
        }
        Ok(())
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Handles a recover-piece report and feeds the segment outcome to the
    /// recovery monitors.
    pub fn handle_recover_piece(&self, task: Task) -> ManagerResult<()> {
        let recover = task
            .as_recover_piece()
            .ok_or(ManagerError::DanglingTask)?;
        let object = task.object().ok_or(ManagerError::DanglingTask)?;
        let (object_id, segment_idx, recovered) = (object.id, recover.segment_idx, recover.recovered);
        let queue = self.recovery.queue();

        if recovered {
            queue.pop_by_key(task.key());
            self.recovery.stats().add_segment(object_id, true, segment_idx);
            debug!(task_key = %task.key(), "Segment recovered");
            return Ok(());
        }

        if task.error().is_some() {
            if self
                .requeue_failed(queue, &task, "manager-handle-failed-recover-task-repush")?
                .is_some()
            {
                warn!(task_key = %task.key(), "Recover piece retries exhausted");
                self.recovery.stats().add_segment(object_id, false, segment_idx);
            }
            return Ok(());
        }

        if queue.has(task.key()) {
            return Err(ManagerError::RepeatedTask);
        }
        let mut task = task;
        task.set_update_time(now_unix());
        queue.push(task)?;
        Ok(())
    }

    // =========================================================================
    // Migration
    // =========================================================================

    /// Handles migrate-GVG progress and forwards it to the planner.
    pub fn handle_migrate_gvg(&self, task: Task) -> ManagerResult<()> {
        let migrate = task
            .as_migrate_gvg()
            .ok_or(ManagerError::DanglingTask)?;
        let (bucket_id, finished) = (migrate.bucket_id, migrate.finished);
        let planner = self.planner.as_ref().ok_or(ManagerError::NoScheduler)?;

        if bucket_id != 0 && !planner.has_bucket_plan(bucket_id) {
            info!(task_key = %task.key(), bucket_id, "No execute plan for bucket, canceling migration");
            self.queues.migrate_gvg.pop_by_key(task.key());
            return Err(ManagerError::CanceledTask);
        }

        {
            let _guard = self.migrate_lock.lock();
            self.queues.migrate_gvg.pop_by_key(task.key());
            if !finished {
                let mut queued = task.clone();
                queued.set_update_time(now_unix());
                self.queues.migrate_gvg.push(queued)?;
            }
        }
        planner.update_migrate_progress(&task)
    }

    /// Queues migrate-GVG tasks for a swap-out naming this provider as
    /// successor and registers them with the planner.
    pub async fn notify_migrate_swap_out(&self, notice: &SwapOutNotice) -> ManagerResult<()> {
        let planner = self.planner.as_ref().ok_or(ManagerError::NoScheduler)?;
        let self_sp = self.self_sp_id().unwrap_or_default();
        if notice.successor_sp_id != self_sp {
            return Err(ManagerError::InvalidSwapOut {
                successor: notice.successor_sp_id,
                self_sp,
            });
        }

        let mut sources = Vec::new();
        if notice.is_family() {
            let family = self.chain.query_virtual_group_family(notice.vgf_id).await?;
            sources.extend(family.gvg_ids.into_iter().map(|id| (id, -1)));
        } else {
            for &gvg_id in &notice.gvg_ids {
                let gvg = self.chain.query_global_virtual_group(gvg_id).await?;
                let Some(idx) = gvg.secondary_sp_ids.iter().position(|&id| id == notice.sp_id)
                else {
                    warn!(gvg_id, sp_id = notice.sp_id, "Swapped out provider is not a secondary of the group");
                    continue;
                };
                sources.push((gvg_id, idx as i32));
            }
        }

        let policy = self.config.tasks.migrate_gvg;
        let mut tasks = Vec::with_capacity(sources.len());
        for (src_gvg_id, redundancy_idx) in sources {
            let task = Task::new_migrate_gvg(src_gvg_id, 0, 0, redundancy_idx)
                .with_priority(policy.priority)
                .with_timeout(policy.timeout)
                .with_max_retry(policy.max_retry);
            match self.queues.migrate_gvg.push(task.clone()) {
                Ok(()) => tasks.push(task),
                Err(e @ crate::queue::QueueError::Repeated { .. }) => {
                    debug!(error = %e, "Migrate gvg task already queued");
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            sp_id = notice.sp_id,
            vgf_id = notice.vgf_id,
            tasks = tasks.len(),
            "Queued swap out migration"
        );
        planner.add_swap_out(notice, &tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::client::types::GlobalVirtualGroup;
    use crate::spdb::SpDb;
    use crate::task::TaskError;

    fn upload(id: u64) -> Task {
        Task::new_upload(object(id), params(), 1)
    }

    fn failed(task: Task) -> Task {
        task.with_error(TaskError::new("boom"))
    }

    /// Runs an object through upload into the replicate queue.
    async fn uploaded(f: &Fixture, id: u64) -> Task {
        f.manager.handle_create_upload(upload(id)).unwrap();
        f.manager.handle_done_upload(upload(id)).await.unwrap();
        f.manager.background().wait_idle().await;
        f.manager.queues.replicate.peek(upload(id).key()).unwrap()
    }

    #[tokio::test]
    async fn test_create_upload_caps_parallelism() {
        let mut config = config();
        config.max_upload_parallelism = 1;
        config.queues.upload = 2;
        let f = fixture_with(config, chain());

        f.manager.handle_create_upload(upload(1)).unwrap();
        assert_eq!(
            f.manager.handle_create_upload(upload(2)),
            Err(ManagerError::ExceedTask)
        );
        assert_eq!(f.manager.queues.upload.len(), 1);
        assert!(!f.manager.queues.upload.has(upload(2).key()));
    }

    #[tokio::test]
    async fn test_create_upload_rejects_repeat_and_dangling() {
        let f = fixture().await;
        f.manager.handle_create_upload(upload(1)).unwrap();
        assert_eq!(
            f.manager.handle_create_upload(upload(1)),
            Err(ManagerError::RepeatedTask)
        );
        assert_eq!(
            f.manager.handle_create_upload(Task::new_gc_meta()),
            Err(ManagerError::DanglingTask)
        );
        assert_eq!(
            f.db.get_upload_state(1).unwrap().task_state,
            TaskState::UploadObjectDoing
        );
    }

    #[tokio::test]
    async fn test_create_upload_keeps_task_on_db_error() {
        let f = fixture().await;
        f.db.insert_upload_progress(1).unwrap();
        let err = f.manager.handle_create_upload(upload(1)).unwrap_err();
        assert_eq!(err.code(), crate::error::CODE_DB);
        assert!(f.manager.queues.upload.has(upload(1).key()));
    }

    #[tokio::test]
    async fn test_resumable_upload_tolerates_existing_progress() {
        let f = fixture().await;
        f.db.insert_upload_progress(1).unwrap();
        let task = Task::new_resumable_upload(object(1), params(), 1, 0, false);
        f.manager.handle_create_resumable_upload(task.clone()).unwrap();
        f.manager.handle_done_resumable_upload(task).await.unwrap();
        assert_eq!(f.manager.uploading_count(), 0);

        let done = Task::new_resumable_upload(object(1), params(), 1, 512, true);
        f.manager.handle_done_resumable_upload(done).await.unwrap();
        assert_eq!(f.manager.queues.replicate.len(), 1);
    }

    #[tokio::test]
    async fn test_done_upload_queues_replicate() {
        let f = fixture().await;
        let replicate = uploaded(&f, 1).await;

        assert!(f.manager.queues.upload.is_empty());
        let payload = replicate.as_replicate().unwrap();
        assert_eq!(payload.gvg_id, 11);
        assert_eq!(
            payload.secondary_endpoints,
            vec!["https://sp2", "https://sp3", "https://sp4"]
        );
        assert!(replicate.header.logs.ends_with("manager-create-replicate-task"));
        assert_eq!(replicate.max_retry(), f.manager.config().tasks.replicate.max_retry);

        let state = f.db.get_upload_state(1).unwrap();
        assert_eq!(state.task_state, TaskState::ReplicateObjectDoing);
        assert_eq!(state.gvg_id, 11);
        assert_eq!(f.metrics.outcome_count(outcome::SUCCEED_UPLOAD), 1);
    }

    #[tokio::test]
    async fn test_done_upload_with_error_records_state() {
        let f = fixture().await;
        f.manager.handle_create_upload(upload(1)).unwrap();
        f.manager.handle_done_upload(failed(upload(1))).await.unwrap();
        f.manager.background().wait_idle().await;

        assert_eq!(f.manager.uploading_count(), 0);
        let state = f.db.get_upload_state(1).unwrap();
        assert_eq!(state.task_state, TaskState::UploadObjectError);
        assert!(state.error_description.contains("boom"));
        assert_eq!(f.metrics.outcome_count(outcome::FAILED_UPLOAD), 1);
    }

    #[tokio::test]
    async fn test_replicate_success_queues_seal() {
        let f = fixture().await;
        let mut replicate = uploaded(&f, 1).await;
        if let Some(r) = replicate.as_replicate_mut() {
            r.secondary_addresses = vec!["0xsp2".into(), "0xsp3".into(), "0xsp4".into()];
            r.secondary_signatures = vec![vec![1], vec![2], vec![3]];
        }
        f.manager.handle_replicate(replicate).unwrap();
        f.manager.background().wait_idle().await;

        assert!(f.manager.queues.replicate.is_empty());
        let seal = f.manager.queues.seal.peek(upload(1).key()).unwrap();
        let payload = seal.as_seal().unwrap();
        assert_eq!(payload.gvg_id, 11);
        assert_eq!(payload.secondary_signatures.len(), 3);
        assert_eq!(
            f.db.get_upload_state(1).unwrap().task_state,
            TaskState::SealObjectDoing
        );
        assert_eq!(f.metrics.outcome_count(outcome::FAILED_REPLICATE_AND_SEAL), 1);
    }

    #[tokio::test]
    async fn test_replicate_and_seal_finishes_object() {
        let f = fixture().await;
        let mut replicate = uploaded(&f, 1).await;
        replicate.as_replicate_mut().unwrap().sealed = true;
        f.manager.handle_replicate(replicate).unwrap();
        f.manager.background().wait_idle().await;

        assert_eq!(f.manager.uploading_count(), 0);
        assert_eq!(
            f.db.get_upload_state(1).unwrap().task_state,
            TaskState::SealObjectDone
        );
        assert_eq!(f.db.put_events(1).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_replicate_requeues_until_exhausted() {
        let f = fixture().await;
        let replicate = uploaded(&f, 1).await;

        f.manager
            .handle_failed_replicate(failed(replicate.clone()))
            .await
            .unwrap();
        let requeued = f.manager.queues.replicate.peek(replicate.key()).unwrap();
        assert!(requeued.header.logs.ends_with("repush"));

        let mut exhausted = f.manager.queues.replicate.pop_by_key(replicate.key()).unwrap();
        exhausted.set_retry(exhausted.max_retry() + 1);
        f.manager.queues.replicate.push(exhausted).unwrap();
        f.manager
            .handle_failed_replicate(failed(replicate.clone()))
            .await
            .unwrap();
        f.manager.background().wait_idle().await;

        assert!(f.manager.queues.replicate.is_empty());
        let state = f.db.get_upload_state(1).unwrap();
        assert_eq!(state.task_state, TaskState::ReplicateObjectError);
        assert_eq!(state.error_description, EXCEED_RETRY_DESCRIPTION);
        assert_eq!(f.metrics.outcome_count(outcome::CANCEL_REPLICATE), 1);
    }

    #[tokio::test]
    async fn test_failed_replicate_for_unknown_task_is_canceled() {
        let f = fixture().await;
        let replicate = Task::new_replicate(object(9), params(), 11);
        assert_eq!(
            f.manager.handle_failed_replicate(failed(replicate)).await,
            Err(ManagerError::CanceledTask)
        );
    }

    #[tokio::test]
    async fn test_replicate_error_is_handled_in_background() {
        let f = fixture().await;
        let replicate = uploaded(&f, 1).await;
        f.manager.handle_replicate(failed(replicate.clone())).unwrap();
        f.manager.background().wait_idle().await;

        assert!(f.manager.queues.replicate.has(replicate.key()));
        assert_eq!(f.metrics.outcome_count(outcome::FAILED_REPLICATE), 1);
    }

    #[tokio::test]
    async fn test_unavailable_secondary_is_frozen() {
        let f = fixture().await;
        let mut replicate = uploaded(&f, 1).await;
        replicate.as_replicate_mut().unwrap().not_available_sp_idx = 0;

        f.manager
            .handle_failed_replicate(failed(replicate))
            .await
            .unwrap();

        assert!(f.manager.vgm().freeze_pool().is_frozen(2));
        let moved = f.manager.queues.replicate.peek(upload(1).key()).unwrap();
        let payload = moved.as_replicate().unwrap();
        assert_ne!(payload.gvg_id, 11);
        let created = f.chain.created_gvgs();
        assert_eq!(created.len(), 1);
        assert!(!created[0].secondary_sp_ids.contains(&2));
    }

    #[tokio::test]
    async fn test_seal_success_finishes_object() {
        let f = fixture().await;
        let replicate = uploaded(&f, 1).await;
        f.manager.handle_replicate(replicate).unwrap();
        f.manager.background().wait_idle().await;
        let seal = f.manager.queues.seal.peek(upload(1).key()).unwrap();

        f.manager.handle_seal(seal).unwrap();
        f.manager.background().wait_idle().await;

        assert!(f.manager.queues.seal.is_empty());
        assert_eq!(
            f.db.get_upload_state(1).unwrap().task_state,
            TaskState::SealObjectDone
        );
        assert_eq!(f.metrics.outcome_count(outcome::SUCCEED_SEAL), 1);
    }

    #[tokio::test]
    async fn test_seal_failure_exhausts_retries() {
        let f = fixture().await;
        let replicate = uploaded(&f, 1).await;
        f.manager.handle_replicate(replicate).unwrap();
        f.manager.background().wait_idle().await;
        let mut seal = f.manager.queues.seal.pop_by_key(upload(1).key()).unwrap();
        seal.set_retry(seal.max_retry() + 1);
        f.manager.queues.seal.push(seal.clone()).unwrap();

        f.manager.handle_seal(failed(seal)).unwrap();
        f.manager.background().wait_idle().await;

        assert!(f.manager.queues.seal.is_empty());
        assert_eq!(
            f.db.get_upload_state(1).unwrap().task_state,
            TaskState::SealObjectError
        );
        assert_eq!(f.metrics.outcome_count(outcome::CANCEL_SEAL), 1);
        assert_eq!(f.metrics.outcome_count(outcome::FAILED_SEAL), 1);
    }

    #[tokio::test]
    async fn test_receive_paths() {
        let f = fixture().await;
        let receive = Task::new_receive(object(1), params(), 0, -1, 1024).with_max_retry(0);

        f.manager.handle_receive(receive.clone()).unwrap();
        let queued = f.manager.queues.receive.peek(receive.key()).unwrap();
        assert_eq!(queued.retry(), 0);
        assert_eq!(queued.max_retry(), f.manager.config().tasks.receive.max_retry);

        f.manager.handle_receive(failed(receive.clone())).unwrap();
        assert!(f.manager.queues.receive.has(receive.key()));

        let mut sealed = receive.clone();
        if let crate::task::TaskPayload::ReceivePiece(p) = &mut sealed.payload {
            p.sealed = true;
        }
        f.manager.handle_receive(sealed).unwrap();
        assert!(f.manager.queues.receive.is_empty());

        assert_eq!(
            f.manager.handle_receive(failed(receive)),
            Err(ManagerError::CanceledTask)
        );
    }

    #[tokio::test]
    async fn test_gc_object_progress() {
        let f = fixture().await;
        let task = Task::new_gc_object(100, 600);
        let key = task.key().to_string();
        f.db.set_gc_object_progress(&key, 100, 600).unwrap();
        f.manager.queues.gc_object.push(task.clone()).unwrap();

        let mut report = task.clone();
        report.as_gc_object_mut().unwrap().current_block = 300;
        report.as_gc_object_mut().unwrap().last_deleted_object_id = 7;
        f.manager.handle_gc_object(report.clone()).unwrap();
        let row = &f.db.get_gc_metas_to_gc(10).unwrap()[0];
        assert_eq!(row.current_block_height, 300);
        assert_eq!(row.last_deleted_object_id, 7);

        let mut behind = task.clone();
        behind.as_gc_object_mut().unwrap().current_block = 200;
        assert_eq!(
            f.manager.handle_gc_object(behind),
            Err(ManagerError::CanceledTask)
        );
        let kept = f.manager.queues.gc_object.peek(task.key()).unwrap();
        assert_eq!(kept.as_gc_object().unwrap().current_block, 300);

        let mut done = task.clone();
        done.as_gc_object_mut().unwrap().current_block = 601;
        f.manager.handle_gc_object(done.clone()).unwrap();
        assert!(f.manager.queues.gc_object.is_empty());
        assert!(f.db.get_gc_metas_to_gc(10).unwrap().is_empty());

        assert_eq!(
            f.manager.handle_gc_object(done),
            Err(ManagerError::CanceledTask)
        );
    }

    #[tokio::test]
    async fn test_unsupported_gc_and_caches() {
        let f = fixture().await;
        assert_eq!(
            f.manager.handle_gc_zombie(Task::new_gc_zombie(1, 2)),
            Err(ManagerError::FutureSupport)
        );
        assert_eq!(
            f.manager.handle_gc_meta(Task::new_gc_meta()),
            Err(ManagerError::FutureSupport)
        );

        let download = Task::new_download(object(1), params(), "0xuser", 0, 10);
        f.manager.handle_download(download.clone()).unwrap();
        f.manager.handle_download(download).unwrap();
        assert_eq!(f.manager.queues.download.len(), 1);

        let challenge = Task::new_challenge(object(1), params(), "0xuser", 0, -1);
        f.manager.handle_challenge(challenge).unwrap();
        assert_eq!(f.manager.queues.challenge.len(), 1);
    }

    #[tokio::test]
    async fn test_recover_piece_reports() {
        let f = fixture().await;
        let stats = f.manager.recovery().stats();
        stats.put(1, 2);
        let task = Task::new_recover_piece(object(1), params(), 11, 0, -1).with_timeout(600);

        f.manager.handle_recover_piece(task.clone()).unwrap();
        assert_eq!(
            f.manager.handle_recover_piece(task.clone()),
            Err(ManagerError::RepeatedTask)
        );

        let mut recovered = task.clone();
        recovered.as_recover_piece_mut().unwrap().recovered = true;
        f.manager.handle_recover_piece(recovered).unwrap();
        assert!(f.manager.recovery().queue().is_empty());

        let other = Task::new_recover_piece(object(1), params(), 11, 1, -1)
            .with_timeout(600)
            .with_max_retry(0);
        let mut queued = other.clone();
        queued.set_retry(1);
        f.manager.recovery().queue().push(queued).unwrap();
        f.manager.handle_recover_piece(failed(other)).unwrap();

        assert!(stats.is_processed(1));
        assert!(stats.is_recover_failed(1));
    }

    #[tokio::test]
    async fn test_migrate_gvg_progress() {
        let f = fixture().await;
        let mut task = Task::new_migrate_gvg(11, 12, 0, -1);
        task.as_migrate_gvg_mut().unwrap().last_migrated_object_id = 5;
        f.manager.handle_migrate_gvg(task.clone()).unwrap();
        assert!(f.manager.queues.migrate_gvg.has(task.key()));
        assert_eq!(
            f.planner.progress(11, 0, -1).unwrap().last_migrated_object_id,
            5
        );

        task.as_migrate_gvg_mut().unwrap().finished = true;
        f.manager.handle_migrate_gvg(task.clone()).unwrap();
        assert!(f.manager.queues.migrate_gvg.is_empty());

        let bucket = Task::new_migrate_gvg(11, 12, 7, -1);
        assert_eq!(
            f.manager.handle_migrate_gvg(bucket.clone()),
            Err(ManagerError::CanceledTask)
        );
        f.planner.add_bucket_plan(7);
        f.manager.handle_migrate_gvg(bucket).unwrap();
    }

    #[tokio::test]
    async fn test_swap_out_requires_self_as_successor() {
        let f = fixture().await;
        let notice = SwapOutNotice {
            sp_id: 2,
            successor_sp_id: 5,
            vgf_id: 0,
            gvg_ids: vec![11],
        };
        assert_eq!(
            f.manager.notify_migrate_swap_out(&notice).await,
            Err(ManagerError::InvalidSwapOut {
                successor: 5,
                self_sp: 1
            })
        );

        let notice = SwapOutNotice {
            successor_sp_id: 1,
            ..notice
        };
        f.manager.notify_migrate_swap_out(&notice).await.unwrap();
        let queued = f.manager.query_tasks("MigrateGVG");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].as_migrate_gvg().unwrap().redundancy_idx, 0);
        assert_eq!(f.planner.swap_outs(), vec![notice]);
        assert!(f.planner.progress(11, 0, 0).is_some());
    }

    #[tokio::test]
    async fn test_migration_without_planner() {
        let chain = chain();
        let manager = Manager::builder(config())
            .chain(chain.clone())
            .meta(chain)
            .db(Arc::new(crate::spdb::MemorySpDb::new()))
            .build()
            .unwrap();
        assert_eq!(
            manager.handle_migrate_gvg(Task::new_migrate_gvg(1, 2, 0, -1)),
            Err(ManagerError::NoScheduler)
        );
        let notice = SwapOutNotice::default();
        assert_eq!(
            manager.notify_migrate_swap_out(&notice).await,
            Err(ManagerError::NoScheduler)
        );
    }

    #[tokio::test]
    async fn test_family_swap_out_queues_every_group() {
        let f = fixture().await;
        f.chain.add_gvg(GlobalVirtualGroup {
            id: 12,
            family_id: 1,
            primary_sp_id: 1,
            secondary_sp_ids: vec![5, 6, 7],
            stored_size: 0,
            total_deposit: 100,
        });
        let notice = SwapOutNotice {
            sp_id: 3,
            successor_sp_id: 1,
            vgf_id: 1,
            gvg_ids: vec![],
        };
        f.manager.notify_migrate_swap_out(&notice).await.unwrap();
        assert_eq!(f.manager.queues.migrate_gvg.len(), 2);
        assert!(f.planner.progress(12, 0, -1).is_some());
    }
}
