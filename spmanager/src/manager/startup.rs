//! Restoring queues from persisted progress at startup.

use super::Manager;
use crate::client::types::{ObjectInfo, ObjectStatus, StorageParams};
use crate::error::ManagerResult;
use crate::queue::Queue;
use crate::spdb::{UploadCursor, UploadObjectMeta};
use crate::task::{Task, TaskKey};
use tracing::{info, warn};

impl Manager {
    /// Re-queues replicate, seal and GC-object work found in the database.
    ///
    /// Rows whose object is gone or no longer in created status are skipped.
    /// The GC cursor moves past every restored range.
    pub async fn load_tasks_from_db(&self) -> ManagerResult<()> {
        let replicate_rows = self
            .db
            .get_upload_metas_to_replicate_by_start_ts(
                self.config.load_replicate_limit,
                UploadCursor::after_ts(0),
            )?;
        let seal_rows = self.db.get_upload_metas_to_seal_by_start_ts(
            self.config.load_seal_limit,
            UploadCursor::after_ts(0),
        )?;
        let gc_rows = self.db.get_gc_metas_to_gc(self.queues.gc_object.cap())?;

        let mut replicate_loaded = 0;
        for row in &replicate_rows {
            let Some((object, params)) = self.loadable_object(row).await else {
                continue;
            };
            let policy = self.config.tasks.replicate;
            let mut task = Task::new_replicate(object, params, row.gvg_id)
                .with_priority(policy.priority)
                .with_timeout(policy.timeout)
                .with_max_retry(policy.max_retry);
            if let Some(replicate) = task.as_replicate_mut() {
                replicate.secondary_endpoints = row.secondary_endpoints.clone();
                replicate.secondary_signatures = row.secondary_signatures.clone();
            }
            match self.queues.replicate.push(task) {
                Ok(()) => replicate_loaded += 1,
                Err(e) => warn!(object_id = row.object_id, error = %e, "Failed to load replicate task"),
            }
        }

        let mut seal_loaded = 0;
        for row in &seal_rows {
            let Some((object, params)) = self.loadable_object(row).await else {
                continue;
            };
            let policy = self.config.tasks.seal;
            let task = Task::new_seal(
                object,
                params,
                row.gvg_id,
                row.secondary_endpoints.clone(),
                row.secondary_signatures.clone(),
            )
            .with_priority(policy.priority)
            .with_timeout(policy.timeout)
            .with_max_retry(policy.max_retry);
            match self.queues.seal.push(task) {
                Ok(()) => seal_loaded += 1,
                Err(e) => warn!(object_id = row.object_id, error = %e, "Failed to load seal task"),
            }
        }

        let mut gc_loaded = 0;
        for row in &gc_rows {
            let policy = self.config.tasks.gc_object;
            let mut task = Task::new_gc_object(row.start_block_height, row.end_block_height)
                .with_priority(policy.priority)
                .with_timeout(policy.timeout)
                .with_max_retry(policy.max_retry);
            task.header.key = TaskKey::new(row.task_key.clone());
            if let Some(gc) = task.as_gc_object_mut() {
                gc.current_block = row.current_block_height;
                gc.last_deleted_object_id = row.last_deleted_object_id;
            }
            match self.queues.gc_object.push(task) {
                Ok(()) => gc_loaded += 1,
                Err(e) => warn!(task_key = %row.task_key, error = %e, "Failed to load gc object task"),
            }
            self.advance_gc_block_height(row.end_block_height + 1);
        }

        self.refresh_backup();
        info!(
            replicate = replicate_loaded,
            seal = seal_loaded,
            gc_object = gc_loaded,
            gc_block_height = self.gc_block_height(),
            "Loaded tasks from database"
        );
        Ok(())
    }

    async fn loadable_object(&self, row: &UploadObjectMeta) -> Option<(ObjectInfo, StorageParams)> {
        let object = match self.chain.query_object_info_by_id(row.object_id).await {
            Ok(object) => object,
            Err(e) => {
                warn!(object_id = row.object_id, error = %e, "Skipping row, object not found");
                return None;
            }
        };
        if object.status != ObjectStatus::Created {
            warn!(object_id = row.object_id, status = ?object.status, "Skipping row, object not in created status");
            return None;
        }
        match self
            .chain
            .query_storage_params_by_timestamp(object.create_at)
            .await
        {
            Ok(params) => Some((object, params)),
            Err(e) => {
                warn!(object_id = row.object_id, error = %e, "Skipping row, storage params unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::spdb::{SpDb, TaskState};

    fn created(id: u64) -> ObjectInfo {
        ObjectInfo {
            status: ObjectStatus::Created,
            ..object(id)
        }
    }

    fn progress(f: &Fixture, id: u64, state: TaskState) {
        f.db.insert_upload_progress(id).unwrap();
        let mut meta = UploadObjectMeta::new(id, state);
        meta.gvg_id = 11;
        meta.secondary_endpoints = vec!["https://sp2".into(), "https://sp3".into()];
        meta.secondary_signatures = vec![vec![1], vec![2]];
        f.db.update_upload_progress(&meta).unwrap();
    }

    #[tokio::test]
    async fn test_load_restores_pipeline_and_gc() {
        let f = fixture().await;
        f.chain.add_object(created(1));
        f.chain.add_object(created(2));
        f.chain.add_object(ObjectInfo {
            status: ObjectStatus::Sealed,
            ..object(3)
        });
        progress(&f, 1, TaskState::ReplicateObjectDoing);
        progress(&f, 2, TaskState::SealObjectDoing);
        progress(&f, 3, TaskState::ReplicateObjectError);
        progress(&f, 4, TaskState::ReplicateObjectDoing);
        f.db.set_gc_object_progress("gc-a", 100, 600).unwrap();
        f.db.update_gc_object_progress(&crate::spdb::GcObjectMeta {
            task_key: "gc-a".into(),
            current_block_height: 250,
            last_deleted_object_id: 9,
            ..Default::default()
        })
        .unwrap();

        f.manager.load_tasks_from_db().await.unwrap();

        let replicate = f.manager.queues.replicate.peek(Task::new_upload(object(1), params(), 0).key()).unwrap();
        let payload = replicate.as_replicate().unwrap();
        assert_eq!(payload.gvg_id, 11);
        assert_eq!(payload.secondary_signatures, vec![vec![1], vec![2]]);
        assert_eq!(f.manager.queues.replicate.len(), 1);

        let seal = f.manager.queues.seal.peek(Task::new_upload(object(2), params(), 0).key()).unwrap();
        assert_eq!(
            seal.as_seal().unwrap().secondary_addresses,
            vec!["https://sp2", "https://sp3"]
        );

        let gc = f.manager.queues.gc_object.peek(&TaskKey::new("gc-a")).unwrap();
        assert_eq!(gc.as_gc_object().unwrap().current_block, 250);
        assert_eq!(gc.as_gc_object().unwrap().last_deleted_object_id, 9);
        assert_eq!(f.manager.gc_block_height(), 601);
    }

    #[tokio::test]
    async fn test_load_with_empty_database() {
        let f = fixture().await;
        f.manager.load_tasks_from_db().await.unwrap();
        assert_eq!(f.manager.uploading_count(), 0);
        assert_eq!(f.manager.gc_block_height(), 0);
    }
}
