//! Task model.
//!
//! A [`Task`] is a common [`TaskHeader`] plus a kind-specific
//! [`TaskPayload`]. Queues store tasks by value; handing a task out of a
//! queue transfers ownership to the caller.
//!
//! # Example
//!
//! ```
//! use spmanager::client::types::{ObjectInfo, StorageParams};
//! use spmanager::task::{Task, TaskKind};
//!
//! let object = ObjectInfo {
//!     id: 7,
//!     bucket_name: "photos".into(),
//!     object_name: "cat.jpg".into(),
//!     payload_size: 1024,
//!     ..Default::default()
//! };
//! let task = Task::new_upload(object, StorageParams::default(), 1).with_timeout(300);
//!
//! assert_eq!(task.kind(), TaskKind::UploadObject);
//! assert_eq!(task.key().as_str(), "Uploading-bucket:photos-object:cat.jpg-id:7");
//! ```

mod header;
pub mod key;
mod payload;

pub use header::{
    TaskError, TaskHeader, TaskPriority, DEFAULT_LARGER_PRIORITY, DEFAULT_SMALLER_PRIORITY,
    MAX_TASK_PRIORITY, UNSCHEDULING_PRIORITY,
};
pub use key::TaskKey;
pub use payload::{
    ApprovalCreateBucket, ApprovalCreateObject, ChallengePiece, DownloadObject, GcMeta, GcObject,
    GcZombiePiece, MigrateGvg, ReceivePiece, RecoverPiece, ReplicatePiece, ResumableUploadObject,
    SealObject, UploadObject,
};

use crate::client::types::{ObjectInfo, StorageParams};
use crate::resource::ResourceBudget;
use crate::time::now_unix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory charged per task for kinds without a payload-derived estimate.
const BASE_TASK_MEMORY: u64 = 1 << 20;

/// Memory charged per migrate-gvg task.
const MIGRATE_TASK_MEMORY: u64 = 16 << 20;

// =============================================================================
// Task Kind
// =============================================================================

/// Discriminant of a [`Task`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    UploadObject,
    ResumableUploadObject,
    ReplicatePiece,
    SealObject,
    ReceivePiece,
    GcObject,
    GcZombiePiece,
    GcMeta,
    DownloadObject,
    ChallengePiece,
    RecoverPiece,
    MigrateGvg,
    ApprovalCreateObject,
    ApprovalCreateBucket,
}

impl TaskKind {
    /// Short stable name used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadObject => "upload_object",
            Self::ResumableUploadObject => "resumable_upload_object",
            Self::ReplicatePiece => "replicate_piece",
            Self::SealObject => "seal_object",
            Self::ReceivePiece => "receive_piece",
            Self::GcObject => "gc_object",
            Self::GcZombiePiece => "gc_zombie_piece",
            Self::GcMeta => "gc_meta",
            Self::DownloadObject => "download_object",
            Self::ChallengePiece => "challenge_piece",
            Self::RecoverPiece => "recover_piece",
            Self::MigrateGvg => "migrate_gvg",
            Self::ApprovalCreateObject => "approval_create_object",
            Self::ApprovalCreateBucket => "approval_create_bucket",
        }
    }

    /// True for kinds that are stored in limit-aware queues.
    pub fn is_limit_aware(&self) -> bool {
        matches!(
            self,
            Self::ReplicatePiece
                | Self::SealObject
                | Self::ReceivePiece
                | Self::GcObject
                | Self::GcZombiePiece
                | Self::GcMeta
                | Self::RecoverPiece
                | Self::MigrateGvg
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Task
// =============================================================================

/// Kind-specific part of a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPayload {
    UploadObject(UploadObject),
    ResumableUploadObject(ResumableUploadObject),
    ReplicatePiece(ReplicatePiece),
    SealObject(SealObject),
    ReceivePiece(ReceivePiece),
    GcObject(GcObject),
    GcZombiePiece(GcZombiePiece),
    GcMeta(GcMeta),
    DownloadObject(DownloadObject),
    ChallengePiece(ChallengePiece),
    RecoverPiece(RecoverPiece),
    MigrateGvg(MigrateGvg),
    ApprovalCreateObject(ApprovalCreateObject),
    ApprovalCreateBucket(ApprovalCreateBucket),
}

/// A unit of work: common header plus kind-specific payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub header: TaskHeader,
    pub payload: TaskPayload,
}

fn object_key(object: &ObjectInfo) -> TaskKey {
    key::uploading_key(&object.bucket_name, &object.object_name, object.id)
}

impl Task {
    /// Creates a task from its parts.
    pub fn new(header: TaskHeader, payload: TaskPayload) -> Self {
        Self { header, payload }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn new_upload(object: ObjectInfo, params: StorageParams, vgf_id: u32) -> Self {
        let header = TaskHeader::new(object_key(&object), MAX_TASK_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::UploadObject(UploadObject {
                object: Some(object),
                params: Some(params),
                vgf_id,
            }),
        )
    }

    pub fn new_resumable_upload(
        object: ObjectInfo,
        params: StorageParams,
        vgf_id: u32,
        offset: u64,
        completed: bool,
    ) -> Self {
        let key = key::resumable_uploading_key(
            &object.bucket_name,
            &object.object_name,
            object.id,
            offset,
        );
        let header = TaskHeader::new(key, MAX_TASK_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::ResumableUploadObject(ResumableUploadObject {
                object: Some(object),
                params: Some(params),
                vgf_id,
                offset,
                completed,
            }),
        )
    }

    pub fn new_replicate(object: ObjectInfo, params: StorageParams, gvg_id: u32) -> Self {
        let header = TaskHeader::new(object_key(&object), DEFAULT_LARGER_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::ReplicatePiece(ReplicatePiece {
                object: Some(object),
                params: Some(params),
                gvg_id,
                not_available_sp_idx: -1,
                ..Default::default()
            }),
        )
    }

    pub fn new_seal(
        object: ObjectInfo,
        params: StorageParams,
        gvg_id: u32,
        secondary_addresses: Vec<String>,
        secondary_signatures: Vec<Vec<u8>>,
    ) -> Self {
        let header = TaskHeader::new(object_key(&object), DEFAULT_LARGER_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::SealObject(SealObject {
                object: Some(object),
                params: Some(params),
                gvg_id,
                secondary_addresses,
                secondary_signatures,
            }),
        )
    }

    pub fn new_receive(
        object: ObjectInfo,
        params: StorageParams,
        replicate_idx: u32,
        piece_idx: i32,
        piece_size: u64,
    ) -> Self {
        let key = key::receive_piece_key(
            &object.bucket_name,
            &object.object_name,
            object.id,
            replicate_idx,
            piece_idx,
        );
        let header = TaskHeader::new(key, DEFAULT_LARGER_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::ReceivePiece(ReceivePiece {
                gvg_id: object.gvg_id,
                object: Some(object),
                params: Some(params),
                replicate_idx,
                piece_idx,
                piece_size,
                sealed: false,
            }),
        )
    }

    pub fn new_gc_object(start_block: u64, end_block: u64) -> Self {
        let header = TaskHeader::new(
            key::gc_object_key(start_block, end_block, now_unix()),
            DEFAULT_LARGER_PRIORITY,
            0,
            0,
        );
        Self::new(
            header,
            TaskPayload::GcObject(GcObject {
                start_block,
                end_block,
                current_block: start_block,
                last_deleted_object_id: 0,
            }),
        )
    }

    pub fn new_gc_zombie(start_object_id: u64, end_object_id: u64) -> Self {
        let header = TaskHeader::new(
            key::gc_zombie_piece_key(now_unix()),
            DEFAULT_LARGER_PRIORITY,
            0,
            0,
        );
        Self::new(
            header,
            TaskPayload::GcZombiePiece(GcZombiePiece {
                start_object_id,
                end_object_id,
            }),
        )
    }

    pub fn new_gc_meta() -> Self {
        let header = TaskHeader::new(key::gc_meta_key(now_unix()), DEFAULT_LARGER_PRIORITY, 0, 0);
        Self::new(header, TaskPayload::GcMeta(GcMeta::default()))
    }

    pub fn new_download(
        object: ObjectInfo,
        params: StorageParams,
        user_address: impl Into<String>,
        low: u64,
        high: u64,
    ) -> Self {
        let key = key::download_object_key(
            &object.bucket_name,
            &object.object_name,
            object.id,
            low,
            high,
        );
        let header = TaskHeader::new(key, MAX_TASK_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::DownloadObject(DownloadObject {
                object: Some(object),
                params: Some(params),
                user_address: user_address.into(),
                low,
                high,
            }),
        )
    }

    pub fn new_challenge(
        object: ObjectInfo,
        params: StorageParams,
        user_address: impl Into<String>,
        segment_idx: u32,
        redundancy_idx: i32,
    ) -> Self {
        let user_address = user_address.into();
        let key = key::challenge_piece_key(
            &object.bucket_name,
            &object.object_name,
            object.id,
            segment_idx,
            redundancy_idx,
            &user_address,
        );
        let header = TaskHeader::new(key, MAX_TASK_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::ChallengePiece(ChallengePiece {
                object: Some(object),
                params: Some(params),
                user_address,
                segment_idx,
                redundancy_idx,
            }),
        )
    }

    pub fn new_recover_piece(
        object: ObjectInfo,
        params: StorageParams,
        gvg_id: u32,
        segment_idx: u32,
        redundancy_idx: i32,
    ) -> Self {
        let key = key::recover_piece_key(
            &object.bucket_name,
            &object.object_name,
            object.id,
            segment_idx,
            redundancy_idx,
        );
        let header = TaskHeader::new(key, DEFAULT_SMALLER_PRIORITY, 0, 0);
        Self::new(
            header,
            TaskPayload::RecoverPiece(RecoverPiece {
                object: Some(object),
                params: Some(params),
                gvg_id,
                segment_idx,
                redundancy_idx,
                by_successor_sp: false,
                recovered: false,
            }),
        )
    }

    pub fn new_migrate_gvg(
        src_gvg_id: u32,
        dest_gvg_id: u32,
        bucket_id: u64,
        redundancy_idx: i32,
    ) -> Self {
        let header = TaskHeader::new(
            key::migrate_gvg_key(src_gvg_id, bucket_id, redundancy_idx),
            DEFAULT_SMALLER_PRIORITY,
            0,
            0,
        );
        Self::new(
            header,
            TaskPayload::MigrateGvg(MigrateGvg {
                src_gvg_id,
                dest_gvg_id,
                bucket_id,
                redundancy_idx,
                last_migrated_object_id: 0,
                finished: false,
            }),
        )
    }

    pub fn new_approval_create_bucket(bucket_name: &str, account: &str, vgf_id: u32) -> Self {
        let header = TaskHeader::new(
            key::create_bucket_approval_key(bucket_name, account),
            MAX_TASK_PRIORITY,
            0,
            0,
        );
        Self::new(
            header,
            TaskPayload::ApprovalCreateBucket(ApprovalCreateBucket {
                bucket_name: bucket_name.to_string(),
                account: account.to_string(),
                vgf_id,
                expired_height: 0,
            }),
        )
    }

    pub fn new_approval_create_object(bucket_name: &str, object_name: &str, account: &str) -> Self {
        let header = TaskHeader::new(
            key::create_object_approval_key(bucket_name, object_name, account),
            MAX_TASK_PRIORITY,
            0,
            0,
        );
        Self::new(
            header,
            TaskPayload::ApprovalCreateObject(ApprovalCreateObject {
                bucket_name: bucket_name.to_string(),
                object_name: object_name.to_string(),
                account: account.to_string(),
                expired_height: 0,
            }),
        )
    }

    // =========================================================================
    // Builder-style policy setters
    // =========================================================================

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.header.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: i64) -> Self {
        self.header.timeout = timeout;
        self
    }

    pub fn with_max_retry(mut self, max_retry: i64) -> Self {
        self.header.max_retry = max_retry;
        self
    }

    pub fn with_error(mut self, error: TaskError) -> Self {
        self.header.error = Some(error);
        self
    }

    // =========================================================================
    // Header accessors
    // =========================================================================

    pub fn kind(&self) -> TaskKind {
        match &self.payload {
            TaskPayload::UploadObject(_) => TaskKind::UploadObject,
            TaskPayload::ResumableUploadObject(_) => TaskKind::ResumableUploadObject,
            TaskPayload::ReplicatePiece(_) => TaskKind::ReplicatePiece,
            TaskPayload::SealObject(_) => TaskKind::SealObject,
            TaskPayload::ReceivePiece(_) => TaskKind::ReceivePiece,
            TaskPayload::GcObject(_) => TaskKind::GcObject,
            TaskPayload::GcZombiePiece(_) => TaskKind::GcZombiePiece,
            TaskPayload::GcMeta(_) => TaskKind::GcMeta,
            TaskPayload::DownloadObject(_) => TaskKind::DownloadObject,
            TaskPayload::ChallengePiece(_) => TaskKind::ChallengePiece,
            TaskPayload::RecoverPiece(_) => TaskKind::RecoverPiece,
            TaskPayload::MigrateGvg(_) => TaskKind::MigrateGvg,
            TaskPayload::ApprovalCreateObject(_) => TaskKind::ApprovalCreateObject,
            TaskPayload::ApprovalCreateBucket(_) => TaskKind::ApprovalCreateBucket,
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.header.key
    }

    pub fn priority(&self) -> TaskPriority {
        self.header.priority
    }

    pub fn create_time(&self) -> i64 {
        self.header.create_time
    }

    pub fn update_time(&self) -> i64 {
        self.header.update_time
    }

    pub fn retry(&self) -> i64 {
        self.header.retry
    }

    pub fn max_retry(&self) -> i64 {
        self.header.max_retry
    }

    pub fn timeout(&self) -> i64 {
        self.header.timeout
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.header.error.as_ref()
    }

    pub fn exceed_retry(&self) -> bool {
        self.header.exceed_retry()
    }

    pub fn exceed_timeout(&self) -> bool {
        self.header.exceed_timeout()
    }

    pub fn expired(&self) -> bool {
        self.header.expired()
    }

    pub fn set_retry(&mut self, retry: i64) {
        self.header.retry = retry;
    }

    pub fn inc_retry(&mut self) {
        self.header.retry += 1;
    }

    pub fn set_update_time(&mut self, update_time: i64) {
        self.header.update_time = update_time;
    }

    pub fn set_priority(&mut self, priority: TaskPriority) {
        self.header.priority = priority;
    }

    pub fn set_timeout(&mut self, timeout: i64) {
        self.header.timeout = timeout;
    }

    pub fn set_max_retry(&mut self, max_retry: i64) {
        self.header.max_retry = max_retry;
    }

    pub fn set_error(&mut self, error: Option<TaskError>) {
        self.header.error = error;
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.header.address = address.into();
    }

    pub fn append_log(&mut self, entry: &str) {
        self.header.append_log(entry);
    }

    // =========================================================================
    // Payload accessors
    // =========================================================================

    /// Object the task works on, for object-bound kinds.
    pub fn object(&self) -> Option<&ObjectInfo> {
        match &self.payload {
            TaskPayload::UploadObject(p) => p.object.as_ref(),
            TaskPayload::ResumableUploadObject(p) => p.object.as_ref(),
            TaskPayload::ReplicatePiece(p) => p.object.as_ref(),
            TaskPayload::SealObject(p) => p.object.as_ref(),
            TaskPayload::ReceivePiece(p) => p.object.as_ref(),
            TaskPayload::DownloadObject(p) => p.object.as_ref(),
            TaskPayload::ChallengePiece(p) => p.object.as_ref(),
            TaskPayload::RecoverPiece(p) => p.object.as_ref(),
            _ => None,
        }
    }

    /// Storage parameters, for object-bound kinds.
    pub fn params(&self) -> Option<&StorageParams> {
        match &self.payload {
            TaskPayload::UploadObject(p) => p.params.as_ref(),
            TaskPayload::ResumableUploadObject(p) => p.params.as_ref(),
            TaskPayload::ReplicatePiece(p) => p.params.as_ref(),
            TaskPayload::SealObject(p) => p.params.as_ref(),
            TaskPayload::ReceivePiece(p) => p.params.as_ref(),
            TaskPayload::DownloadObject(p) => p.params.as_ref(),
            TaskPayload::ChallengePiece(p) => p.params.as_ref(),
            TaskPayload::RecoverPiece(p) => p.params.as_ref(),
            _ => None,
        }
    }

    pub fn as_upload(&self) -> Option<&UploadObject> {
        match &self.payload {
            TaskPayload::UploadObject(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_resumable_upload(&self) -> Option<&ResumableUploadObject> {
        match &self.payload {
            TaskPayload::ResumableUploadObject(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_replicate(&self) -> Option<&ReplicatePiece> {
        match &self.payload {
            TaskPayload::ReplicatePiece(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_replicate_mut(&mut self) -> Option<&mut ReplicatePiece> {
        match &mut self.payload {
            TaskPayload::ReplicatePiece(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_seal(&self) -> Option<&SealObject> {
        match &self.payload {
            TaskPayload::SealObject(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_receive(&self) -> Option<&ReceivePiece> {
        match &self.payload {
            TaskPayload::ReceivePiece(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_gc_object(&self) -> Option<&GcObject> {
        match &self.payload {
            TaskPayload::GcObject(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_gc_object_mut(&mut self) -> Option<&mut GcObject> {
        match &mut self.payload {
            TaskPayload::GcObject(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_recover_piece(&self) -> Option<&RecoverPiece> {
        match &self.payload {
            TaskPayload::RecoverPiece(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_recover_piece_mut(&mut self) -> Option<&mut RecoverPiece> {
        match &mut self.payload {
            TaskPayload::RecoverPiece(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_migrate_gvg(&self) -> Option<&MigrateGvg> {
        match &self.payload {
            TaskPayload::MigrateGvg(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_migrate_gvg_mut(&mut self) -> Option<&mut MigrateGvg> {
        match &mut self.payload {
            TaskPayload::MigrateGvg(p) => Some(p),
            _ => None,
        }
    }

    // =========================================================================
    // Resource estimate
    // =========================================================================

    /// Estimated cost of running this task, for limit-aware kinds only.
    pub fn resource_estimate(&self) -> Option<ResourceBudget> {
        let segment = |params: &Option<StorageParams>| {
            params.map(|p| p.max_segment_size).unwrap_or(BASE_TASK_MEMORY)
        };
        match &self.payload {
            TaskPayload::ReplicatePiece(p) => {
                let redundancy = p.params.map(|s| s.redundancy_count() as u64).unwrap_or(1);
                Some(ResourceBudget::new(
                    segment(&p.params).saturating_mul(redundancy),
                    redundancy,
                    1,
                    1,
                ))
            }
            TaskPayload::SealObject(_) => Some(ResourceBudget::new(BASE_TASK_MEMORY, 1, 0, 1)),
            TaskPayload::ReceivePiece(p) => {
                Some(ResourceBudget::new(p.piece_size.max(BASE_TASK_MEMORY), 1, 1, 1))
            }
            TaskPayload::GcObject(_) | TaskPayload::GcZombiePiece(_) | TaskPayload::GcMeta(_) => {
                Some(ResourceBudget::new(BASE_TASK_MEMORY, 0, 1, 1))
            }
            TaskPayload::RecoverPiece(p) => {
                let data_chunks = p
                    .params
                    .map(|s| s.redundant_data_chunk_num as u64)
                    .unwrap_or(1);
                Some(ResourceBudget::new(segment(&p.params), data_chunks, 1, 1))
            }
            TaskPayload::MigrateGvg(_) => Some(ResourceBudget::new(MIGRATE_TASK_MEMORY, 1, 1, 1)),
            _ => None,
        }
    }

    /// One-line diagnostic summary.
    pub fn info(&self) -> String {
        format!(
            "kind[{}] key[{}] priority[{}] retry[{}/{}] timeout[{}] update_time[{}] logs[{}]",
            self.kind(),
            self.header.key,
            self.header.priority,
            self.header.retry,
            self.header.max_retry,
            self.header.timeout,
            self.header.update_time,
            self.header.logs,
        )
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind(), self.header.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: u64) -> ObjectInfo {
        ObjectInfo {
            id,
            bucket_name: "bucket".into(),
            object_name: format!("object-{}", id),
            payload_size: 40 << 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_tasks_share_key() {
        let params = StorageParams::default();
        let upload = Task::new_upload(object(1), params, 1);
        let replicate = Task::new_replicate(object(1), params, 2);
        let seal = Task::new_seal(object(1), params, 2, vec![], vec![]);
        assert_eq!(upload.key(), replicate.key());
        assert_eq!(replicate.key(), seal.key());
    }

    #[test]
    fn test_resource_estimate_only_for_limit_aware_kinds() {
        let params = StorageParams::default();
        let tasks = vec![
            Task::new_upload(object(1), params, 1),
            Task::new_replicate(object(1), params, 2),
            Task::new_seal(object(1), params, 2, vec![], vec![]),
            Task::new_receive(object(1), params, 0, 0, 1024),
            Task::new_gc_object(1, 2),
            Task::new_gc_zombie(1, 2),
            Task::new_gc_meta(),
            Task::new_download(object(1), params, "user", 0, 10),
            Task::new_challenge(object(1), params, "user", 0, -1),
            Task::new_recover_piece(object(1), params, 3, 0, 1),
            Task::new_migrate_gvg(1, 2, 3, -1),
        ];
        for task in tasks {
            assert_eq!(
                task.resource_estimate().is_some(),
                task.kind().is_limit_aware(),
                "{}",
                task
            );
        }
    }

    #[test]
    fn test_replicate_estimate_scales_with_redundancy() {
        let params = StorageParams::default();
        let task = Task::new_replicate(object(1), params, 2);
        let estimate = task.resource_estimate().unwrap();
        assert_eq!(estimate.connections, 6);
        assert_eq!(estimate.memory, params.max_segment_size * 6);
    }

    #[test]
    fn test_builders_set_policy() {
        let task = Task::new_gc_object(10, 20)
            .with_priority(3)
            .with_timeout(60)
            .with_max_retry(5);
        assert_eq!(task.priority(), 3);
        assert_eq!(task.timeout(), 60);
        assert_eq!(task.max_retry(), 5);
        assert_eq!(task.as_gc_object().unwrap().current_block, 10);
    }

    #[test]
    fn test_replicate_defaults_no_unavailable_sp() {
        let task = Task::new_replicate(object(1), StorageParams::default(), 2);
        assert_eq!(task.as_replicate().unwrap().not_available_sp_idx, -1);
    }
}
