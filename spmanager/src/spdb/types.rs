//! Persisted rows.

use crate::time::now_unix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of an object through the upload pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[default]
    UploadObjectDoing,
    UploadObjectDone,
    UploadObjectError,
    ReplicateObjectDoing,
    ReplicateObjectDone,
    ReplicateObjectError,
    SealObjectDoing,
    SealObjectDone,
    SealObjectError,
}

impl TaskState {
    /// States from which a replicate task can be restored.
    pub const TO_REPLICATE: [TaskState; 3] = [
        TaskState::UploadObjectDone,
        TaskState::ReplicateObjectDoing,
        TaskState::ReplicateObjectError,
    ];

    /// States from which a seal can be retried.
    pub const TO_SEAL: [TaskState; 3] = [
        TaskState::ReplicateObjectDone,
        TaskState::SealObjectDoing,
        TaskState::SealObjectError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadObjectDoing => "upload_object_doing",
            Self::UploadObjectDone => "upload_object_done",
            Self::UploadObjectError => "upload_object_error",
            Self::ReplicateObjectDoing => "replicate_object_doing",
            Self::ReplicateObjectDone => "replicate_object_done",
            Self::ReplicateObjectError => "replicate_object_error",
            Self::SealObjectDoing => "seal_object_doing",
            Self::SealObjectDone => "seal_object_done",
            Self::SealObjectError => "seal_object_error",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload pipeline progress of one object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadObjectMeta {
    pub object_id: u64,
    pub task_state: TaskState,
    pub gvg_id: u32,
    pub secondary_endpoints: Vec<String>,
    pub secondary_signatures: Vec<Vec<u8>>,
    pub error_description: String,
    pub create_timestamp_second: i64,
    pub update_timestamp_second: i64,
}

impl UploadObjectMeta {
    pub fn new(object_id: u64, task_state: TaskState) -> Self {
        Self {
            object_id,
            task_state,
            ..Default::default()
        }
    }

    pub fn with_error(mut self, description: impl Into<String>) -> Self {
        self.error_description = description.into();
        self
    }

    /// Position of this row in paging order.
    pub fn cursor(&self) -> UploadCursor {
        UploadCursor {
            create_ts: self.create_timestamp_second,
            object_id: self.object_id,
        }
    }
}

/// Paging position over upload progress rows, ordered by create time then
/// object id. Queries return rows strictly after the cursor, so rows that
/// share a create second are never skipped between pages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UploadCursor {
    pub create_ts: i64,
    pub object_id: u64,
}

impl UploadCursor {
    /// Cursor past every row created at or before `ts`.
    pub fn after_ts(ts: i64) -> Self {
        Self {
            create_ts: ts,
            object_id: u64::MAX,
        }
    }

    /// True if `meta` sorts after this cursor.
    pub fn precedes(&self, meta: &UploadObjectMeta) -> bool {
        meta.cursor() > *self
    }
}

/// Cursor of a GC-object task over a block range.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcObjectMeta {
    pub task_key: String,
    pub start_block_height: u64,
    pub end_block_height: u64,
    pub current_block_height: u64,
    pub last_deleted_object_id: u64,
    pub create_timestamp_second: i64,
}

/// Recovery progress of one global virtual group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoverStatus {
    #[default]
    Processing,
    Processed,
    Completed,
}

impl fmt::Display for RecoverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Processed => write!(f, "processed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverGvgStats {
    pub vgf_id: u32,
    pub gvg_id: u32,
    pub redundancy_index: i32,
    pub start_after: u64,
    pub next_start_after: u64,
    pub limit: u32,
    pub status: RecoverStatus,
}

impl RecoverGvgStats {
    pub fn new(vgf_id: u32, gvg_id: u32, redundancy_index: i32, limit: u32) -> Self {
        Self {
            vgf_id,
            gvg_id,
            redundancy_index,
            limit,
            ..Default::default()
        }
    }
}

/// An object whose recovery failed and must be retried.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverFailedObject {
    pub object_id: u64,
    pub gvg_id: u32,
    pub redundancy_index: i32,
    pub retry_time: u32,
}

impl RecoverFailedObject {
    pub fn new(object_id: u64, gvg_id: u32, redundancy_index: i32) -> Self {
        Self {
            object_id,
            gvg_id,
            redundancy_index,
            retry_time: 0,
        }
    }
}

/// Integrity hash and piece checksums stored for an object copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityMeta {
    pub object_id: u64,
    pub redundancy_index: i32,
    pub integrity_checksum: Vec<u8>,
    pub piece_checksums: Vec<Vec<u8>>,
}

/// Progress of a migrate-GVG task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateGvgProgress {
    pub task_key: String,
    pub src_gvg_id: u32,
    pub dest_gvg_id: u32,
    pub bucket_id: u64,
    pub redundancy_index: i32,
    pub last_migrated_object_id: u64,
    pub finished: bool,
}

/// Audit trail entry for an object's upload lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutObjectEvent {
    pub object_id: u64,
    pub event: String,
    pub description: String,
    pub timestamp_second: i64,
}

impl PutObjectEvent {
    pub fn new(object_id: u64, event: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            object_id,
            event: event.into(),
            description: description.into(),
            timestamp_second: now_unix(),
        }
    }
}
