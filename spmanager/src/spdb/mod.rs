//! Persistence surface.
//!
//! [`SpDb`] names every operation the manager and its schedulers persist
//! through. Calls are synchronous and never made while a queue lock is
//! held. [`MemorySpDb`] is the in-process implementation, with optional
//! JSON snapshots.

mod memory;
pub mod types;

pub use memory::MemorySpDb;
pub use types::{
    GcObjectMeta, IntegrityMeta, MigrateGvgProgress, PutObjectEvent, RecoverFailedObject,
    RecoverGvgStats, RecoverStatus, TaskState, UploadCursor, UploadObjectMeta,
};

use crate::client::types::StorageProvider;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DbError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Backend(String),
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Key/value plus relational store used by the manager.
pub trait SpDb: Send + Sync {
    // =========================================================================
    // Upload progress
    // =========================================================================

    /// Creates a progress row in `UploadObjectDoing`. Fails with
    /// `Duplicate` if the row exists.
    fn insert_upload_progress(&self, object_id: u64) -> DbResult<()>;

    /// Updates state and error; endpoints, signatures and group id are only
    /// written when endpoints are present. Fails with `NotFound` if no row
    /// exists.
    fn update_upload_progress(&self, meta: &UploadObjectMeta) -> DbResult<()>;

    fn get_upload_state(&self, object_id: u64) -> DbResult<UploadObjectMeta>;

    fn delete_upload_progress(&self, object_id: u64) -> DbResult<()>;

    /// Rows awaiting replication that sort after `after`, ordered by
    /// create time then object id.
    fn get_upload_metas_to_replicate_by_start_ts(
        &self,
        limit: usize,
        after: UploadCursor,
    ) -> DbResult<Vec<UploadObjectMeta>>;

    /// Rows awaiting seal that sort after `after`, same order.
    fn get_upload_metas_to_seal_by_start_ts(
        &self,
        limit: usize,
        after: UploadCursor,
    ) -> DbResult<Vec<UploadObjectMeta>>;

    /// Rows that sort after `after` and were created no later than
    /// `end_ts`, same order.
    fn get_upload_metas_to_reject_by_range_ts(
        &self,
        limit: usize,
        after: UploadCursor,
        end_ts: i64,
    ) -> DbResult<Vec<UploadObjectMeta>>;

    fn insert_put_event(&self, event: PutObjectEvent) -> DbResult<()>;

    // =========================================================================
    // GC progress
    // =========================================================================

    fn set_gc_object_progress(&self, task_key: &str, start: u64, end: u64) -> DbResult<()>;

    fn update_gc_object_progress(&self, meta: &GcObjectMeta) -> DbResult<()>;

    fn delete_gc_object_progress(&self, task_key: &str) -> DbResult<()>;

    /// Unfinished GC rows, oldest first.
    fn get_gc_metas_to_gc(&self, limit: usize) -> DbResult<Vec<GcObjectMeta>>;

    // =========================================================================
    // Recovery progress
    // =========================================================================

    /// Inserts rows; rows whose group already has stats are left untouched.
    fn set_recover_gvg_stats(&self, rows: &[RecoverGvgStats]) -> DbResult<()>;

    fn get_recover_gvg_stats(&self, gvg_id: u32) -> DbResult<RecoverGvgStats>;

    fn update_recover_gvg_stats(&self, row: &RecoverGvgStats) -> DbResult<()>;

    fn batch_get_recover_gvg_stats(&self, vgf_id: u32) -> DbResult<Vec<RecoverGvgStats>>;

    fn get_recover_gvg_stats_by_family_id_and_status(
        &self,
        vgf_id: u32,
        status: RecoverStatus,
    ) -> DbResult<Vec<RecoverGvgStats>>;

    /// Every stats row in `status`, across families.
    fn get_recover_gvg_stats_by_status(
        &self,
        status: RecoverStatus,
    ) -> DbResult<Vec<RecoverGvgStats>>;

    fn insert_recover_failed_object(&self, row: &RecoverFailedObject) -> DbResult<()>;

    fn get_recover_failed_object(&self, object_id: u64) -> DbResult<RecoverFailedObject>;

    /// Rows with `retry_time < max_retry`, ordered by object id.
    fn get_recover_failed_objects(
        &self,
        max_retry: u32,
        limit: usize,
    ) -> DbResult<Vec<RecoverFailedObject>>;

    fn update_recover_failed_object(&self, row: &RecoverFailedObject) -> DbResult<()>;

    fn delete_recover_failed_object(&self, object_id: u64) -> DbResult<()>;

    /// Rows with `retry_time >= retry_time`.
    fn get_recover_failed_objects_by_retry_time(
        &self,
        retry_time: u32,
    ) -> DbResult<Vec<RecoverFailedObject>>;

    // =========================================================================
    // Integrity
    // =========================================================================

    fn get_object_integrity(&self, object_id: u64, redundancy_index: i32)
        -> DbResult<IntegrityMeta>;

    fn set_object_integrity(&self, meta: &IntegrityMeta) -> DbResult<()>;

    fn get_replicate_piece_checksum(
        &self,
        object_id: u64,
        segment_idx: u32,
        redundancy_index: i32,
    ) -> DbResult<Vec<u8>>;

    fn set_replicate_piece_checksum(
        &self,
        object_id: u64,
        segment_idx: u32,
        redundancy_index: i32,
        checksum: Vec<u8>,
    ) -> DbResult<()>;

    // =========================================================================
    // Migration progress
    // =========================================================================

    fn update_migrate_gvg_progress(&self, progress: &MigrateGvgProgress) -> DbResult<()>;

    fn get_migrate_gvg_progress(&self, task_key: &str) -> DbResult<MigrateGvgProgress>;

    fn delete_migrate_gvg_progress(&self, task_key: &str) -> DbResult<()>;

    // =========================================================================
    // Storage providers
    // =========================================================================

    fn update_all_sp(&self, sps: &[StorageProvider]) -> DbResult<()>;

    fn get_all_sp(&self) -> DbResult<Vec<StorageProvider>>;

    fn set_own_sp_info(&self, sp: &StorageProvider) -> DbResult<()>;

    fn get_own_sp_info(&self) -> DbResult<StorageProvider>;
}
