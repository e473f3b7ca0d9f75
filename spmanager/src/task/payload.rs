//! Per-kind task payloads.

use crate::client::types::{ObjectInfo, StorageParams};
use serde::{Deserialize, Serialize};

/// Client upload of a full object payload to the primary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadObject {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub vgf_id: u32,
}

/// Client upload of one part of an object, possibly resumed later.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumableUploadObject {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub vgf_id: u32,
    pub offset: u64,
    /// True once the final part has been received.
    pub completed: bool,
}

/// Erasure-coded replication of an object to its secondaries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatePiece {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub gvg_id: u32,
    pub secondary_endpoints: Vec<String>,
    pub secondary_addresses: Vec<String>,
    pub secondary_signatures: Vec<Vec<u8>>,
    /// Set when the executor sealed the object as part of replication.
    pub sealed: bool,
    /// Index of a secondary that was unreachable, -1 when none.
    pub not_available_sp_idx: i32,
}

/// On-chain seal of a replicated object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealObject {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub gvg_id: u32,
    pub secondary_addresses: Vec<String>,
    pub secondary_signatures: Vec<Vec<u8>>,
}

/// Confirmation that a secondary piece was received and sealed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivePiece {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub gvg_id: u32,
    pub replicate_idx: u32,
    pub piece_idx: i32,
    pub piece_size: u64,
    pub sealed: bool,
}

/// Garbage collection of objects deleted in a block range.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcObject {
    pub start_block: u64,
    pub end_block: u64,
    pub current_block: u64,
    pub last_deleted_object_id: u64,
}

/// Garbage collection of pieces that belong to no object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcZombiePiece {
    pub start_object_id: u64,
    pub end_object_id: u64,
}

/// Garbage collection of stale metadata rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcMeta {
    pub current_idx: u64,
    pub delete_count: u64,
}

/// Cached download request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadObject {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub user_address: String,
    pub low: u64,
    pub high: u64,
}

/// Cached challenge of a single piece.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePiece {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub user_address: String,
    pub segment_idx: u32,
    pub redundancy_idx: i32,
}

/// Recovery of one segment of an object for one redundancy index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverPiece {
    pub object: Option<ObjectInfo>,
    pub params: Option<StorageParams>,
    pub gvg_id: u32,
    pub segment_idx: u32,
    /// -1 recovers the primary copy.
    pub redundancy_idx: i32,
    /// Set when recovering on behalf of a successor provider.
    pub by_successor_sp: bool,
    pub recovered: bool,
}

/// Migration of one bucket's share of a global virtual group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateGvg {
    pub src_gvg_id: u32,
    pub dest_gvg_id: u32,
    pub bucket_id: u64,
    pub redundancy_idx: i32,
    pub last_migrated_object_id: u64,
    pub finished: bool,
}

/// Approval request for creating an object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCreateObject {
    pub bucket_name: String,
    pub object_name: String,
    pub account: String,
    pub expired_height: u64,
}

/// Approval request for creating a bucket.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCreateBucket {
    pub bucket_name: String,
    pub account: String,
    pub vgf_id: u32,
    pub expired_height: u64,
}
