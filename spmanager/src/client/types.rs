//! Value types returned by the chain and metadata clients.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an object on chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectStatus {
    /// Created on chain, payload not yet sealed.
    #[default]
    Created,
    /// Sealed: replication finished and acknowledged on chain.
    Sealed,
    /// Discontinued by governance or owner.
    Discontinued,
}

/// On-chain object descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: u64,
    pub bucket_name: String,
    pub object_name: String,
    pub owner: String,
    pub payload_size: u64,
    pub status: ObjectStatus,
    /// Global virtual group the object was sealed into; zero before sealing.
    pub gvg_id: u32,
    pub create_at: i64,
}

/// On-chain bucket descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub id: u64,
    pub bucket_name: String,
    pub owner: String,
    pub vgf_id: u32,
    pub primary_sp_id: u32,
}

/// Storage parameters that shape how payloads are segmented and coded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageParams {
    pub max_segment_size: u64,
    pub redundant_data_chunk_num: u32,
    pub redundant_parity_chunk_num: u32,
    pub max_payload_size: u64,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            max_segment_size: 16 * 1024 * 1024,
            redundant_data_chunk_num: 4,
            redundant_parity_chunk_num: 2,
            max_payload_size: 64 * 1024 * 1024 * 1024,
        }
    }
}

impl StorageParams {
    /// Number of segments a payload of `payload_size` bytes is split into.
    ///
    /// An empty payload has zero segments.
    pub fn segment_count(&self, payload_size: u64) -> u32 {
        if self.max_segment_size == 0 {
            return 0;
        }
        payload_size.div_ceil(self.max_segment_size) as u32
    }

    /// Number of secondary providers a global virtual group needs.
    pub fn redundancy_count(&self) -> usize {
        (self.redundant_data_chunk_num + self.redundant_parity_chunk_num) as usize
    }
}

/// Service status of a storage provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpStatus {
    #[default]
    InService,
    InJailed,
    GracefulExiting,
    InMaintenance,
}

/// Storage provider registered on chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProvider {
    pub id: u32,
    pub operator_address: String,
    pub endpoint: String,
    pub status: SpStatus,
}

impl StorageProvider {
    pub fn is_in_service(&self) -> bool {
        self.status == SpStatus::InService
    }
}

/// Global virtual group: one primary provider plus its secondaries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVirtualGroup {
    pub id: u32,
    pub family_id: u32,
    pub primary_sp_id: u32,
    pub secondary_sp_ids: Vec<u32>,
    pub stored_size: u64,
    pub total_deposit: u64,
}

/// Virtual group family: a set of global virtual groups under one primary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualGroupFamily {
    pub id: u32,
    pub primary_sp_id: u32,
    pub gvg_ids: Vec<u32>,
}

/// Chain-wide virtual group parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualGroupParams {
    /// Deposit required per byte of staked storage.
    pub gvg_staking_per_bytes: u64,
    pub deposit_denom: String,
}

impl Default for VirtualGroupParams {
    fn default() -> Self {
        Self {
            gvg_staking_per_bytes: 1,
            deposit_denom: "BNB".to_string(),
        }
    }
}

impl VirtualGroupParams {
    /// Storage size staked by a global virtual group's deposit.
    pub fn staking_storage_size(&self, gvg: &GlobalVirtualGroup) -> u64 {
        if self.gvg_staking_per_bytes == 0 {
            return 0;
        }
        gvg.total_deposit / self.gvg_staking_per_bytes
    }
}

/// Pending swap-in of a successor provider into a virtual group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInInfo {
    pub successor_sp_id: u32,
    pub target_sp_id: u32,
    pub expiration_time: i64,
}

/// Transaction creating a new global virtual group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGvgRequest {
    pub vgf_id: u32,
    pub primary_sp_address: String,
    pub secondary_sp_ids: Vec<u32>,
    pub deposit: u64,
    pub deposit_denom: String,
}

/// Transaction completing a swap-in after recovery.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSwapInRequest {
    pub vgf_id: u32,
    pub gvg_id: u32,
}

/// Transaction sealing an object on chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealObjectRequest {
    pub bucket_name: String,
    pub object_name: String,
    pub gvg_id: u32,
    pub secondary_signatures: Vec<Vec<u8>>,
}

/// Transaction rejecting an object that could not be sealed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectUnsealRequest {
    pub bucket_name: String,
    pub object_name: String,
}

/// A storage provider started or completed a graceful exit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpExitEvent {
    pub sp_id: u32,
    pub block_height: u64,
    pub completed: bool,
}

/// A bucket migration to this provider was requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateBucketEvent {
    pub bucket_id: u64,
    pub src_sp_id: u32,
    pub dest_sp_id: u32,
    pub block_height: u64,
}

/// A bucket migration finished on chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteMigrationBucketEvent {
    pub bucket_id: u64,
    pub block_height: u64,
}
