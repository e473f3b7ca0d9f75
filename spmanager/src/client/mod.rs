//! Chain and metadata-service clients.
//!
//! The manager talks to the outside world through two dyn-compatible
//! traits. Every call returns a boxed future so implementations can be
//! stored as `Arc<dyn Consensus>` / `Arc<dyn MetaClient>`.
//!
//! [`SimulatedChain`] implements both traits in memory and backs the CLI
//! simulator and the test suites.

mod simulated;
pub mod types;

pub use simulated::SimulatedChain;

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use types::{
    BucketInfo, CompleteMigrationBucketEvent, CompleteSwapInRequest, CreateGvgRequest,
    GlobalVirtualGroup, MigrateBucketEvent, ObjectInfo, RejectUnsealRequest, SealObjectRequest,
    SpExitEvent, StorageParams, StorageProvider, SwapInInfo, VirtualGroupFamily,
    VirtualGroupParams,
};

/// Boxed future type for dyn-compatible async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors returned by chain and metadata clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The requested entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The remote call failed.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ClientError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Read access to chain state.
pub trait Consensus: Send + Sync {
    fn current_height(&self) -> BoxFuture<'_, ClientResult<u64>>;

    fn query_storage_params(&self) -> BoxFuture<'_, ClientResult<StorageParams>>;

    /// Storage parameters in force at `timestamp` (unix seconds).
    fn query_storage_params_by_timestamp(
        &self,
        timestamp: i64,
    ) -> BoxFuture<'_, ClientResult<StorageParams>>;

    fn query_virtual_group_params(&self) -> BoxFuture<'_, ClientResult<VirtualGroupParams>>;

    fn query_object_info_by_id(&self, object_id: u64) -> BoxFuture<'_, ClientResult<ObjectInfo>>;

    fn query_global_virtual_group(
        &self,
        gvg_id: u32,
    ) -> BoxFuture<'_, ClientResult<GlobalVirtualGroup>>;

    fn query_virtual_group_family(
        &self,
        vgf_id: u32,
    ) -> BoxFuture<'_, ClientResult<VirtualGroupFamily>>;

    /// Families whose primary is `sp_id`.
    fn list_virtual_group_families(
        &self,
        sp_id: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<VirtualGroupFamily>>>;

    fn list_global_virtual_groups_by_family(
        &self,
        vgf_id: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<GlobalVirtualGroup>>>;

    fn list_sps(&self) -> BoxFuture<'_, ClientResult<Vec<StorageProvider>>>;

    fn query_sp(&self, operator_address: &str) -> BoxFuture<'_, ClientResult<StorageProvider>>;

    /// Pending swap-in for a family (`vgf_id != 0`) or a single group.
    /// `Ok(None)` means no swap-in exists.
    fn query_swap_in_info(
        &self,
        vgf_id: u32,
        gvg_id: u32,
    ) -> BoxFuture<'_, ClientResult<Option<SwapInInfo>>>;
}

/// Metadata service plus the transactions the manager submits.
pub trait MetaClient: Send + Sync {
    /// Objects stored in a group with id greater than `start_after`,
    /// ascending, at most `limit`.
    fn list_objects_in_gvg(
        &self,
        gvg_id: u32,
        start_after: u64,
        limit: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<ObjectInfo>>>;

    fn list_global_virtual_groups_by_secondary_sp(
        &self,
        sp_id: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<GlobalVirtualGroup>>>;

    fn list_sp_exit_events(
        &self,
        block_height: u64,
        operator_address: &str,
    ) -> BoxFuture<'_, ClientResult<Vec<SpExitEvent>>>;

    fn list_migrate_bucket_events(
        &self,
        block_height: u64,
        operator_address: &str,
    ) -> BoxFuture<'_, ClientResult<Vec<MigrateBucketEvent>>>;

    fn list_complete_migration_bucket_events(
        &self,
        block_height: u64,
        operator_address: &str,
    ) -> BoxFuture<'_, ClientResult<Vec<CompleteMigrationBucketEvent>>>;

    fn get_object_by_id(&self, object_id: u64) -> BoxFuture<'_, ClientResult<ObjectInfo>>;

    fn get_bucket_by_bucket_name(&self, bucket_name: &str)
        -> BoxFuture<'_, ClientResult<BucketInfo>>;

    /// Submits a create-GVG transaction, returning the tx hash.
    fn create_global_virtual_group(
        &self,
        request: CreateGvgRequest,
    ) -> BoxFuture<'_, ClientResult<String>>;

    fn complete_swap_in(&self, request: CompleteSwapInRequest)
        -> BoxFuture<'_, ClientResult<String>>;

    fn seal_object(&self, request: SealObjectRequest) -> BoxFuture<'_, ClientResult<String>>;

    fn reject_unseal_object(
        &self,
        request: RejectUnsealRequest,
    ) -> BoxFuture<'_, ClientResult<String>>;
}
