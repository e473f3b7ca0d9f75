//! Virtual group management.
//!
//! Keeps a periodically refreshed snapshot of the families and global
//! virtual groups this provider is primary for, and picks among them by
//! free storage. Secondaries that misbehave during replication are parked
//! in a [`FreezeSpPool`] so new picks avoid them.

mod freeze;
mod manager;
mod picker;
mod policy;

pub use freeze::{FreezeSpPool, DEFAULT_FREEZE_PERIOD};
pub use manager::{GvgMeta, VgfMeta, VirtualGroupManager};
pub use picker::FreeStorageWeightPicker;
pub use policy::PreferSecondarySpPolicy;

use crate::client::ClientError;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default interval between release passes over the freeze pool.
pub const DEFAULT_RELEASE_SP_JOB_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between metadata refreshes.
pub const DEFAULT_REFRESH_META_INTERVAL: Duration = Duration::from_secs(2);

/// Usage ratio at which a group or family is no longer picked.
pub const DEFAULT_MAX_STORAGE_USAGE: f64 = 0.95;

/// Storage staked by a newly created group (64 GiB).
pub const DEFAULT_STAKING_STORAGE_SIZE: u64 = 64 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VgmError {
    #[error("failed to pick virtual group family")]
    PickVgf,

    #[error("failed to pick global virtual group")]
    PickGvg,

    /// Metadata does not know the requested family; refresh and retry.
    #[error("metadata is staled, need to force refresh metadata")]
    StaledMetadata,

    #[error("not enough secondary SPs: expected {expected}, available {available}")]
    NotEnoughSp { expected: usize, available: usize },

    #[error("storage provider {0} not found")]
    SpNotFound(u32),

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type VgmResult<T> = Result<T, VgmError>;

/// Configuration for the [`VirtualGroupManager`].
#[derive(Clone, Debug)]
pub struct VgmConfig {
    pub freeze_period: Duration,
    pub release_interval: Duration,
    pub refresh_interval: Duration,
    pub max_storage_usage: f64,
    pub default_staking_storage_size: u64,
}

impl Default for VgmConfig {
    fn default() -> Self {
        Self {
            freeze_period: DEFAULT_FREEZE_PERIOD,
            release_interval: DEFAULT_RELEASE_SP_JOB_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_META_INTERVAL,
            max_storage_usage: DEFAULT_MAX_STORAGE_USAGE,
            default_staking_storage_size: DEFAULT_STAKING_STORAGE_SIZE,
        }
    }
}

impl From<&crate::config::VgmSettings> for VgmConfig {
    fn from(settings: &crate::config::VgmSettings) -> Self {
        Self {
            freeze_period: Duration::from_secs(settings.default_freeze_period_s),
            release_interval: Duration::from_secs(settings.release_sp_job_interval_s),
            refresh_interval: Duration::from_secs(settings.refresh_meta_interval_s),
            max_storage_usage: settings.max_storage_usage,
            default_staking_storage_size: settings.default_staking_storage_size,
        }
    }
}
