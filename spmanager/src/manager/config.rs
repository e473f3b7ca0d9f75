//! Manager configuration.
//!
//! [`ManagerConfig`] gathers everything the [`Manager`](super::Manager)
//! needs: queue capacities, per-kind task policies, event loop intervals and
//! the nested configs of the recovery, retry and virtual group components.

use crate::config::ConfigFile;
use crate::recovery::RecoveryConfig;
use crate::retry::RetryConfig;
use crate::task::{
    TaskPriority, DEFAULT_LARGER_PRIORITY, DEFAULT_SMALLER_PRIORITY, MAX_TASK_PRIORITY,
};
use crate::vgm::VgmConfig;
use std::time::Duration;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default number of concurrent fire-and-forget background writes.
pub const DEFAULT_BACKGROUND_CONCURRENCY: usize = 64;

/// Queue names, as reported in logs, metrics and statistics.
pub mod queue_names {
    pub const UPLOAD: &str = "upload";
    pub const RESUMABLE_UPLOAD: &str = "resumable_upload";
    pub const REPLICATE: &str = "replicate";
    pub const SEAL: &str = "seal";
    pub const RECEIVE: &str = "receive";
    pub const GC_OBJECT: &str = "gc_object";
    pub const GC_ZOMBIE: &str = "gc_zombie";
    pub const GC_META: &str = "gc_meta";
    pub const DOWNLOAD: &str = "download";
    pub const CHALLENGE: &str = "challenge";
    pub const RECOVERY: &str = "recovery";
    pub const MIGRATE_GVG: &str = "migrate_gvg";
}

// =============================================================================
// Task Policy
// =============================================================================

/// Priority, timeout and retry budget stamped onto tasks the manager creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskPolicy {
    pub priority: TaskPriority,
    /// Seconds since the last update before the task counts as timed out.
    pub timeout: i64,
    pub max_retry: i64,
}

impl TaskPolicy {
    pub const fn new(priority: TaskPriority, timeout: i64, max_retry: i64) -> Self {
        Self {
            priority,
            timeout,
            max_retry,
        }
    }
}

/// Policies for every kind the manager creates or resets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskPolicies {
    pub upload: TaskPolicy,
    pub replicate: TaskPolicy,
    pub seal: TaskPolicy,
    pub receive: TaskPolicy,
    pub gc_object: TaskPolicy,
    pub recovery: TaskPolicy,
    pub migrate_gvg: TaskPolicy,
}

impl From<&crate::config::TaskSettings> for TaskPolicies {
    fn from(t: &crate::config::TaskSettings) -> Self {
        Self {
            upload: TaskPolicy::new(MAX_TASK_PRIORITY, t.upload_timeout_s, t.upload_max_retry),
            replicate: TaskPolicy::new(
                DEFAULT_LARGER_PRIORITY,
                t.replicate_timeout_s,
                t.replicate_max_retry,
            ),
            seal: TaskPolicy::new(DEFAULT_LARGER_PRIORITY, t.seal_timeout_s, t.seal_max_retry),
            receive: TaskPolicy::new(
                DEFAULT_LARGER_PRIORITY,
                t.receive_timeout_s,
                t.receive_max_retry,
            ),
            gc_object: TaskPolicy::new(
                DEFAULT_LARGER_PRIORITY,
                t.gc_object_timeout_s,
                t.gc_object_max_retry,
            ),
            recovery: TaskPolicy::new(
                DEFAULT_SMALLER_PRIORITY,
                t.recovery_timeout_s,
                t.recovery_max_retry,
            ),
            migrate_gvg: TaskPolicy::new(
                DEFAULT_SMALLER_PRIORITY,
                t.migrate_gvg_timeout_s,
                t.migrate_gvg_max_retry,
            ),
        }
    }
}

// =============================================================================
// Queue Capacities
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueCapacities {
    pub upload: usize,
    pub resumable_upload: usize,
    pub replicate: usize,
    pub seal: usize,
    pub receive: usize,
    pub gc_object: usize,
    pub gc_zombie: usize,
    pub gc_meta: usize,
    pub download: usize,
    pub challenge: usize,
    pub recovery: usize,
    pub migrate_gvg: usize,
}

impl From<&crate::config::QueueSettings> for QueueCapacities {
    fn from(q: &crate::config::QueueSettings) -> Self {
        Self {
            upload: q.upload,
            resumable_upload: q.resumable_upload,
            replicate: q.replicate,
            seal: q.seal,
            receive: q.receive,
            gc_object: q.gc_object,
            gc_zombie: q.gc_zombie,
            gc_meta: q.gc_meta,
            download: q.download_cache,
            challenge: q.challenge_cache,
            recovery: q.recovery,
            migrate_gvg: q.migrate_gvg,
        }
    }
}

// =============================================================================
// Manager Configuration
// =============================================================================

/// Configuration for the [`Manager`](super::Manager).
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Operator address of this provider, matched case-insensitively
    /// against the chain's SP list.
    pub operator_address: String,

    /// Upper bound on objects across the upload, resumable upload,
    /// replicate and seal queues.
    pub max_upload_parallelism: usize,

    pub queues: QueueCapacities,
    pub tasks: TaskPolicies,

    pub gc_object_interval: Duration,
    /// Blocks covered by one GC-object task.
    pub gc_object_block_interval: u64,
    /// Blocks the GC range must stay behind the chain head.
    pub gc_object_safe_block_distance: u64,

    pub sync_consensus_info_interval: Duration,
    pub statistics_interval: Duration,

    pub discontinue_bucket_enabled: bool,
    pub discontinue_bucket_interval: Duration,

    /// Replicate tasks restored from the database at start-up.
    pub load_replicate_limit: usize,
    /// Seal tasks restored from the database at start-up.
    pub load_seal_limit: usize,

    /// Secondary SPs preferred when creating a new group.
    pub gvg_prefer_sp_list: Vec<u32>,

    /// Concurrent fire-and-forget writes spawned from handlers.
    pub background_concurrency: usize,

    pub recovery: RecoveryConfig,
    pub retry: RetryConfig,
    pub vgm: VgmConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from(&ConfigFile::default())
    }
}

impl From<&ConfigFile> for ManagerConfig {
    fn from(config: &ConfigFile) -> Self {
        let m = &config.manager;
        Self {
            operator_address: m.operator_address.clone(),
            max_upload_parallelism: m.max_upload_parallelism,
            queues: QueueCapacities::from(&config.queue),
            tasks: TaskPolicies::from(&config.task),
            gc_object_interval: Duration::from_secs(m.gc_object_time_interval_s),
            gc_object_block_interval: m.gc_object_block_interval,
            gc_object_safe_block_distance: m.gc_object_safe_block_distance,
            sync_consensus_info_interval: Duration::from_secs(m.sync_consensus_info_interval_s),
            statistics_interval: Duration::from_secs(m.statistics_interval_s),
            discontinue_bucket_enabled: m.discontinue_bucket_enabled,
            discontinue_bucket_interval: Duration::from_secs(
                m.discontinue_bucket_time_interval_s,
            ),
            load_replicate_limit: m.load_replicate_limit,
            load_seal_limit: m.load_seal_limit,
            gvg_prefer_sp_list: m.gvg_prefer_sp_list.clone(),
            background_concurrency: DEFAULT_BACKGROUND_CONCURRENCY,
            recovery: RecoveryConfig::from(&config.recovery),
            retry: RetryConfig::from(&config.manager),
            vgm: VgmConfig::from(&config.vgm),
        }
    }
}

impl ManagerConfig {
    /// Sets the operator address.
    pub fn with_operator_address(mut self, address: impl Into<String>) -> Self {
        self.operator_address = address.into();
        self
    }
}
