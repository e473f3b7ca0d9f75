//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Scheduler settings
    pub manager: ManagerSettings,
    /// Queue capacities
    pub queue: QueueSettings,
    /// Per-kind task timeouts and retry limits
    pub task: TaskSettings,
    /// Object recovery settings
    pub recovery: RecoverySettings,
    /// Virtual group picking and freeze pool settings
    pub vgm: VgmSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// `[manager]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Operator address of this storage provider.
    pub operator_address: String,
    /// Cap on objects in the upload, replicate and seal stages combined.
    pub max_upload_parallelism: usize,
    pub gc_object_time_interval_s: u64,
    /// Number of blocks covered by one GC-object task.
    pub gc_object_block_interval: u64,
    /// Blocks to stay behind the chain head before collecting.
    pub gc_object_safe_block_distance: u64,
    pub sync_consensus_info_interval_s: u64,
    pub statistics_interval_s: u64,
    pub discontinue_bucket_enabled: bool,
    pub discontinue_bucket_time_interval_s: u64,
    /// Replicate tasks restored from the database at start-up.
    pub load_replicate_limit: usize,
    /// Seal tasks restored from the database at start-up.
    pub load_seal_limit: usize,
    pub enable_task_retry_scheduler: bool,
    /// Age after which an unsealed object is retried or rejected.
    pub reject_unseal_threshold_s: u64,
    /// Secondary SP ids preferred when creating a global virtual group.
    pub gvg_prefer_sp_list: Vec<u32>,
}

/// `[queue]` section: capacity of every task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub upload: usize,
    pub resumable_upload: usize,
    pub replicate: usize,
    pub seal: usize,
    pub receive: usize,
    pub gc_object: usize,
    pub gc_zombie: usize,
    pub gc_meta: usize,
    pub download_cache: usize,
    pub challenge_cache: usize,
    pub recovery: usize,
    pub migrate_gvg: usize,
}

/// `[task]` section: timeouts in seconds and retry limits per task kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub upload_timeout_s: i64,
    pub replicate_timeout_s: i64,
    pub seal_timeout_s: i64,
    pub receive_timeout_s: i64,
    pub gc_object_timeout_s: i64,
    pub recovery_timeout_s: i64,
    pub migrate_gvg_timeout_s: i64,
    pub upload_max_retry: i64,
    pub replicate_max_retry: i64,
    pub seal_max_retry: i64,
    pub receive_max_retry: i64,
    pub gc_object_max_retry: i64,
    pub recovery_max_retry: i64,
    pub migrate_gvg_max_retry: i64,
}

/// `[recovery]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySettings {
    /// Objects listed per recovery batch.
    pub recover_batch_size: u32,
    pub max_recovery_retry: u32,
    pub monitor_recover_timeout_minutes: u64,
    pub recover_interval_s: u64,
    pub verify_interval_s: u64,
    pub verify_gvg_query_limit: u32,
    pub recover_failed_interval_s: u64,
}

/// `[vgm]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct VgmSettings {
    pub default_freeze_period_s: u64,
    pub release_sp_job_interval_s: u64,
    pub refresh_meta_interval_s: u64,
    /// Usage ratio above which a group is no longer picked.
    pub max_storage_usage: f64,
    /// Bytes staked by a newly created group.
    pub default_staking_storage_size: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log directory
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}
