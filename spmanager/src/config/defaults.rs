//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use std::path::PathBuf;

use super::settings::*;
use crate::logging::{DEFAULT_LOG_DIR, DEFAULT_LOG_FILE};
use crate::vgm::{
    DEFAULT_FREEZE_PERIOD, DEFAULT_MAX_STORAGE_USAGE, DEFAULT_REFRESH_META_INTERVAL,
    DEFAULT_RELEASE_SP_JOB_INTERVAL, DEFAULT_STAKING_STORAGE_SIZE,
};

// =============================================================================
// Manager defaults
// =============================================================================

pub const DEFAULT_MAX_UPLOAD_PARALLELISM: usize = 4096;

/// Seconds between GC-object generation ticks.
pub const DEFAULT_GC_OBJECT_TIME_INTERVAL_SECS: u64 = 30 * 60;

/// Blocks per GC-object task.
pub const DEFAULT_GC_OBJECT_BLOCK_INTERVAL: u64 = 500;

pub const DEFAULT_GC_OBJECT_SAFE_BLOCK_DISTANCE: u64 = 1000;

pub const DEFAULT_SYNC_CONSENSUS_INFO_INTERVAL_SECS: u64 = 2;

pub const DEFAULT_STATISTICS_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_DISCONTINUE_BUCKET_INTERVAL_SECS: u64 = 60 * 60;

pub const DEFAULT_LOAD_REPLICATE_LIMIT: usize = 1024;

pub const DEFAULT_LOAD_SEAL_LIMIT: usize = 1024;

/// One day.
pub const DEFAULT_REJECT_UNSEAL_THRESHOLD_SECS: u64 = 24 * 60 * 60;

// =============================================================================
// Queue defaults
// =============================================================================

pub const DEFAULT_UPLOAD_QUEUE_CAP: usize = 1024;
pub const DEFAULT_RESUMABLE_UPLOAD_QUEUE_CAP: usize = 1024;
pub const DEFAULT_REPLICATE_QUEUE_CAP: usize = 1024;
pub const DEFAULT_SEAL_QUEUE_CAP: usize = 1024;
pub const DEFAULT_RECEIVE_QUEUE_CAP: usize = 4096;
pub const DEFAULT_GC_OBJECT_QUEUE_CAP: usize = 4;
pub const DEFAULT_GC_ZOMBIE_QUEUE_CAP: usize = 1;
pub const DEFAULT_GC_META_QUEUE_CAP: usize = 1;
pub const DEFAULT_DOWNLOAD_CACHE_QUEUE_CAP: usize = 4096;
pub const DEFAULT_CHALLENGE_CACHE_QUEUE_CAP: usize = 4096;
pub const DEFAULT_RECOVERY_QUEUE_CAP: usize = 1024;
pub const DEFAULT_MIGRATE_GVG_QUEUE_CAP: usize = 1024;

// =============================================================================
// Task defaults
// =============================================================================

pub const DEFAULT_UPLOAD_TIMEOUT_SECS: i64 = 300;
pub const DEFAULT_REPLICATE_TIMEOUT_SECS: i64 = 500;
pub const DEFAULT_SEAL_TIMEOUT_SECS: i64 = 300;
pub const DEFAULT_RECEIVE_TIMEOUT_SECS: i64 = 300;
pub const DEFAULT_GC_OBJECT_TIMEOUT_SECS: i64 = 300;
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: i64 = 300;
pub const DEFAULT_MIGRATE_GVG_TIMEOUT_SECS: i64 = 600;

pub const DEFAULT_UPLOAD_MAX_RETRY: i64 = 0;
pub const DEFAULT_REPLICATE_MAX_RETRY: i64 = 3;
pub const DEFAULT_SEAL_MAX_RETRY: i64 = 3;
pub const DEFAULT_RECEIVE_MAX_RETRY: i64 = 3;
pub const DEFAULT_GC_OBJECT_MAX_RETRY: i64 = 5;
pub const DEFAULT_RECOVERY_MAX_RETRY: i64 = 3;
pub const DEFAULT_MIGRATE_GVG_MAX_RETRY: i64 = 3;

// =============================================================================
// Recovery defaults
// =============================================================================

pub const DEFAULT_RECOVER_BATCH_SIZE: u32 = 10;

/// Attempts made on a failed object before it needs discontinuing.
pub const DEFAULT_MAX_RECOVERY_RETRY: u32 = 5;

pub const DEFAULT_MONITOR_RECOVER_TIMEOUT_MINUTES: u64 = 10;
pub const DEFAULT_RECOVER_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_VERIFY_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_VERIFY_GVG_QUERY_LIMIT: u32 = 100;
pub const DEFAULT_RECOVER_FAILED_INTERVAL_SECS: u64 = 30;

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            manager: ManagerSettings {
                operator_address: String::new(),
                max_upload_parallelism: DEFAULT_MAX_UPLOAD_PARALLELISM,
                gc_object_time_interval_s: DEFAULT_GC_OBJECT_TIME_INTERVAL_SECS,
                gc_object_block_interval: DEFAULT_GC_OBJECT_BLOCK_INTERVAL,
                gc_object_safe_block_distance: DEFAULT_GC_OBJECT_SAFE_BLOCK_DISTANCE,
                sync_consensus_info_interval_s: DEFAULT_SYNC_CONSENSUS_INFO_INTERVAL_SECS,
                statistics_interval_s: DEFAULT_STATISTICS_INTERVAL_SECS,
                discontinue_bucket_enabled: false,
                discontinue_bucket_time_interval_s: DEFAULT_DISCONTINUE_BUCKET_INTERVAL_SECS,
                load_replicate_limit: DEFAULT_LOAD_REPLICATE_LIMIT,
                load_seal_limit: DEFAULT_LOAD_SEAL_LIMIT,
                enable_task_retry_scheduler: true,
                reject_unseal_threshold_s: DEFAULT_REJECT_UNSEAL_THRESHOLD_SECS,
                gvg_prefer_sp_list: Vec::new(),
            },
            queue: QueueSettings {
                upload: DEFAULT_UPLOAD_QUEUE_CAP,
                resumable_upload: DEFAULT_RESUMABLE_UPLOAD_QUEUE_CAP,
                replicate: DEFAULT_REPLICATE_QUEUE_CAP,
                seal: DEFAULT_SEAL_QUEUE_CAP,
                receive: DEFAULT_RECEIVE_QUEUE_CAP,
                gc_object: DEFAULT_GC_OBJECT_QUEUE_CAP,
                gc_zombie: DEFAULT_GC_ZOMBIE_QUEUE_CAP,
                gc_meta: DEFAULT_GC_META_QUEUE_CAP,
                download_cache: DEFAULT_DOWNLOAD_CACHE_QUEUE_CAP,
                challenge_cache: DEFAULT_CHALLENGE_CACHE_QUEUE_CAP,
                recovery: DEFAULT_RECOVERY_QUEUE_CAP,
                migrate_gvg: DEFAULT_MIGRATE_GVG_QUEUE_CAP,
            },
            task: TaskSettings {
                upload_timeout_s: DEFAULT_UPLOAD_TIMEOUT_SECS,
                replicate_timeout_s: DEFAULT_REPLICATE_TIMEOUT_SECS,
                seal_timeout_s: DEFAULT_SEAL_TIMEOUT_SECS,
                receive_timeout_s: DEFAULT_RECEIVE_TIMEOUT_SECS,
                gc_object_timeout_s: DEFAULT_GC_OBJECT_TIMEOUT_SECS,
                recovery_timeout_s: DEFAULT_RECOVERY_TIMEOUT_SECS,
                migrate_gvg_timeout_s: DEFAULT_MIGRATE_GVG_TIMEOUT_SECS,
                upload_max_retry: DEFAULT_UPLOAD_MAX_RETRY,
                replicate_max_retry: DEFAULT_REPLICATE_MAX_RETRY,
                seal_max_retry: DEFAULT_SEAL_MAX_RETRY,
                receive_max_retry: DEFAULT_RECEIVE_MAX_RETRY,
                gc_object_max_retry: DEFAULT_GC_OBJECT_MAX_RETRY,
                recovery_max_retry: DEFAULT_RECOVERY_MAX_RETRY,
                migrate_gvg_max_retry: DEFAULT_MIGRATE_GVG_MAX_RETRY,
            },
            recovery: RecoverySettings {
                recover_batch_size: DEFAULT_RECOVER_BATCH_SIZE,
                max_recovery_retry: DEFAULT_MAX_RECOVERY_RETRY,
                monitor_recover_timeout_minutes: DEFAULT_MONITOR_RECOVER_TIMEOUT_MINUTES,
                recover_interval_s: DEFAULT_RECOVER_INTERVAL_SECS,
                verify_interval_s: DEFAULT_VERIFY_INTERVAL_SECS,
                verify_gvg_query_limit: DEFAULT_VERIFY_GVG_QUERY_LIMIT,
                recover_failed_interval_s: DEFAULT_RECOVER_FAILED_INTERVAL_SECS,
            },
            vgm: VgmSettings {
                default_freeze_period_s: DEFAULT_FREEZE_PERIOD.as_secs(),
                release_sp_job_interval_s: DEFAULT_RELEASE_SP_JOB_INTERVAL.as_secs(),
                refresh_meta_interval_s: DEFAULT_REFRESH_META_INTERVAL.as_secs(),
                max_storage_usage: DEFAULT_MAX_STORAGE_USAGE,
                default_staking_storage_size: DEFAULT_STAKING_STORAGE_SIZE,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIR),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
