//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented representation written to `config.ini`.

use super::settings::ConfigFile;
use super::size::format_size;

/// Converts a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let m = &config.manager;
    let q = &config.queue;
    let t = &config.task;
    let r = &config.recovery;
    let g = &config.vgm;
    let prefer = m
        .gvg_prefer_sp_list
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    format!(
        r#"[manager]
; Operator address of this storage provider
operator_address = {}
; Upper bound on objects in the upload, replicate and seal stages combined
max_upload_parallelism = {}
; Seconds between GC-object task generation
gc_object_time_interval_s = {}
; Blocks covered by one GC-object task
gc_object_block_interval = {}
; Blocks to stay behind the chain head before collecting
gc_object_safe_block_distance = {}
sync_consensus_info_interval_s = {}
statistics_interval_s = {}
discontinue_bucket_enabled = {}
discontinue_bucket_time_interval_s = {}
; Tasks restored from the database at start-up
load_replicate_limit = {}
load_seal_limit = {}
; Periodically retry or reject objects stuck before sealing
enable_task_retry_scheduler = {}
reject_unseal_threshold_s = {}
; Comma separated SP ids preferred as secondaries for new groups
gvg_prefer_sp_list = {}

[queue]
; Capacity of each task queue
upload = {}
resumable_upload = {}
replicate = {}
seal = {}
receive = {}
gc_object = {}
gc_zombie = {}
gc_meta = {}
download_cache = {}
challenge_cache = {}
recovery = {}
migrate_gvg = {}

[task]
; Timeouts are seconds since the last update
upload_timeout_s = {}
replicate_timeout_s = {}
seal_timeout_s = {}
receive_timeout_s = {}
gc_object_timeout_s = {}
recovery_timeout_s = {}
migrate_gvg_timeout_s = {}
upload_max_retry = {}
replicate_max_retry = {}
seal_max_retry = {}
receive_max_retry = {}
gc_object_max_retry = {}
recovery_max_retry = {}
migrate_gvg_max_retry = {}

[recovery]
; Objects listed per recovery batch
recover_batch_size = {}
; Attempts on a failed object before it needs discontinuing
max_recovery_retry = {}
monitor_recover_timeout_minutes = {}
recover_interval_s = {}
verify_interval_s = {}
verify_gvg_query_limit = {}
recover_failed_interval_s = {}

[vgm]
default_freeze_period_s = {}
release_sp_job_interval_s = {}
refresh_meta_interval_s = {}
; Usage ratio above which a group is no longer picked
max_storage_usage = {}
; Storage staked by a new group (e.g. 64GiB, 512MB)
default_staking_storage_size = {}

[logging]
directory = {}
file = {}
"#,
        m.operator_address,
        m.max_upload_parallelism,
        m.gc_object_time_interval_s,
        m.gc_object_block_interval,
        m.gc_object_safe_block_distance,
        m.sync_consensus_info_interval_s,
        m.statistics_interval_s,
        m.discontinue_bucket_enabled,
        m.discontinue_bucket_time_interval_s,
        m.load_replicate_limit,
        m.load_seal_limit,
        m.enable_task_retry_scheduler,
        m.reject_unseal_threshold_s,
        prefer,
        q.upload,
        q.resumable_upload,
        q.replicate,
        q.seal,
        q.receive,
        q.gc_object,
        q.gc_zombie,
        q.gc_meta,
        q.download_cache,
        q.challenge_cache,
        q.recovery,
        q.migrate_gvg,
        t.upload_timeout_s,
        t.replicate_timeout_s,
        t.seal_timeout_s,
        t.receive_timeout_s,
        t.gc_object_timeout_s,
        t.recovery_timeout_s,
        t.migrate_gvg_timeout_s,
        t.upload_max_retry,
        t.replicate_max_retry,
        t.seal_max_retry,
        t.receive_max_retry,
        t.gc_object_max_retry,
        t.recovery_max_retry,
        t.migrate_gvg_max_retry,
        r.recover_batch_size,
        r.max_recovery_retry,
        r.monitor_recover_timeout_minutes,
        r.recover_interval_s,
        r.verify_interval_s,
        r.verify_gvg_query_limit,
        r.recover_failed_interval_s,
        g.default_freeze_period_s,
        g.release_sp_job_interval_s,
        g.refresh_meta_interval_s,
        g.max_storage_usage,
        format_size(g.default_staking_storage_size),
        config.logging.directory.to_string_lossy(),
        config.logging.file,
    )
}
