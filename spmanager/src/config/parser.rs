//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

/// Parses an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [manager] section
    if let Some(section) = ini.section(Some("manager")) {
        let m = &mut config.manager;
        if let Some(v) = section.get("operator_address") {
            m.operator_address = v.trim().to_string();
        }
        read_number(section, "manager", "max_upload_parallelism", &mut m.max_upload_parallelism)?;
        read_number(section, "manager", "gc_object_time_interval_s", &mut m.gc_object_time_interval_s)?;
        read_number(section, "manager", "gc_object_block_interval", &mut m.gc_object_block_interval)?;
        read_number(
            section,
            "manager",
            "gc_object_safe_block_distance",
            &mut m.gc_object_safe_block_distance,
        )?;
        read_number(
            section,
            "manager",
            "sync_consensus_info_interval_s",
            &mut m.sync_consensus_info_interval_s,
        )?;
        read_number(section, "manager", "statistics_interval_s", &mut m.statistics_interval_s)?;
        if let Some(v) = section.get("discontinue_bucket_enabled") {
            m.discontinue_bucket_enabled = parse_bool(v);
        }
        read_number(
            section,
            "manager",
            "discontinue_bucket_time_interval_s",
            &mut m.discontinue_bucket_time_interval_s,
        )?;
        read_number(section, "manager", "load_replicate_limit", &mut m.load_replicate_limit)?;
        read_number(section, "manager", "load_seal_limit", &mut m.load_seal_limit)?;
        if let Some(v) = section.get("enable_task_retry_scheduler") {
            m.enable_task_retry_scheduler = parse_bool(v);
        }
        read_number(section, "manager", "reject_unseal_threshold_s", &mut m.reject_unseal_threshold_s)?;
        if let Some(v) = section.get("gvg_prefer_sp_list") {
            m.gvg_prefer_sp_list =
                parse_id_list(v).map_err(|_| ConfigFileError::InvalidValue {
                    section: "manager".to_string(),
                    key: "gvg_prefer_sp_list".to_string(),
                    value: v.to_string(),
                    reason: "expected comma separated SP ids like '1,2,3'".to_string(),
                })?;
        }
    }

    // [queue] section
    if let Some(section) = ini.section(Some("queue")) {
        let q = &mut config.queue;
        for (key, field) in [
            ("upload", &mut q.upload),
            ("resumable_upload", &mut q.resumable_upload),
            ("replicate", &mut q.replicate),
            ("seal", &mut q.seal),
            ("receive", &mut q.receive),
            ("gc_object", &mut q.gc_object),
            ("gc_zombie", &mut q.gc_zombie),
            ("gc_meta", &mut q.gc_meta),
            ("download_cache", &mut q.download_cache),
            ("challenge_cache", &mut q.challenge_cache),
            ("recovery", &mut q.recovery),
            ("migrate_gvg", &mut q.migrate_gvg),
        ] {
            read_number(section, "queue", key, field)?;
            if *field == 0 {
                return Err(ConfigFileError::InvalidValue {
                    section: "queue".to_string(),
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "queue capacity must be at least 1".to_string(),
                });
            }
        }
    }

    // [task] section
    if let Some(section) = ini.section(Some("task")) {
        let t = &mut config.task;
        for (key, field) in [
            ("upload_timeout_s", &mut t.upload_timeout_s),
            ("replicate_timeout_s", &mut t.replicate_timeout_s),
            ("seal_timeout_s", &mut t.seal_timeout_s),
            ("receive_timeout_s", &mut t.receive_timeout_s),
            ("gc_object_timeout_s", &mut t.gc_object_timeout_s),
            ("recovery_timeout_s", &mut t.recovery_timeout_s),
            ("migrate_gvg_timeout_s", &mut t.migrate_gvg_timeout_s),
            ("upload_max_retry", &mut t.upload_max_retry),
            ("replicate_max_retry", &mut t.replicate_max_retry),
            ("seal_max_retry", &mut t.seal_max_retry),
            ("receive_max_retry", &mut t.receive_max_retry),
            ("gc_object_max_retry", &mut t.gc_object_max_retry),
            ("recovery_max_retry", &mut t.recovery_max_retry),
            ("migrate_gvg_max_retry", &mut t.migrate_gvg_max_retry),
        ] {
            read_number(section, "task", key, field)?;
            if *field < 0 {
                return Err(ConfigFileError::InvalidValue {
                    section: "task".to_string(),
                    key: key.to_string(),
                    value: field.to_string(),
                    reason: "must not be negative".to_string(),
                });
            }
        }
    }

    // [recovery] section
    if let Some(section) = ini.section(Some("recovery")) {
        let r = &mut config.recovery;
        read_number(section, "recovery", "recover_batch_size", &mut r.recover_batch_size)?;
        read_number(section, "recovery", "max_recovery_retry", &mut r.max_recovery_retry)?;
        read_number(
            section,
            "recovery",
            "monitor_recover_timeout_minutes",
            &mut r.monitor_recover_timeout_minutes,
        )?;
        read_number(section, "recovery", "recover_interval_s", &mut r.recover_interval_s)?;
        read_number(section, "recovery", "verify_interval_s", &mut r.verify_interval_s)?;
        read_number(section, "recovery", "verify_gvg_query_limit", &mut r.verify_gvg_query_limit)?;
        read_number(
            section,
            "recovery",
            "recover_failed_interval_s",
            &mut r.recover_failed_interval_s,
        )?;
    }

    // [vgm] section
    if let Some(section) = ini.section(Some("vgm")) {
        let g = &mut config.vgm;
        read_number(section, "vgm", "default_freeze_period_s", &mut g.default_freeze_period_s)?;
        read_number(section, "vgm", "release_sp_job_interval_s", &mut g.release_sp_job_interval_s)?;
        read_number(section, "vgm", "refresh_meta_interval_s", &mut g.refresh_meta_interval_s)?;
        if let Some(v) = section.get("max_storage_usage") {
            g.max_storage_usage = v
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|u| *u > 0.0 && *u <= 1.0)
                .ok_or_else(|| ConfigFileError::InvalidValue {
                    section: "vgm".to_string(),
                    key: "max_storage_usage".to_string(),
                    value: v.to_string(),
                    reason: "must be a ratio in (0, 1]".to_string(),
                })?;
        }
        if let Some(v) = section.get("default_staking_storage_size") {
            g.default_staking_storage_size =
                parse_size(v).map_err(|_| ConfigFileError::InvalidValue {
                    section: "vgm".to_string(),
                    key: "default_staking_storage_size".to_string(),
                    value: v.to_string(),
                    reason: "expected format like '64GiB', '512MB', or '1024KB'".to_string(),
                })?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// Overwrites `field` with the parsed value of `key` when present.
fn read_number<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    field: &mut T,
) -> Result<(), ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(());
    };
    *field = v.trim().parse().map_err(|_| ConfigFileError::InvalidValue {
        section: section_name.to_string(),
        key: key.to_string(),
        value: v.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })?;
    Ok(())
}

/// Parses "1, 2,3" into ids. An empty string is an empty list.
fn parse_id_list(value: &str) -> Result<Vec<u32>, std::num::ParseIntError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Parses a boolean value, accepting true/false, yes/no, 1/0, on/off.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    matches!(v.as_str(), "true" | "yes" | "1" | "on")
}

/// Expands a leading `~` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
