//! Recovery scheduler configuration.

use crate::config::{
    DEFAULT_MAX_RECOVERY_RETRY, DEFAULT_MONITOR_RECOVER_TIMEOUT_MINUTES,
    DEFAULT_RECOVER_BATCH_SIZE, DEFAULT_RECOVER_FAILED_INTERVAL_SECS,
    DEFAULT_RECOVER_INTERVAL_SECS, DEFAULT_VERIFY_GVG_QUERY_LIMIT, DEFAULT_VERIFY_INTERVAL_SECS,
};
use std::time::Duration;

/// Configuration shared by the recover, verify and failed-object schedulers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Objects listed per recovery batch.
    pub batch_size: u32,

    /// Attempts on a failed object before it is left for discontinuing.
    pub max_recovery_retry: u32,

    /// How long a batch may stay unprocessed before its stragglers are
    /// recorded as failed.
    pub monitor_timeout: Duration,

    pub recover_interval: Duration,
    pub verify_interval: Duration,
    pub verify_query_limit: u32,
    pub recover_failed_interval: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_RECOVER_BATCH_SIZE,
            max_recovery_retry: DEFAULT_MAX_RECOVERY_RETRY,
            monitor_timeout: Duration::from_secs(DEFAULT_MONITOR_RECOVER_TIMEOUT_MINUTES * 60),
            recover_interval: Duration::from_secs(DEFAULT_RECOVER_INTERVAL_SECS),
            verify_interval: Duration::from_secs(DEFAULT_VERIFY_INTERVAL_SECS),
            verify_query_limit: DEFAULT_VERIFY_GVG_QUERY_LIMIT,
            recover_failed_interval: Duration::from_secs(DEFAULT_RECOVER_FAILED_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::RecoverySettings> for RecoveryConfig {
    fn from(settings: &crate::config::RecoverySettings) -> Self {
        Self {
            batch_size: settings.recover_batch_size,
            max_recovery_retry: settings.max_recovery_retry,
            monitor_timeout: Duration::from_secs(settings.monitor_recover_timeout_minutes * 60),
            recover_interval: Duration::from_secs(settings.recover_interval_s),
            verify_interval: Duration::from_secs(settings.verify_interval_s),
            verify_query_limit: settings.verify_gvg_query_limit,
            recover_failed_interval: Duration::from_secs(settings.recover_failed_interval_s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn test_default_matches_file_defaults() {
        let from_file = RecoveryConfig::from(&ConfigFile::default().recovery);
        assert_eq!(from_file, RecoveryConfig::default());
        assert_eq!(from_file.monitor_timeout, Duration::from_secs(600));
    }
}
