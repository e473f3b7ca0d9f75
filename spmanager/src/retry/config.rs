//! Retry scheduler configuration.

use crate::config::{ManagerSettings, DEFAULT_REJECT_UNSEAL_THRESHOLD_SECS};
use std::time::Duration;

/// Rows fetched per page from upload progress.
pub const DEFAULT_RETRY_PREFETCH_LIMIT: usize = 100;

/// Pause between two passes over upload progress.
pub const DEFAULT_RETRY_LOOP_INTERVAL: Duration = Duration::from_secs(100);

/// Pause between two retried rows, keeping pressure off the chain and db.
pub const DEFAULT_RETRY_ITEM_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after a queue reports it is full or the chain is unreachable.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Window of recent rows retried; rows older than this (up to twice
    /// this) are rejected instead.
    pub reject_unseal_threshold: Duration,
    pub prefetch_limit: usize,
    pub loop_interval: Duration,
    pub item_interval: Duration,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reject_unseal_threshold: Duration::from_secs(DEFAULT_REJECT_UNSEAL_THRESHOLD_SECS),
            prefetch_limit: DEFAULT_RETRY_PREFETCH_LIMIT,
            loop_interval: DEFAULT_RETRY_LOOP_INTERVAL,
            item_interval: DEFAULT_RETRY_ITEM_INTERVAL,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl From<&ManagerSettings> for RetryConfig {
    fn from(m: &ManagerSettings) -> Self {
        let threshold = if m.reject_unseal_threshold_s == 0 {
            DEFAULT_REJECT_UNSEAL_THRESHOLD_SECS
        } else {
            m.reject_unseal_threshold_s
        };
        Self {
            enabled: m.enable_task_retry_scheduler,
            reject_unseal_threshold: Duration::from_secs(threshold),
            ..Self::default()
        }
    }
}

impl RetryConfig {
    pub fn threshold_secs(&self) -> i64 {
        self.reject_unseal_threshold.as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;

    #[test]
    fn test_zero_threshold_falls_back_to_default() {
        let mut file = ConfigFile::default();
        file.manager.reject_unseal_threshold_s = 0;
        file.manager.enable_task_retry_scheduler = false;

        let config = RetryConfig::from(&file.manager);
        assert!(!config.enabled);
        assert_eq!(config.threshold_secs(), DEFAULT_REJECT_UNSEAL_THRESHOLD_SECS as i64);
        assert_eq!(config.prefetch_limit, DEFAULT_RETRY_PREFETCH_LIMIT);
    }
}
