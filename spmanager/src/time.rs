//! Time-related utility functions.
//!
//! Task timestamps and persisted progress rows are expressed in unix seconds,
//! the same unit the chain and the database use.

use chrono::Utc;
use std::time::Duration;

/// Returns the current wall-clock time in unix seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Returns how long ago `timestamp` (unix seconds) was.
///
/// Timestamps in the future yield a zero duration.
pub fn elapsed_since(timestamp: i64) -> Duration {
    let delta = now_unix().saturating_sub(timestamp);
    Duration::from_secs(delta.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_unix_is_after_2020() {
        assert!(now_unix() > 1_577_836_800);
    }

    #[test]
    fn elapsed_since_past() {
        let elapsed = elapsed_since(now_unix() - 60);
        assert!(elapsed >= Duration::from_secs(59));
        assert!(elapsed <= Duration::from_secs(61));
    }

    #[test]
    fn elapsed_since_future_is_zero() {
        assert_eq!(elapsed_since(now_unix() + 600), Duration::ZERO);
    }
}
