//! Common task header shared by every task kind.

use super::key::TaskKey;
use crate::time::now_unix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task priority. Higher values win more often in weighted dispatch.
pub type TaskPriority = u8;

/// Priority of a task that must never be scheduled.
pub const UNSCHEDULING_PRIORITY: TaskPriority = 0;

/// Priority used for recovery and other background work.
pub const DEFAULT_SMALLER_PRIORITY: TaskPriority = 85;

/// Priority used for pipeline work such as replicate and seal.
pub const DEFAULT_LARGER_PRIORITY: TaskPriority = 170;

/// Highest task priority.
pub const MAX_TASK_PRIORITY: TaskPriority = 255;

/// Error reported by an executor for a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Error code, zero when unknown.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for TaskError {}

/// Bookkeeping fields carried by every task.
///
/// Timestamps are unix seconds. `timeout` is relative to `update_time`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHeader {
    pub key: TaskKey,
    pub priority: TaskPriority,
    pub create_time: i64,
    pub update_time: i64,
    pub retry: i64,
    pub max_retry: i64,
    pub timeout: i64,
    pub error: Option<TaskError>,
    /// Address of the executor the task was last handed to.
    pub address: String,
    /// Append-only trail of pipeline steps, used for diagnostics.
    pub logs: String,
}

impl TaskHeader {
    /// Creates a header stamped with the current time.
    pub fn new(key: TaskKey, priority: TaskPriority, timeout: i64, max_retry: i64) -> Self {
        let now = now_unix();
        Self {
            key,
            priority,
            create_time: now,
            update_time: now,
            retry: 0,
            max_retry,
            timeout,
            error: None,
            address: String::new(),
            logs: String::new(),
        }
    }

    /// True once the task has been retried more times than allowed.
    pub fn exceed_retry(&self) -> bool {
        self.retry > self.max_retry
    }

    /// True once the last update is older than the timeout.
    pub fn exceed_timeout(&self) -> bool {
        self.exceed_timeout_at(now_unix())
    }

    pub fn exceed_timeout_at(&self, now: i64) -> bool {
        self.update_time.saturating_add(self.timeout) < now
    }

    /// A task is expired when it is both out of retries and timed out.
    pub fn expired(&self) -> bool {
        self.exceed_retry() && self.exceed_timeout()
    }

    pub fn append_log(&mut self, entry: &str) {
        if !self.logs.is_empty() {
            self.logs.push('/');
        }
        self.logs.push_str(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> TaskHeader {
        TaskHeader::new(TaskKey::new("k"), DEFAULT_LARGER_PRIORITY, 10, 3)
    }

    #[test]
    fn test_exceed_retry_is_strict() {
        let mut h = header();
        h.retry = 3;
        assert!(!h.exceed_retry());
        h.retry = 4;
        assert!(h.exceed_retry());
    }

    #[test]
    fn test_exceed_timeout_relative_to_update_time() {
        let mut h = header();
        h.update_time = 1_000;
        assert!(!h.exceed_timeout_at(1_010));
        assert!(h.exceed_timeout_at(1_011));
    }

    #[test]
    fn test_expired_requires_both_conditions() {
        let mut h = header();
        h.retry = 5;
        assert!(!h.expired(), "fresh update_time keeps the task alive");
        h.update_time -= 100;
        assert!(h.expired());
        h.retry = 0;
        assert!(!h.expired());
    }

    #[test]
    fn test_append_log() {
        let mut h = header();
        h.append_log("manager-create-replicate-task");
        h.append_log("retry:1");
        assert_eq!(h.logs, "manager-create-replicate-task/retry:1");
    }

    #[test]
    fn test_task_error_display() {
        assert_eq!(TaskError::new("boom").to_string(), "boom");
        assert_eq!(TaskError::with_code(7, "boom").to_string(), "[7] boom");
    }
}
