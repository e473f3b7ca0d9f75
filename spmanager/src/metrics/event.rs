//! Metric events emitted by queues and the manager.

use crate::task::TaskKind;

/// Events emitted to a [`MetricsSink`](super::MetricsSink).
///
/// Producers never wait on consumers; every event is a self-contained fact.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricEvent {
    // =========================================================================
    // Queue Events
    // =========================================================================
    /// Current length of a queue after a mutation.
    QueueSize { queue: String, len: usize },

    /// Capacity of a queue, emitted once on creation.
    QueueCapacity { queue: String, cap: usize },

    /// How long a task sat in a queue before it was popped.
    TimeInQueue { queue: String, seconds: f64 },

    /// A queue detected an inconsistent index and rebuilt it.
    QueueReset { queue: String },

    // =========================================================================
    // Manager Events
    // =========================================================================
    /// A pipeline task finished, successfully or not.
    ///
    /// `label` is one of the `succeed_*`, `failed_*` or `cancel_*` outcome
    /// labels defined in [`outcome`].
    TaskOutcome { label: &'static str, seconds: f64 },

    /// A task was handed to an executor by dispatch.
    TaskDispatched { kind: TaskKind },
}

/// Task outcome labels.
pub mod outcome {
    pub const SUCCEED_UPLOAD: &str = "succeed_upload";
    pub const FAILED_UPLOAD: &str = "failed_upload";
    pub const SUCCEED_REPLICATE: &str = "succeed_replicate";
    pub const FAILED_REPLICATE: &str = "failed_replicate";
    pub const SUCCEED_REPLICATE_AND_SEAL: &str = "succeed_replicate_and_seal";
    pub const FAILED_REPLICATE_AND_SEAL: &str = "failed_replicate_and_seal";
    pub const CANCEL_REPLICATE: &str = "cancel_replicate";
    pub const SUCCEED_SEAL: &str = "succeed_seal";
    pub const FAILED_SEAL: &str = "failed_seal";
    pub const CANCEL_SEAL: &str = "cancel_seal";
    pub const SUCCEED_CONFIRM_RECEIVE: &str = "succeed_confirm_receive";
    pub const FAILED_CONFIRM_RECEIVE: &str = "failed_confirm_receive";
}
