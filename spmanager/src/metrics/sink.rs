//! Sinks that receive metric events.

use super::event::MetricEvent;
use parking_lot::Mutex;

/// Receiver of metric events.
///
/// Implementations must be fast and non-blocking; queues call `emit` while
/// holding their lock.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: MetricEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn emit(&self, _event: MetricEvent) {}
}

/// Sink that logs events using the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn emit(&self, event: MetricEvent) {
        match &event {
            MetricEvent::QueueSize { queue, len } => {
                tracing::trace!(queue = %queue, len = len, "Queue size");
            }
            MetricEvent::QueueCapacity { queue, cap } => {
                tracing::debug!(queue = %queue, cap = cap, "Queue capacity");
            }
            MetricEvent::TimeInQueue { queue, seconds } => {
                tracing::trace!(queue = %queue, seconds = seconds, "Time in queue");
            }
            MetricEvent::QueueReset { queue } => {
                tracing::warn!(queue = %queue, "Queue reset");
            }
            MetricEvent::TaskOutcome { label, seconds } => {
                tracing::debug!(label = label, seconds = seconds, "Task outcome");
            }
            MetricEvent::TaskDispatched { kind } => {
                tracing::debug!(kind = %kind, "Task dispatched");
            }
        }
    }
}

/// Sink that records every event in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event recorded so far.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    /// Number of queue resets recorded.
    pub fn reset_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, MetricEvent::QueueReset { .. }))
            .count()
    }

    /// Number of outcomes recorded under `label`.
    pub fn outcome_count(&self, label: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, MetricEvent::TaskOutcome { label: l, .. } if *l == label))
            .count()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn emit(&self, event: MetricEvent) {
        self.events.lock().push(event);
    }
}
