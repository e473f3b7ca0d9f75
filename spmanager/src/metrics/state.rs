//! Aggregated metrics state maintained by the daemon.

use super::event::MetricEvent;
use crate::task::TaskKind;
use std::collections::HashMap;
use std::time::Instant;

/// Running total of observed durations.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DurationTotals {
    pub count: u64,
    pub total_seconds: f64,
}

impl DurationTotals {
    pub fn record(&mut self, seconds: f64) {
        self.count += 1;
        self.total_seconds += seconds;
    }

    /// Mean duration, zero when nothing was recorded.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_seconds / self.count as f64
        }
    }
}

/// Counters and gauges updated by events.
#[derive(Clone, Debug)]
pub struct AggregatedState {
    /// When the metrics system started.
    pub uptime_start: Instant,

    // =========================================================================
    // Queue Gauges
    // =========================================================================
    /// Last reported length per queue.
    pub queue_sizes: HashMap<String, usize>,
    /// Capacity per queue.
    pub queue_capacities: HashMap<String, usize>,
    /// Time tasks spent queued, per queue.
    pub time_in_queue: HashMap<String, DurationTotals>,
    /// Index rebuilds across all queues.
    pub queue_resets: u64,

    // =========================================================================
    // Task Counters
    // =========================================================================
    /// Outcomes per label.
    pub task_outcomes: HashMap<&'static str, DurationTotals>,
    /// Dispatches per task kind.
    pub dispatched: HashMap<TaskKind, u64>,
}

impl Default for AggregatedState {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatedState {
    pub fn new() -> Self {
        Self {
            uptime_start: Instant::now(),
            queue_sizes: HashMap::new(),
            queue_capacities: HashMap::new(),
            time_in_queue: HashMap::new(),
            queue_resets: 0,
            task_outcomes: HashMap::new(),
            dispatched: HashMap::new(),
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.uptime_start.elapsed()
    }

    /// Applies one event.
    pub fn apply(&mut self, event: MetricEvent) {
        match event {
            MetricEvent::QueueSize { queue, len } => {
                self.queue_sizes.insert(queue, len);
            }
            MetricEvent::QueueCapacity { queue, cap } => {
                self.queue_capacities.insert(queue, cap);
            }
            MetricEvent::TimeInQueue { queue, seconds } => {
                self.time_in_queue.entry(queue).or_default().record(seconds);
            }
            MetricEvent::QueueReset { .. } => {
                self.queue_resets += 1;
            }
            MetricEvent::TaskOutcome { label, seconds } => {
                self.task_outcomes.entry(label).or_default().record(seconds);
            }
            MetricEvent::TaskDispatched { kind } => {
                *self.dispatched.entry(kind).or_insert(0) += 1;
            }
        }
    }

    /// Number of outcomes recorded under `label`.
    pub fn outcome_count(&self, label: &str) -> u64 {
        self.task_outcomes
            .get(label)
            .map(|t| t.count)
            .unwrap_or(0)
    }

    /// Total dispatches across all kinds.
    pub fn total_dispatched(&self) -> u64 {
        self.dispatched.values().sum()
    }
}
