//! Metrics emission layer.
//!
//! The [`MetricsClient`] is a fire-and-forget [`MetricsSink`] backed by an
//! unbounded channel to the [`MetricsDaemon`](super::MetricsDaemon). It is
//! cheap to clone and never blocks; events sent after the daemon stopped
//! are dropped.

use super::event::MetricEvent;
use super::sink::MetricsSink;
use crate::task::TaskKind;
use tokio::sync::mpsc;

/// Client for emitting metric events to the metrics daemon.
#[derive(Clone, Debug)]
pub struct MetricsClient {
    tx: mpsc::UnboundedSender<MetricEvent>,
}

impl MetricsClient {
    /// Creates a new metrics client with the given channel sender.
    pub fn new(tx: mpsc::UnboundedSender<MetricEvent>) -> Self {
        Self { tx }
    }

    #[inline]
    fn send(&self, event: MetricEvent) {
        // Daemon may have shut down
        let _ = self.tx.send(event);
    }

    /// Records a task outcome.
    #[inline]
    pub fn task_outcome(&self, label: &'static str, seconds: f64) {
        self.send(MetricEvent::TaskOutcome { label, seconds });
    }

    /// Records a dispatched task.
    #[inline]
    pub fn task_dispatched(&self, kind: TaskKind) {
        self.send(MetricEvent::TaskDispatched { kind });
    }
}

impl MetricsSink for MetricsClient {
    fn emit(&self, event: MetricEvent) {
        self.send(event);
    }
}
