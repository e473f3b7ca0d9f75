//! Metrics aggregation daemon.
//!
//! The [`MetricsDaemon`] owns the mutable [`AggregatedState`] and is its only
//! writer. Readers go through a shared handle that the daemon refreshes on a
//! fixed interval and once more on shutdown.

use super::event::MetricEvent;
use super::state::AggregatedState;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Interval between publications of the shared state.
const PUBLISH_INTERVAL: Duration = Duration::from_millis(500);

/// Shared state handle for read-only access.
pub type SharedMetricsState = Arc<RwLock<AggregatedState>>;

/// The metrics aggregation daemon.
pub struct MetricsDaemon {
    rx: mpsc::UnboundedReceiver<MetricEvent>,
    state: AggregatedState,
    shared_state: SharedMetricsState,
}

impl MetricsDaemon {
    pub fn new(rx: mpsc::UnboundedReceiver<MetricEvent>) -> Self {
        Self {
            rx,
            state: AggregatedState::new(),
            shared_state: Arc::new(RwLock::new(AggregatedState::new())),
        }
    }

    pub fn state_handle(&self) -> SharedMetricsState {
        Arc::clone(&self.shared_state)
    }

    /// Runs the daemon until shutdown is signaled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("Metrics daemon starting");

        let mut publish_interval = tokio::time::interval(PUBLISH_INTERVAL);
        publish_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Metrics daemon shutting down");
                    break;
                }

                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.state.apply(event),
                        None => break,
                    }
                }

                _ = publish_interval.tick() => {
                    self.publish();
                }
            }
        }

        // Drain whatever was sent before shutdown
        while let Ok(event) = self.rx.try_recv() {
            self.state.apply(event);
        }
        self.publish();
        tracing::debug!("Metrics daemon stopped");
    }

    fn publish(&self) {
        *self.shared_state.write() = self.state.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_publishes_on_shutdown() {
        let (tx, rx) = mpsc::unbounded_channel();
        let daemon = MetricsDaemon::new(rx);
        let handle = daemon.state_handle();
        let shutdown = CancellationToken::new();

        tx.send(MetricEvent::QueueReset {
            queue: "gc_object".into(),
        })
        .unwrap();
        shutdown.cancel();
        daemon.run(shutdown).await;

        assert_eq!(handle.read().queue_resets, 1);
    }

    #[tokio::test]
    async fn test_daemon_stops_when_senders_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let daemon = MetricsDaemon::new(rx);
        let handle = daemon.state_handle();

        tx.send(MetricEvent::TaskOutcome {
            label: "succeed_upload",
            seconds: 1.0,
        })
        .unwrap();
        drop(tx);
        daemon.run(CancellationToken::new()).await;

        assert_eq!(handle.read().outcome_count("succeed_upload"), 1);
    }
}
