//! Metrics emission and aggregation.
//!
//! Components never present metrics; they emit [`MetricEvent`]s into a
//! [`MetricsSink`]. Three sinks ship with the crate:
//!
//! - [`NullMetricsSink`] discards events
//! - [`TracingMetricsSink`] logs them
//! - [`MetricsClient`] forwards them over a channel to a [`MetricsDaemon`],
//!   which folds them into an [`AggregatedState`]
//!
//! [`MetricsSystem`] wires the client and daemon together.
//!
//! ```ignore
//! let system = MetricsSystem::new(&tokio::runtime::Handle::current());
//! let sink: Arc<dyn MetricsSink> = Arc::new(system.client());
//! let manager = Manager::builder(config).metrics(sink).build()?;
//! // ...
//! let snapshot = system.state_snapshot();
//! system.shutdown().await;
//! ```

mod client;
mod daemon;
mod event;
mod sink;
mod state;

pub use client::MetricsClient;
pub use daemon::{MetricsDaemon, SharedMetricsState};
pub use event::{outcome, MetricEvent};
pub use sink::{MetricsSink, NullMetricsSink, RecordingMetricsSink, TracingMetricsSink};
pub use state::{AggregatedState, DurationTotals};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Metrics System
// =============================================================================

/// Client plus daemon, with graceful shutdown.
pub struct MetricsSystem {
    client: MetricsClient,
    state_handle: SharedMetricsState,
    daemon_handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl MetricsSystem {
    /// Creates the system and starts the daemon on `runtime_handle`.
    pub fn new(runtime_handle: &tokio::runtime::Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = MetricsClient::new(tx);

        let daemon = MetricsDaemon::new(rx);
        let state_handle = daemon.state_handle();
        let shutdown = CancellationToken::new();

        let daemon_shutdown = shutdown.clone();
        let daemon_handle = Some(runtime_handle.spawn(async move {
            daemon.run(daemon_shutdown).await;
        }));

        Self {
            client,
            state_handle,
            daemon_handle,
            shutdown,
        }
    }

    pub fn client(&self) -> MetricsClient {
        self.client.clone()
    }

    /// Returns the client as a shareable sink.
    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        Arc::new(self.client.clone())
    }

    pub fn state_handle(&self) -> SharedMetricsState {
        Arc::clone(&self.state_handle)
    }

    /// Returns a copy of the last published state.
    pub fn state_snapshot(&self) -> AggregatedState {
        self.state_handle.read().clone()
    }

    /// Signals the daemon to stop and waits for it.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.daemon_handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.daemon_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for MetricsSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSystem")
            .field("running", &self.is_running())
            .finish()
    }
}
