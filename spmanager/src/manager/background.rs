//! Bounded pool for fire-and-forget work spawned from handlers.
//!
//! Handlers produce their visible result first and hand follow-up writes
//! (progress rows, put events, the failed-replicate path) to this pool.
//! A semaphore bounds how many run at once; cancelling the pool's token
//! drops work that has not finished.
//!
//! Outside a tokio runtime the work runs inline on the caller's thread.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Semaphore-gated spawner with in-flight tracking.
pub struct BackgroundPool {
    handle: Option<Handle>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// Decrements the in-flight count when the spawned work ends, however it ends.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl BackgroundPool {
    /// Creates a pool bound to the current runtime, if any.
    pub fn new(concurrency: usize, shutdown: CancellationToken) -> Self {
        Self {
            handle: Handle::try_current().ok(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            shutdown,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Runs `work` in the background. Never blocks on the pool being busy.
    pub fn spawn<F>(&self, name: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            debug!(task = name, "Background pool shut down, dropping work");
            return;
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            idle: Arc::clone(&self.idle),
        };

        let Some(handle) = &self.handle else {
            futures::executor::block_on(work);
            drop(guard);
            return;
        };

        let permits = Arc::clone(&self.permits);
        let shutdown = self.shutdown.clone();
        handle.spawn(async move {
            let _guard = guard;
            let _permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            trace!(task = name, "Background work started");
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(task = name, "Background work cancelled");
                }
                _ = work => {}
            }
        });
    }

    /// Number of spawned units that have not finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Waits until every spawned unit has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Cancels outstanding work and rejects new work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
