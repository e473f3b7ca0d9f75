//! Periodic work owned by the manager.
//!
//! One loop multiplexes four tickers: queue statistics, provider info sync,
//! GC-object generation and, when a planner is attached, discontinuing
//! stale bucket migrations.

use super::Manager;
use crate::queue::Queue;
use crate::task::Task;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval whose first tick is one period from now.
fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

impl Manager {
    pub(crate) async fn event_loop(self: Arc<Self>, shutdown: CancellationToken) {
        if let Err(e) = self.sync_consensus_info().await {
            warn!(error = %e, "Initial provider sync failed");
        }

        let mut statistics = ticker(self.config.statistics_interval);
        let mut sync = ticker(self.config.sync_consensus_info_interval);
        let mut gc = ticker(self.config.gc_object_interval);
        let mut discontinue = ticker(self.config.discontinue_bucket_interval);
        let discontinue_enabled =
            self.config.discontinue_bucket_enabled && self.planner.is_some();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Manager event loop shutting down");
                    break;
                }

                _ = statistics.tick() => {
                    info!(statistics = %self.statistics(), "Manager statistics");
                }

                _ = sync.tick() => {
                    if let Err(e) = self.sync_consensus_info().await {
                        warn!(error = %e, "Failed to sync provider info");
                    }
                }

                _ = gc.tick() => {
                    self.generate_gc_object_task().await;
                }

                _ = discontinue.tick(), if discontinue_enabled => {
                    if let Some(planner) = &self.planner {
                        let discontinued = planner.discontinue_stale_buckets();
                        if discontinued > 0 {
                            info!(discontinued, "Discontinued stale bucket migrations");
                        }
                    }
                }
            }
        }
    }

    /// Queues a GC-object task for the next block range once the chain is
    /// far enough past it. Returns whether a task was queued.
    pub async fn generate_gc_object_task(&self) -> bool {
        let start = self.gc_block_height();
        let end = start + self.config.gc_object_block_interval;
        let height = match self.chain.current_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!(error = %e, "Failed to query chain height");
                return false;
            }
        };
        if end + self.config.gc_object_safe_block_distance >= height {
            debug!(start, end, height, "GC range not yet safe");
            return false;
        }

        let policy = self.config.tasks.gc_object;
        let task = Task::new_gc_object(start, end)
            .with_priority(policy.priority)
            .with_timeout(policy.timeout)
            .with_max_retry(policy.max_retry);
        let key = task.key().to_string();
        if let Err(e) = self.queues.gc_object.push(task) {
            warn!(start, end, error = %e, "Failed to push gc object task");
            return false;
        }
        self.advance_gc_block_height(end + 1);
        if let Err(e) = self.db.set_gc_object_progress(&key, start, end) {
            error!(task_key = %key, error = %e, "Failed to persist gc object progress");
        }
        self.refresh_backup();
        info!(start, end, "Generated gc object task");
        true
    }

    /// Refreshes the provider list and this provider's own row.
    pub async fn sync_consensus_info(&self) -> crate::error::ManagerResult<()> {
        let sps = self.chain.list_sps().await?;
        self.db.update_all_sp(&sps)?;
        match sps
            .iter()
            .find(|sp| sp.operator_address.eq_ignore_ascii_case(&self.config.operator_address))
        {
            Some(own) => self.db.set_own_sp_info(own)?,
            None => warn!(operator = %self.config.operator_address, "Own provider not found on chain"),
        }
        debug!(sps = sps.len(), "Synced provider info");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::spdb::SpDb;

    fn gc_config() -> crate::manager::ManagerConfig {
        let mut config = config();
        config.gc_object_block_interval = 500;
        config.gc_object_safe_block_distance = 1000;
        config
    }

    #[tokio::test]
    async fn test_gc_task_generated_once_range_is_safe() {
        let chain = chain();
        chain.set_height(1700);
        let f = fixture_with(gc_config(), chain);
        f.manager.advance_gc_block_height(100);

        assert!(f.manager.generate_gc_object_task().await);
        assert_eq!(f.manager.gc_block_height(), 601);
        let rows = f.db.get_gc_metas_to_gc(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_block_height, 100);
        assert_eq!(rows[0].end_block_height, 600);
        assert_eq!(f.manager.statistics().queue_len("gc_object"), Some(1));

        assert!(!f.manager.generate_gc_object_task().await);
        assert_eq!(f.manager.gc_block_height(), 601);
    }

    #[tokio::test]
    async fn test_gc_skips_at_exact_safe_distance() {
        let chain = chain();
        chain.set_height(1500);
        let f = fixture_with(gc_config(), chain);
        assert!(!f.manager.generate_gc_object_task().await);
        assert_eq!(f.manager.gc_block_height(), 0);
    }

    #[tokio::test]
    async fn test_sync_consensus_info() {
        let f = fixture().await;
        f.manager.sync_consensus_info().await.unwrap();
        assert_eq!(f.db.get_all_sp().unwrap().len(), 8);
        assert_eq!(f.db.get_own_sp_info().unwrap().id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_loop_stops_on_cancel() {
        let chain = chain();
        chain.set_height(10_000);
        let mut config = gc_config();
        config.gc_object_interval = Duration::from_secs(1);
        let f = fixture_with(config, chain);
        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&f.manager).event_loop(token.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
        handle.await.unwrap();
        assert_eq!(f.manager.gc_block_height(), 501);
        assert_eq!(f.db.get_own_sp_info().unwrap().id, 1);
    }
}
