//! The task manager.
//!
//! [`Manager`] owns one queue per task kind and drives every object through
//! the upload → replicate → seal pipeline. Executors report progress through
//! the `handle_*` methods and poll for work with [`Manager::dispatch`]; the
//! event loop generates GC work and keeps provider info in sync, while the
//! recovery and retry schedulers restore work the queues lost.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spmanager::client::SimulatedChain;
//! use spmanager::manager::{Manager, ManagerConfig};
//! use spmanager::resource::default_executor_budget;
//! use spmanager::spdb::MemorySpDb;
//!
//! let chain = Arc::new(SimulatedChain::new());
//! let manager = Manager::builder(ManagerConfig::default().with_operator_address("0xsp1"))
//!     .chain(chain.clone())
//!     .meta(chain)
//!     .db(Arc::new(MemorySpDb::new()))
//!     .build()?;
//!
//! manager.start().await?;
//! let task = manager.dispatch(&default_executor_budget(), "executor-1");
//! ```

mod background;
mod config;
mod dispatch;
mod event_loop;
mod handlers;
mod migrate;
mod picking;
mod startup;
mod strategy;

pub use background::BackgroundPool;
pub use config::{
    queue_names, ManagerConfig, QueueCapacities, TaskPolicies, TaskPolicy,
    DEFAULT_BACKGROUND_CONCURRENCY,
};
pub use dispatch::pick_up_with;
pub use migrate::{MigrationPlanner, SpExitPlanner, SwapOutNotice};
pub use strategy::{
    filter_gc, filter_migrate_gvg, filter_receive, filter_uploading, EXPIRED_DESCRIPTION,
};

use crate::client::{BoxFuture, Consensus, MetaClient};
use crate::error::{ManagerError, ManagerResult};
use crate::metrics::{MetricsSink, NullMetricsSink};
use crate::queue::{LimitTaskQueue, Queue, TaskQueue};
use crate::recovery::RecoveryContext;
use crate::resource::ResourceBudget;
use crate::retry::{RetryTarget, TaskRetryScheduler};
use crate::spdb::SpDb;
use crate::task::Task;
use crate::time::now_unix;
use crate::vgm::{GvgMeta, VirtualGroupManager};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Queues
// =============================================================================

/// One queue per task kind.
pub(crate) struct Queues {
    pub upload: Arc<TaskQueue>,
    pub resumable_upload: Arc<TaskQueue>,
    pub replicate: Arc<LimitTaskQueue>,
    pub seal: Arc<LimitTaskQueue>,
    pub receive: Arc<LimitTaskQueue>,
    pub gc_object: Arc<LimitTaskQueue>,
    pub gc_zombie: Arc<LimitTaskQueue>,
    pub gc_meta: Arc<LimitTaskQueue>,
    pub download: Arc<TaskQueue>,
    pub challenge: Arc<TaskQueue>,
    pub recovery: Arc<LimitTaskQueue>,
    pub migrate_gvg: Arc<LimitTaskQueue>,
}

impl Queues {
    fn new(caps: &QueueCapacities, metrics: &Arc<dyn MetricsSink>) -> Self {
        let basic = |name: &str, cap: usize| Arc::new(TaskQueue::new(name, cap, Arc::clone(metrics)));
        let limit =
            |name: &str, cap: usize| Arc::new(LimitTaskQueue::new(name, cap, Arc::clone(metrics)));
        Self {
            upload: basic(queue_names::UPLOAD, caps.upload),
            resumable_upload: basic(queue_names::RESUMABLE_UPLOAD, caps.resumable_upload),
            replicate: limit(queue_names::REPLICATE, caps.replicate),
            seal: limit(queue_names::SEAL, caps.seal),
            receive: limit(queue_names::RECEIVE, caps.receive),
            gc_object: limit(queue_names::GC_OBJECT, caps.gc_object),
            gc_zombie: limit(queue_names::GC_ZOMBIE, caps.gc_zombie),
            gc_meta: limit(queue_names::GC_META, caps.gc_meta),
            download: basic(queue_names::DOWNLOAD, caps.download),
            challenge: basic(queue_names::CHALLENGE, caps.challenge),
            recovery: limit(queue_names::RECOVERY, caps.recovery),
            migrate_gvg: limit(queue_names::MIGRATE_GVG, caps.migrate_gvg),
        }
    }

    /// Every queue, in the order tasks are reported by `query_tasks`.
    fn all(&self) -> [&dyn Queue; 12] {
        [
            self.upload.as_ref(),
            self.resumable_upload.as_ref(),
            self.replicate.as_ref(),
            self.receive.as_ref(),
            self.seal.as_ref(),
            self.gc_object.as_ref(),
            self.gc_zombie.as_ref(),
            self.gc_meta.as_ref(),
            self.download.as_ref(),
            self.challenge.as_ref(),
            self.recovery.as_ref(),
            self.migrate_gvg.as_ref(),
        ]
    }

    /// Queues that dispatch hands work out of.
    fn dispatchable(&self) -> [&LimitTaskQueue; 8] {
        [
            self.replicate.as_ref(),
            self.seal.as_ref(),
            self.gc_object.as_ref(),
            self.gc_zombie.as_ref(),
            self.gc_meta.as_ref(),
            self.receive.as_ref(),
            self.recovery.as_ref(),
            self.migrate_gvg.as_ref(),
        ]
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of queue lengths and cursors, logged by the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatistics {
    /// `(queue name, length)` for every queue.
    pub queues: Vec<(String, usize)>,
    pub gc_block_height: u64,
    /// Tasks eligible for dispatch at the last refresh.
    pub backup: usize,
}

impl ManagerStatistics {
    pub fn queue_len(&self, name: &str) -> Option<usize> {
        self.queues
            .iter()
            .find(|(queue, _)| queue == name)
            .map(|(_, len)| *len)
    }
}

impl fmt::Display for ManagerStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, len) in &self.queues {
            write!(f, "{}[{}] ", name, len)?;
        }
        write!(f, "gc_block_height[{}] backup[{}]", self.gc_block_height, self.backup)
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Task scheduler of a storage provider.
pub struct Manager {
    config: ManagerConfig,
    queues: Queues,
    db: Arc<dyn SpDb>,
    chain: Arc<dyn Consensus>,
    meta: Arc<dyn MetaClient>,
    vgm: Arc<VirtualGroupManager>,
    recovery: Arc<RecoveryContext>,
    planner: Option<Arc<dyn MigrationPlanner>>,
    metrics: Arc<dyn MetricsSink>,
    background: Arc<BackgroundPool>,

    gc_block_height: AtomicU64,
    backup: AtomicUsize,
    dispatch_lock: Mutex<()>,
    migrate_lock: Mutex<()>,

    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    this: Weak<Manager>,
}

impl Manager {
    pub fn builder(config: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::new(config)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn vgm(&self) -> &Arc<VirtualGroupManager> {
        &self.vgm
    }

    pub fn recovery(&self) -> &Arc<RecoveryContext> {
        &self.recovery
    }

    pub fn background(&self) -> &Arc<BackgroundPool> {
        &self.background
    }

    pub fn db(&self) -> &Arc<dyn SpDb> {
        &self.db
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Lowest block not yet covered by a GC-object task.
    pub fn gc_block_height(&self) -> u64 {
        self.gc_block_height.load(Ordering::Acquire)
    }

    /// Moves the GC cursor forward. Never moves it back.
    pub(crate) fn advance_gc_block_height(&self, height: u64) {
        self.gc_block_height.fetch_max(height, Ordering::AcqRel);
    }

    /// Objects currently anywhere in the upload pipeline.
    pub fn uploading_count(&self) -> usize {
        self.queues.upload.len()
            + self.queues.resumable_upload.len()
            + self.queues.replicate.len()
            + self.queues.seal.len()
    }

    /// True if `task`'s key sits in any upload pipeline queue.
    pub fn task_uploading(&self, task: &Task) -> bool {
        let key = task.key();
        self.queues.upload.has(key)
            || self.queues.resumable_upload.has(key)
            || self.queues.replicate.has(key)
            || self.queues.seal.has(key)
    }

    pub fn statistics(&self) -> ManagerStatistics {
        ManagerStatistics {
            queues: self
                .queues
                .all()
                .iter()
                .map(|q| (q.name().to_string(), q.len()))
                .collect(),
            gc_block_height: self.gc_block_height(),
            backup: self.backup.load(Ordering::Acquire),
        }
    }

    /// Tasks in any queue whose key contains `sub_key`.
    pub fn query_tasks(&self, sub_key: &str) -> Vec<Task> {
        let mut tasks = Vec::new();
        for queue in self.queues.all() {
            queue.scan(&mut |task: &Task| {
                if task.key().contains(sub_key) {
                    tasks.push(task.clone());
                }
            });
        }
        tasks
    }

    /// Recounts the tasks dispatch could hand out right now.
    pub(crate) fn refresh_backup(&self) {
        let _guard = self.dispatch_lock.lock();
        let unlimited = ResourceBudget::unlimited();
        let count = self
            .queues
            .dispatchable()
            .iter()
            .filter(|q| q.top_by_limit(&unlimited).is_some())
            .count();
        self.backup.store(count, Ordering::Release);
    }

    pub(crate) fn emit_outcome(&self, label: &'static str, since: i64) {
        let seconds = (now_unix() - since).max(0) as f64;
        self.metrics
            .emit(crate::metrics::MetricEvent::TaskOutcome { label, seconds });
    }

    /// Strong handle to this manager, for work that outlives the caller.
    pub(crate) fn arc(&self) -> Option<Arc<Manager>> {
        self.this.upgrade()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Loads persisted work and starts every long-lived loop.
    ///
    /// Calling `start` twice is a no-op.
    pub async fn start(&self) -> ManagerResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Manager already started");
            return Ok(());
        }
        let this = self.arc().ok_or(ManagerError::CanceledTask)?;

        self.load_tasks_from_db().await?;
        if let Err(e) = self.vgm.refresh().await {
            warn!(error = %e, "Initial virtual group refresh failed");
        }

        let mut handles = Vec::new();
        handles.push(tokio::spawn(
            Arc::clone(&self.vgm).run(self.shutdown.child_token()),
        ));
        handles.push(tokio::spawn(
            Arc::clone(&this).event_loop(self.shutdown.child_token()),
        ));

        if self.config.retry.enabled {
            let target: Arc<dyn RetryTarget> = this;
            let retry = Arc::new(TaskRetryScheduler::new(
                Arc::clone(&self.db),
                Arc::clone(&self.chain),
                Arc::clone(&self.meta),
                target,
                self.config.tasks.replicate,
                self.config.retry.clone(),
            ));
            handles.extend(retry.start(self.shutdown.child_token()));
        } else {
            info!("Task retry scheduler disabled");
        }

        self.recovery.resume()?;
        self.handles.lock().extend(handles);
        info!(
            operator = %self.config.operator_address,
            gc_block_height = self.gc_block_height(),
            "Manager started"
        );
        Ok(())
    }

    /// Starts recovery of a family (`vgf_id != 0`) or a single group.
    pub async fn trigger_recover(
        &self,
        vgf_id: u32,
        gvg_id: u32,
        redundancy_index: i32,
    ) -> ManagerResult<()> {
        self.recovery
            .start_recovery(vgf_id, gvg_id, redundancy_index)
            .await
    }

    /// Cancels every loop and pending background write, then waits for the
    /// loops to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                debug!(error = %e, "Manager loop ended abnormally");
            }
        }
        info!("Manager stopped");
    }
}

impl RetryTarget for Manager {
    fn pick_gvg(&self, vgf_id: u32) -> BoxFuture<'_, ManagerResult<GvgMeta>> {
        Box::pin(async move {
            let params = self
                .chain
                .query_storage_params_by_timestamp(now_unix())
                .await?;
            self.pick_global_virtual_group(vgf_id, params).await
        })
    }

    fn push_replicate(&self, task: Task) -> ManagerResult<()> {
        {
            let _guard = self.dispatch_lock.lock();
            if self.task_uploading(&task) {
                return Err(ManagerError::RepeatedTask);
            }
            self.queues.replicate.push(task)?;
        }
        self.refresh_backup();
        Ok(())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for a [`Manager`].
///
/// The chain, metadata and database backends are required; metrics default
/// to [`NullMetricsSink`] and the migration planner is optional.
pub struct ManagerBuilder {
    config: ManagerConfig,
    chain: Option<Arc<dyn Consensus>>,
    meta: Option<Arc<dyn MetaClient>>,
    db: Option<Arc<dyn SpDb>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    planner: Option<Arc<dyn MigrationPlanner>>,
    shutdown: Option<CancellationToken>,
}

/// A required backend was not supplied to the [`ManagerBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("manager builder is missing {0}")]
pub struct MissingBackend(pub &'static str);

impl ManagerBuilder {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            chain: None,
            meta: None,
            db: None,
            metrics: None,
            planner: None,
            shutdown: None,
        }
    }

    pub fn chain(mut self, chain: Arc<dyn Consensus>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn meta(mut self, meta: Arc<dyn MetaClient>) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn db(mut self, db: Arc<dyn SpDb>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn planner(mut self, planner: Arc<dyn MigrationPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Token whose cancellation stops the manager. Defaults to a new one.
    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Creates the queues, installs their strategies and wires the
    /// recovery context onto the shared recovery queue.
    pub fn build(self) -> Result<Arc<Manager>, MissingBackend> {
        let chain = self.chain.ok_or(MissingBackend("chain"))?;
        let meta = self.meta.ok_or(MissingBackend("meta"))?;
        let db = self.db.ok_or(MissingBackend("db"))?;
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NullMetricsSink));
        let shutdown = self.shutdown.unwrap_or_default();
        let config = self.config;

        let queues = Queues::new(&config.queues, &metrics);
        let background = Arc::new(BackgroundPool::new(
            config.background_concurrency,
            shutdown.child_token(),
        ));
        strategy::install(&queues, &db, &background);

        let vgm = Arc::new(VirtualGroupManager::new(
            config.operator_address.clone(),
            Arc::clone(&chain),
            config.vgm.clone(),
        ));
        let recovery = Arc::new(RecoveryContext::new(
            Arc::clone(&queues.recovery),
            Arc::clone(&db),
            Arc::clone(&chain),
            Arc::clone(&meta),
            config.recovery.clone(),
            config.tasks.recovery,
            config.operator_address.clone(),
            shutdown.child_token(),
        ));

        Ok(Arc::new_cyclic(|this| Manager {
            config,
            queues,
            db,
            chain,
            meta,
            vgm,
            recovery,
            planner: self.planner,
            metrics,
            background,
            gc_block_height: AtomicU64::new(0),
            backup: AtomicUsize::new(0),
            dispatch_lock: Mutex::new(()),
            migrate_lock: Mutex::new(()),
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            shutdown,
            this: this.clone(),
        }))
    }
}
