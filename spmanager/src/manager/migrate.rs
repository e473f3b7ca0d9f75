//! Migration surface consumed by the manager.
//!
//! Bucket migration and SP exit both move data between global virtual
//! groups through migrate-GVG tasks. The manager only queues those tasks and
//! forwards their progress; plan construction belongs to a
//! [`MigrationPlanner`].

use crate::error::{ManagerError, ManagerResult};
use crate::spdb::{MigrateGvgProgress, SpDb};
use crate::task::Task;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Swap-out of a storage provider out of a family or a set of groups.
///
/// `vgf_id != 0` swaps out the primary of a whole family; otherwise the
/// provider leaves the listed groups as a secondary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapOutNotice {
    /// Provider being swapped out.
    pub sp_id: u32,
    pub successor_sp_id: u32,
    pub vgf_id: u32,
    pub gvg_ids: Vec<u32>,
}

impl SwapOutNotice {
    pub fn is_family(&self) -> bool {
        self.vgf_id != 0
    }
}

/// Receives migration progress from the manager.
pub trait MigrationPlanner: Send + Sync {
    /// True if a bucket migration plan exists for `bucket_id`.
    fn has_bucket_plan(&self, bucket_id: u64) -> bool;

    /// Records progress reported by an executor for a migrate-GVG task.
    fn update_migrate_progress(&self, task: &Task) -> ManagerResult<()>;

    /// Registers a swap-out and the tasks the manager queued for it.
    fn add_swap_out(&self, notice: &SwapOutNotice, tasks: &[Task]) -> ManagerResult<()>;

    /// Drops buckets whose migration can no longer complete. Returns how
    /// many were discontinued.
    fn discontinue_stale_buckets(&self) -> usize;
}

// =============================================================================
// SP Exit Planner
// =============================================================================

type ProgressKey = (u32, u64, i32);

/// In-memory planner tracking migrate-GVG progress and swap-outs.
///
/// Progress is mirrored to the database so a restart can resume from the
/// last migrated object.
pub struct SpExitPlanner {
    db: Arc<dyn SpDb>,
    bucket_plans: DashSet<u64>,
    progress: DashMap<ProgressKey, MigrateGvgProgress>,
    swap_outs: Mutex<Vec<SwapOutNotice>>,
}

impl SpExitPlanner {
    pub fn new(db: Arc<dyn SpDb>) -> Self {
        Self {
            db,
            bucket_plans: DashSet::new(),
            progress: DashMap::new(),
            swap_outs: Mutex::new(Vec::new()),
        }
    }

    /// Registers an execute plan for a bucket migration.
    pub fn add_bucket_plan(&self, bucket_id: u64) {
        self.bucket_plans.insert(bucket_id);
    }

    pub fn remove_bucket_plan(&self, bucket_id: u64) {
        self.bucket_plans.remove(&bucket_id);
    }

    /// Last progress recorded for `(src_gvg_id, bucket_id, redundancy_idx)`.
    pub fn progress(
        &self,
        src_gvg_id: u32,
        bucket_id: u64,
        redundancy_idx: i32,
    ) -> Option<MigrateGvgProgress> {
        self.progress
            .get(&(src_gvg_id, bucket_id, redundancy_idx))
            .map(|p| p.clone())
    }

    pub fn swap_outs(&self) -> Vec<SwapOutNotice> {
        self.swap_outs.lock().clone()
    }
}

impl MigrationPlanner for SpExitPlanner {
    fn has_bucket_plan(&self, bucket_id: u64) -> bool {
        self.bucket_plans.contains(&bucket_id)
    }

    fn update_migrate_progress(&self, task: &Task) -> ManagerResult<()> {
        let migrate = task.as_migrate_gvg().ok_or(ManagerError::DanglingTask)?;
        let row = MigrateGvgProgress {
            task_key: task.key().to_string(),
            src_gvg_id: migrate.src_gvg_id,
            dest_gvg_id: migrate.dest_gvg_id,
            bucket_id: migrate.bucket_id,
            redundancy_index: migrate.redundancy_idx,
            last_migrated_object_id: migrate.last_migrated_object_id,
            finished: migrate.finished,
        };
        self.db.update_migrate_gvg_progress(&row)?;
        if row.finished {
            info!(task_key = %task.key(), "Migrate gvg task finished");
        }
        self.progress.insert(
            (row.src_gvg_id, row.bucket_id, row.redundancy_index),
            row,
        );
        Ok(())
    }

    fn add_swap_out(&self, notice: &SwapOutNotice, tasks: &[Task]) -> ManagerResult<()> {
        for task in tasks {
            if let Some(m) = task.as_migrate_gvg() {
                self.progress
                    .entry((m.src_gvg_id, m.bucket_id, m.redundancy_idx))
                    .or_insert_with(|| MigrateGvgProgress {
                        task_key: task.key().to_string(),
                        src_gvg_id: m.src_gvg_id,
                        dest_gvg_id: m.dest_gvg_id,
                        bucket_id: m.bucket_id,
                        redundancy_index: m.redundancy_idx,
                        ..Default::default()
                    });
            }
        }
        self.swap_outs.lock().push(notice.clone());
        Ok(())
    }

    fn discontinue_stale_buckets(&self) -> usize {
        debug!(plans = self.bucket_plans.len(), "Discontinue bucket tick");
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spdb::MemorySpDb;

    #[test]
    fn test_progress_is_persisted() {
        let db = Arc::new(MemorySpDb::new());
        let planner = SpExitPlanner::new(db.clone());

        let mut task = Task::new_migrate_gvg(3, 4, 0, 1);
        task.as_migrate_gvg_mut().unwrap().last_migrated_object_id = 42;
        planner.update_migrate_progress(&task).unwrap();

        let row = db.get_migrate_gvg_progress(task.key().as_str()).unwrap();
        assert_eq!(row.last_migrated_object_id, 42);
        assert_eq!(planner.progress(3, 0, 1).unwrap().dest_gvg_id, 4);
    }

    #[test]
    fn test_non_migrate_task_is_dangling() {
        let planner = SpExitPlanner::new(Arc::new(MemorySpDb::new()));
        let err = planner
            .update_migrate_progress(&Task::new_gc_meta())
            .unwrap_err();
        assert_eq!(err, ManagerError::DanglingTask);
    }

    #[test]
    fn test_bucket_plans() {
        let planner = SpExitPlanner::new(Arc::new(MemorySpDb::new()));
        assert!(!planner.has_bucket_plan(9));
        planner.add_bucket_plan(9);
        assert!(planner.has_bucket_plan(9));
        planner.remove_bucket_plan(9);
        assert!(!planner.has_bucket_plan(9));
    }

    #[test]
    fn test_swap_out_registers_tasks() {
        let planner = SpExitPlanner::new(Arc::new(MemorySpDb::new()));
        let notice = SwapOutNotice {
            sp_id: 2,
            successor_sp_id: 1,
            vgf_id: 0,
            gvg_ids: vec![7],
        };
        let tasks = vec![Task::new_migrate_gvg(7, 0, 0, 0)];
        planner.add_swap_out(&notice, &tasks).unwrap();

        assert_eq!(planner.swap_outs(), vec![notice]);
        assert!(planner.progress(7, 0, 0).is_some());
    }
}
