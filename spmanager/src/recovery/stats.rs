//! Per-object segment accounting for in-flight recoveries.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct SegmentRecord {
    segment_count: u32,
    succeeded: HashSet<u32>,
    failed: HashSet<u32>,
}

impl SegmentRecord {
    fn processed(&self) -> usize {
        self.succeeded.union(&self.failed).count()
    }
}

/// Tracks which segments of each object under recovery have been reported.
///
/// Written by the recover-piece handler, read by the recovery monitor.
#[derive(Debug, Default)]
pub struct ObjectSegmentsStats {
    records: RwLock<HashMap<u64, SegmentRecord>>,
}

impl ObjectSegmentsStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking an object, replacing any previous record.
    pub fn put(&self, object_id: u64, segment_count: u32) {
        self.records.write().insert(
            object_id,
            SegmentRecord {
                segment_count,
                ..Default::default()
            },
        );
    }

    pub fn has(&self, object_id: u64) -> bool {
        self.records.read().contains_key(&object_id)
    }

    pub fn remove(&self, object_id: u64) {
        self.records.write().remove(&object_id);
    }

    /// Records the outcome of one segment. Untracked objects are ignored.
    pub fn add_segment(&self, object_id: u64, success: bool, segment_idx: u32) {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(&object_id) else {
            return;
        };
        if success {
            record.succeeded.insert(segment_idx);
        } else {
            record.failed.insert(segment_idx);
        }
    }

    /// True once every segment has reported, successfully or not.
    pub fn is_processed(&self, object_id: u64) -> bool {
        self.records
            .read()
            .get(&object_id)
            .is_some_and(|r| r.processed() == r.segment_count as usize)
    }

    /// True once every segment has reported and at least one failed without
    /// later succeeding.
    pub fn is_recover_failed(&self, object_id: u64) -> bool {
        let records = self.records.read();
        let Some(record) = records.get(&object_id) else {
            return false;
        };
        if record.succeeded.len() == record.segment_count as usize {
            return false;
        }
        record.processed() == record.segment_count as usize && !record.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
