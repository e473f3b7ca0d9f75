//! In-memory [`SpDb`] with JSON snapshots.

use super::types::*;
use super::{DbError, DbResult, SpDb};
use crate::client::types::StorageProvider;
use crate::time::now_unix;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

#[derive(Default)]
struct Tables {
    upload: BTreeMap<u64, UploadObjectMeta>,
    put_events: Vec<PutObjectEvent>,
    gc: BTreeMap<String, GcObjectMeta>,
    recover_stats: BTreeMap<u32, RecoverGvgStats>,
    recover_failed: BTreeMap<u64, RecoverFailedObject>,
    integrity: HashMap<(u64, i32), IntegrityMeta>,
    piece_checksums: HashMap<(u64, u32, i32), Vec<u8>>,
    migrate: BTreeMap<String, MigrateGvgProgress>,
    sps: BTreeMap<u32, StorageProvider>,
    own_sp: Option<StorageProvider>,
}

/// Serializable image of every table.
#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    upload: Vec<UploadObjectMeta>,
    put_events: Vec<PutObjectEvent>,
    gc: Vec<GcObjectMeta>,
    recover_stats: Vec<RecoverGvgStats>,
    recover_failed: Vec<RecoverFailedObject>,
    integrity: Vec<IntegrityMeta>,
    piece_checksums: Vec<(u64, u32, i32, Vec<u8>)>,
    migrate: Vec<MigrateGvgProgress>,
    sps: Vec<StorageProvider>,
    own_sp: Option<StorageProvider>,
}

impl From<&Tables> for Snapshot {
    fn from(t: &Tables) -> Self {
        let mut piece_checksums: Vec<_> = t
            .piece_checksums
            .iter()
            .map(|(&(o, s, r), c)| (o, s, r, c.clone()))
            .collect();
        piece_checksums.sort();
        let mut integrity: Vec<_> = t.integrity.values().cloned().collect();
        integrity.sort_by_key(|m| (m.object_id, m.redundancy_index));
        Self {
            upload: t.upload.values().cloned().collect(),
            put_events: t.put_events.clone(),
            gc: t.gc.values().cloned().collect(),
            recover_stats: t.recover_stats.values().cloned().collect(),
            recover_failed: t.recover_failed.values().cloned().collect(),
            integrity,
            piece_checksums,
            migrate: t.migrate.values().cloned().collect(),
            sps: t.sps.values().cloned().collect(),
            own_sp: t.own_sp.clone(),
        }
    }
}

impl From<Snapshot> for Tables {
    fn from(s: Snapshot) -> Self {
        Self {
            upload: s.upload.into_iter().map(|m| (m.object_id, m)).collect(),
            put_events: s.put_events,
            gc: s.gc.into_iter().map(|m| (m.task_key.clone(), m)).collect(),
            recover_stats: s.recover_stats.into_iter().map(|r| (r.gvg_id, r)).collect(),
            recover_failed: s
                .recover_failed
                .into_iter()
                .map(|r| (r.object_id, r))
                .collect(),
            integrity: s
                .integrity
                .into_iter()
                .map(|m| ((m.object_id, m.redundancy_index), m))
                .collect(),
            piece_checksums: s
                .piece_checksums
                .into_iter()
                .map(|(o, seg, r, c)| ((o, seg, r), c))
                .collect(),
            migrate: s
                .migrate
                .into_iter()
                .map(|p| (p.task_key.clone(), p))
                .collect(),
            sps: s.sps.into_iter().map(|sp| (sp.id, sp)).collect(),
            own_sp: s.own_sp,
        }
    }
}

/// Process-local database.
///
/// Every operation runs under one lock, so writes are visible to the next
/// read. State survives restarts only through [`MemorySpDb::save`] and
/// [`MemorySpDb::load`].
#[derive(Default)]
pub struct MemorySpDb {
    tables: RwLock<Tables>,
}

impl MemorySpDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes every table to `path` as JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let snapshot = Snapshot::from(&*self.tables.read());
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| DbError::Backend(format!("encode snapshot: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| DbError::Backend(format!("write {}: {}", path.display(), e)))
    }

    /// Loads a database previously written by [`MemorySpDb::save`].
    pub fn load(path: &Path) -> DbResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| DbError::Backend(format!("read {}: {}", path.display(), e)))?;
        let snapshot: Snapshot = serde_json::from_str(&json)
            .map_err(|e| DbError::Backend(format!("decode snapshot: {}", e)))?;
        Ok(Self {
            tables: RwLock::new(snapshot.into()),
        })
    }

    /// Overrides the create timestamp of an upload row.
    pub fn set_upload_create_time(&self, object_id: u64, ts: i64) -> DbResult<()> {
        let mut t = self.tables.write();
        let row = t
            .upload
            .get_mut(&object_id)
            .ok_or_else(|| not_found("upload progress", object_id))?;
        row.create_timestamp_second = ts;
        Ok(())
    }

    pub fn put_events(&self, object_id: u64) -> Vec<PutObjectEvent> {
        self.tables
            .read()
            .put_events
            .iter()
            .filter(|e| e.object_id == object_id)
            .cloned()
            .collect()
    }

    fn upload_metas_by(
        &self,
        limit: usize,
        pred: impl Fn(&UploadObjectMeta) -> bool,
    ) -> Vec<UploadObjectMeta> {
        let t = self.tables.read();
        let mut rows: Vec<_> = t.upload.values().filter(|m| pred(m)).cloned().collect();
        rows.sort_by_key(UploadObjectMeta::cursor);
        rows.truncate(limit);
        rows
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> DbError {
    DbError::NotFound(format!("{} {}", what, id))
}

impl SpDb for MemorySpDb {
    fn insert_upload_progress(&self, object_id: u64) -> DbResult<()> {
        let mut t = self.tables.write();
        if t.upload.contains_key(&object_id) {
            return Err(DbError::Duplicate(format!("upload progress {}", object_id)));
        }
        let now = now_unix();
        t.upload.insert(
            object_id,
            UploadObjectMeta {
                object_id,
                task_state: TaskState::UploadObjectDoing,
                create_timestamp_second: now,
                update_timestamp_second: now,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn update_upload_progress(&self, meta: &UploadObjectMeta) -> DbResult<()> {
        let mut t = self.tables.write();
        let row = t
            .upload
            .get_mut(&meta.object_id)
            .ok_or_else(|| not_found("upload progress", meta.object_id))?;
        row.task_state = meta.task_state;
        row.error_description = meta.error_description.clone();
        if !meta.secondary_endpoints.is_empty() {
            row.secondary_endpoints = meta.secondary_endpoints.clone();
            row.secondary_signatures = meta.secondary_signatures.clone();
            row.gvg_id = meta.gvg_id;
        }
        row.update_timestamp_second = now_unix();
        Ok(())
    }

    fn get_upload_state(&self, object_id: u64) -> DbResult<UploadObjectMeta> {
        self.tables
            .read()
            .upload
            .get(&object_id)
            .cloned()
            .ok_or_else(|| not_found("upload progress", object_id))
    }

    fn delete_upload_progress(&self, object_id: u64) -> DbResult<()> {
        self.tables.write().upload.remove(&object_id);
        Ok(())
    }

    fn get_upload_metas_to_replicate_by_start_ts(
        &self,
        limit: usize,
        after: UploadCursor,
    ) -> DbResult<Vec<UploadObjectMeta>> {
        Ok(self.upload_metas_by(limit, |m| {
            TaskState::TO_REPLICATE.contains(&m.task_state) && after.precedes(m)
        }))
    }

    fn get_upload_metas_to_seal_by_start_ts(
        &self,
        limit: usize,
        after: UploadCursor,
    ) -> DbResult<Vec<UploadObjectMeta>> {
        Ok(self.upload_metas_by(limit, |m| {
            TaskState::TO_SEAL.contains(&m.task_state) && after.precedes(m)
        }))
    }

    fn get_upload_metas_to_reject_by_range_ts(
        &self,
        limit: usize,
        after: UploadCursor,
        end_ts: i64,
    ) -> DbResult<Vec<UploadObjectMeta>> {
        Ok(self.upload_metas_by(limit, |m| {
            after.precedes(m) && m.create_timestamp_second <= end_ts
        }))
    }

    fn insert_put_event(&self, event: PutObjectEvent) -> DbResult<()> {
        self.tables.write().put_events.push(event);
        Ok(())
    }

    fn set_gc_object_progress(&self, task_key: &str, start: u64, end: u64) -> DbResult<()> {
        let mut t = self.tables.write();
        if t.gc.contains_key(task_key) {
            return Err(DbError::Duplicate(format!("gc progress {}", task_key)));
        }
        t.gc.insert(
            task_key.to_string(),
            GcObjectMeta {
                task_key: task_key.to_string(),
                start_block_height: start,
                end_block_height: end,
                current_block_height: start,
                last_deleted_object_id: 0,
                create_timestamp_second: now_unix(),
            },
        );
        Ok(())
    }

    fn update_gc_object_progress(&self, meta: &GcObjectMeta) -> DbResult<()> {
        let mut t = self.tables.write();
        let row = t
            .gc
            .get_mut(&meta.task_key)
            .ok_or_else(|| not_found("gc progress", &meta.task_key))?;
        row.current_block_height = meta.current_block_height;
        row.last_deleted_object_id = meta.last_deleted_object_id;
        Ok(())
    }

    fn delete_gc_object_progress(&self, task_key: &str) -> DbResult<()> {
        self.tables.write().gc.remove(task_key);
        Ok(())
    }

    fn get_gc_metas_to_gc(&self, limit: usize) -> DbResult<Vec<GcObjectMeta>> {
        let t = self.tables.read();
        let mut rows: Vec<_> = t.gc.values().cloned().collect();
        rows.sort_by_key(|m| (m.create_timestamp_second, m.start_block_height));
        rows.truncate(limit);
        Ok(rows)
    }

    fn set_recover_gvg_stats(&self, rows: &[RecoverGvgStats]) -> DbResult<()> {
        let mut t = self.tables.write();
        for row in rows {
            t.recover_stats
                .entry(row.gvg_id)
                .or_insert_with(|| row.clone());
        }
        Ok(())
    }

    fn get_recover_gvg_stats(&self, gvg_id: u32) -> DbResult<RecoverGvgStats> {
        self.tables
            .read()
            .recover_stats
            .get(&gvg_id)
            .cloned()
            .ok_or_else(|| not_found("recover gvg stats", gvg_id))
    }

    fn update_recover_gvg_stats(&self, row: &RecoverGvgStats) -> DbResult<()> {
        let mut t = self.tables.write();
        let stored = t
            .recover_stats
            .get_mut(&row.gvg_id)
            .ok_or_else(|| not_found("recover gvg stats", row.gvg_id))?;
        *stored = row.clone();
        Ok(())
    }

    fn batch_get_recover_gvg_stats(&self, vgf_id: u32) -> DbResult<Vec<RecoverGvgStats>> {
        Ok(self
            .tables
            .read()
            .recover_stats
            .values()
            .filter(|r| r.vgf_id == vgf_id)
            .cloned()
            .collect())
    }

    fn get_recover_gvg_stats_by_family_id_and_status(
        &self,
        vgf_id: u32,
        status: RecoverStatus,
    ) -> DbResult<Vec<RecoverGvgStats>> {
        Ok(self
            .tables
            .read()
            .recover_stats
            .values()
            .filter(|r| r.vgf_id == vgf_id && r.status == status)
            .cloned()
            .collect())
    }

    fn get_recover_gvg_stats_by_status(
        &self,
        status: RecoverStatus,
    ) -> DbResult<Vec<RecoverGvgStats>> {
        Ok(self
            .tables
            .read()
            .recover_stats
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    fn insert_recover_failed_object(&self, row: &RecoverFailedObject) -> DbResult<()> {
        let mut t = self.tables.write();
        if t.recover_failed.contains_key(&row.object_id) {
            return Err(DbError::Duplicate(format!(
                "recover failed object {}",
                row.object_id
            )));
        }
        t.recover_failed.insert(row.object_id, row.clone());
        Ok(())
    }

    fn get_recover_failed_object(&self, object_id: u64) -> DbResult<RecoverFailedObject> {
        self.tables
            .read()
            .recover_failed
            .get(&object_id)
            .cloned()
            .ok_or_else(|| not_found("recover failed object", object_id))
    }

    fn get_recover_failed_objects(
        &self,
        max_retry: u32,
        limit: usize,
    ) -> DbResult<Vec<RecoverFailedObject>> {
        Ok(self
            .tables
            .read()
            .recover_failed
            .values()
            .filter(|r| r.retry_time < max_retry)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_recover_failed_object(&self, row: &RecoverFailedObject) -> DbResult<()> {
        let mut t = self.tables.write();
        let stored = t
            .recover_failed
            .get_mut(&row.object_id)
            .ok_or_else(|| not_found("recover failed object", row.object_id))?;
        *stored = row.clone();
        Ok(())
    }

    fn delete_recover_failed_object(&self, object_id: u64) -> DbResult<()> {
        self.tables.write().recover_failed.remove(&object_id);
        Ok(())
    }

    fn get_recover_failed_objects_by_retry_time(
        &self,
        retry_time: u32,
    ) -> DbResult<Vec<RecoverFailedObject>> {
        Ok(self
            .tables
            .read()
            .recover_failed
            .values()
            .filter(|r| r.retry_time >= retry_time)
            .cloned()
            .collect())
    }

    fn get_object_integrity(
        &self,
        object_id: u64,
        redundancy_index: i32,
    ) -> DbResult<IntegrityMeta> {
        self.tables
            .read()
            .integrity
            .get(&(object_id, redundancy_index))
            .cloned()
            .ok_or_else(|| not_found("integrity meta", object_id))
    }

    fn set_object_integrity(&self, meta: &IntegrityMeta) -> DbResult<()> {
        self.tables
            .write()
            .integrity
            .insert((meta.object_id, meta.redundancy_index), meta.clone());
        Ok(())
    }

    fn get_replicate_piece_checksum(
        &self,
        object_id: u64,
        segment_idx: u32,
        redundancy_index: i32,
    ) -> DbResult<Vec<u8>> {
        self.tables
            .read()
            .piece_checksums
            .get(&(object_id, segment_idx, redundancy_index))
            .cloned()
            .ok_or_else(|| {
                not_found(
                    "piece checksum",
                    format!("{}/{}/{}", object_id, segment_idx, redundancy_index),
                )
            })
    }

    fn set_replicate_piece_checksum(
        &self,
        object_id: u64,
        segment_idx: u32,
        redundancy_index: i32,
        checksum: Vec<u8>,
    ) -> DbResult<()> {
        self.tables
            .write()
            .piece_checksums
            .insert((object_id, segment_idx, redundancy_index), checksum);
        Ok(())
    }

    fn update_migrate_gvg_progress(&self, progress: &MigrateGvgProgress) -> DbResult<()> {
        self.tables
            .write()
            .migrate
            .insert(progress.task_key.clone(), progress.clone());
        Ok(())
    }

    fn get_migrate_gvg_progress(&self, task_key: &str) -> DbResult<MigrateGvgProgress> {
        self.tables
            .read()
            .migrate
            .get(task_key)
            .cloned()
            .ok_or_else(|| not_found("migrate gvg progress", task_key))
    }

    fn delete_migrate_gvg_progress(&self, task_key: &str) -> DbResult<()> {
        self.tables.write().migrate.remove(task_key);
        Ok(())
    }

    fn update_all_sp(&self, sps: &[StorageProvider]) -> DbResult<()> {
        let mut t = self.tables.write();
        for sp in sps {
            t.sps.insert(sp.id, sp.clone());
        }
        Ok(())
    }

    fn get_all_sp(&self) -> DbResult<Vec<StorageProvider>> {
        Ok(self.tables.read().sps.values().cloned().collect())
    }

    fn set_own_sp_info(&self, sp: &StorageProvider) -> DbResult<()> {
        self.tables.write().own_sp = Some(sp.clone());
        Ok(())
    }

    fn get_own_sp_info(&self) -> DbResult<StorageProvider> {
        self.tables
            .read()
            .own_sp
            .clone()
            .ok_or_else(|| DbError::NotFound("own sp info".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_upload_progress_rejects_duplicate() {
        let db = MemorySpDb::new();
        db.insert_upload_progress(1).unwrap();
        assert!(matches!(
            db.insert_upload_progress(1),
            Err(DbError::Duplicate(_))
        ));
        assert_eq!(
            db.get_upload_state(1).unwrap().task_state,
            TaskState::UploadObjectDoing
        );
    }

    #[test]
    fn test_update_upload_progress_requires_row() {
        let db = MemorySpDb::new();
        let meta = UploadObjectMeta::new(9, TaskState::ReplicateObjectDoing);
        assert!(db.update_upload_progress(&meta).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_upload_progress_keeps_endpoints_when_absent() {
        let db = MemorySpDb::new();
        db.insert_upload_progress(1).unwrap();
        db.update_upload_progress(&UploadObjectMeta {
            object_id: 1,
            task_state: TaskState::SealObjectDoing,
            gvg_id: 3,
            secondary_endpoints: vec!["sp1".into()],
            secondary_signatures: vec![vec![1]],
            ..Default::default()
        })
        .unwrap();
        db.update_upload_progress(
            &UploadObjectMeta::new(1, TaskState::SealObjectError).with_error("boom"),
        )
        .unwrap();

        let row = db.get_upload_state(1).unwrap();
        assert_eq!(row.task_state, TaskState::SealObjectError);
        assert_eq!(row.error_description, "boom");
        assert_eq!(row.gvg_id, 3);
        assert_eq!(row.secondary_endpoints, vec!["sp1".to_string()]);
    }

    #[test]
    fn test_replicate_and_seal_iterators_filter_by_state_and_ts() {
        let db = MemorySpDb::new();
        for id in 1..=4 {
            db.insert_upload_progress(id).unwrap();
            db.set_upload_create_time(id, 100 + id as i64).unwrap();
        }
        db.update_upload_progress(&UploadObjectMeta::new(1, TaskState::UploadObjectDone))
            .unwrap();
        db.update_upload_progress(&UploadObjectMeta::new(2, TaskState::ReplicateObjectError))
            .unwrap();
        db.update_upload_progress(&UploadObjectMeta::new(3, TaskState::SealObjectDoing))
            .unwrap();

        let replicate = db
            .get_upload_metas_to_replicate_by_start_ts(10, UploadCursor::after_ts(0))
            .unwrap();
        assert_eq!(
            replicate.iter().map(|m| m.object_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let replicate = db
            .get_upload_metas_to_replicate_by_start_ts(10, UploadCursor::after_ts(101))
            .unwrap();
        assert_eq!(replicate.len(), 1);

        let seal = db
            .get_upload_metas_to_seal_by_start_ts(10, UploadCursor::after_ts(0))
            .unwrap();
        assert_eq!(seal.len(), 1);
        assert_eq!(seal[0].object_id, 3);
    }

    #[test]
    fn test_cursor_resumes_inside_a_second() {
        let db = MemorySpDb::new();
        for id in [3, 1, 2] {
            db.insert_upload_progress(id).unwrap();
            db.update_upload_progress(&UploadObjectMeta::new(id, TaskState::ReplicateObjectDoing))
                .unwrap();
            db.set_upload_create_time(id, 500).unwrap();
        }
        let first = db
            .get_upload_metas_to_replicate_by_start_ts(2, UploadCursor::after_ts(0))
            .unwrap();
        assert_eq!(
            first.iter().map(|m| m.object_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let rest = db
            .get_upload_metas_to_replicate_by_start_ts(2, first[1].cursor())
            .unwrap();
        assert_eq!(
            rest.iter().map(|m| m.object_id).collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[test]
    fn test_reject_range_is_half_open() {
        let db = MemorySpDb::new();
        for id in 1..=3 {
            db.insert_upload_progress(id).unwrap();
            db.set_upload_create_time(id, 10 * id as i64).unwrap();
        }
        let rows = db
            .get_upload_metas_to_reject_by_range_ts(10, UploadCursor::after_ts(10), 30)
            .unwrap();
        assert_eq!(
            rows.iter().map(|m| m.object_id).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_set_recover_gvg_stats_keeps_existing_rows() {
        let db = MemorySpDb::new();
        let mut row = RecoverGvgStats::new(1, 7, -1, 10);
        db.set_recover_gvg_stats(&[row.clone()]).unwrap();
        row.start_after = 50;
        db.update_recover_gvg_stats(&row).unwrap();

        db.set_recover_gvg_stats(&[RecoverGvgStats::new(1, 7, -1, 10)])
            .unwrap();
        assert_eq!(db.get_recover_gvg_stats(7).unwrap().start_after, 50);

        row.status = RecoverStatus::Processed;
        db.update_recover_gvg_stats(&row).unwrap();
        assert_eq!(
            db.get_recover_gvg_stats_by_family_id_and_status(1, RecoverStatus::Processed)
                .unwrap()
                .len(),
            1
        );
        assert!(db
            .get_recover_gvg_stats_by_family_id_and_status(1, RecoverStatus::Processing)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_recover_failed_objects_bounded_by_retry() {
        let db = MemorySpDb::new();
        for id in 1..=3 {
            db.insert_recover_failed_object(&RecoverFailedObject::new(id, 1, -1))
                .unwrap();
        }
        let mut row = db.get_recover_failed_object(2).unwrap();
        row.retry_time = 5;
        db.update_recover_failed_object(&row).unwrap();

        let pending = db.get_recover_failed_objects(5, 10).unwrap();
        assert_eq!(
            pending.iter().map(|r| r.object_id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(db.get_recover_failed_objects(5, 1).unwrap().len(), 1);
        assert_eq!(db.get_recover_failed_objects_by_retry_time(5).unwrap().len(), 1);

        db.delete_recover_failed_object(2).unwrap();
        assert!(db.get_recover_failed_object(2).unwrap_err().is_not_found());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spdb.json");

        let db = MemorySpDb::new();
        db.insert_upload_progress(1).unwrap();
        db.set_gc_object_progress("GCObject-start1-end2-time3", 1, 2)
            .unwrap();
        db.set_replicate_piece_checksum(1, 0, 2, vec![0xab]).unwrap();
        db.set_own_sp_info(&StorageProvider {
            id: 4,
            ..Default::default()
        })
        .unwrap();
        db.save(&path).unwrap();

        let restored = MemorySpDb::load(&path).unwrap();
        assert!(restored.get_upload_state(1).is_ok());
        assert_eq!(restored.get_gc_metas_to_gc(10).unwrap().len(), 1);
        assert_eq!(
            restored.get_replicate_piece_checksum(1, 0, 2).unwrap(),
            vec![0xab]
        );
        assert_eq!(restored.get_own_sp_info().unwrap().id, 4);
    }

    #[test]
    fn test_load_missing_file_is_backend_error() {
        let dir = TempDir::new().unwrap();
        let err = MemorySpDb::load(&dir.path().join("absent.json")).err();
        assert!(matches!(err, Some(DbError::Backend(_))));
    }
}
