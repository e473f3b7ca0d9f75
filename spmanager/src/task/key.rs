//! Task identity keys.
//!
//! A key is the canonical string form of a task's identity. Upload, replicate
//! and seal tasks for the same object share one key, so a key lookup across
//! the three pipeline queues tells whether the object is already in flight.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

const DELIMITER: &str = "-";

pub const KEY_PREFIX_CREATE_BUCKET_APPROVAL: &str = "CreateBucketApproval";
pub const KEY_PREFIX_CREATE_OBJECT_APPROVAL: &str = "CreateObjectApproval";
pub const KEY_PREFIX_DOWNLOAD_OBJECT: &str = "DownloadObject";
pub const KEY_PREFIX_CHALLENGE_PIECE: &str = "ChallengePiece";
pub const KEY_PREFIX_UPLOADING: &str = "Uploading";
pub const KEY_PREFIX_RESUMABLE_UPLOADING: &str = "ResumableUploading";
pub const KEY_PREFIX_RECOVERING: &str = "Recovering";
pub const KEY_PREFIX_RECEIVE_PIECE: &str = "ReceivePiece";
pub const KEY_PREFIX_GC_OBJECT: &str = "GCObject";
pub const KEY_PREFIX_GC_ZOMBIE_PIECE: &str = "GCZombiePiece";
pub const KEY_PREFIX_GC_META: &str = "GCMeta";
pub const KEY_PREFIX_MIGRATE_GVG: &str = "MigrateGVG";

/// Opaque, immutable identity of a task.
///
/// Equality and hashing are ASCII case-insensitive over the string form.
#[derive(Clone, Serialize, Deserialize)]
pub struct TaskKey(String);

impl TaskKey {
    /// Creates a key from its canonical string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the string form of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `sub_key` occurs anywhere in this key.
    pub fn contains(&self, sub_key: &str) -> bool {
        self.0.contains(sub_key)
    }
}

impl PartialEq for TaskKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for TaskKey {}

impl Hash for TaskKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl fmt::Debug for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskKey({})", self.0)
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

fn combine(prefix: &str, fields: &[String]) -> TaskKey {
    let mut key = String::from(prefix);
    for field in fields {
        key.push_str(DELIMITER);
        key.push_str(field);
    }
    TaskKey(key)
}

// =============================================================================
// Key Builders
// =============================================================================

/// Key shared by the upload, replicate and seal tasks of one object.
pub fn uploading_key(bucket: &str, object: &str, object_id: u64) -> TaskKey {
    combine(
        KEY_PREFIX_UPLOADING,
        &[
            format!("bucket:{}", bucket),
            format!("object:{}", object),
            format!("id:{}", object_id),
        ],
    )
}

pub fn resumable_uploading_key(bucket: &str, object: &str, object_id: u64, offset: u64) -> TaskKey {
    combine(
        KEY_PREFIX_RESUMABLE_UPLOADING,
        &[
            bucket.to_string(),
            object.to_string(),
            object_id.to_string(),
            offset.to_string(),
        ],
    )
}

pub fn receive_piece_key(
    bucket: &str,
    object: &str,
    object_id: u64,
    replicate_idx: u32,
    piece_idx: i32,
) -> TaskKey {
    combine(
        KEY_PREFIX_RECEIVE_PIECE,
        &[
            format!("bucket:{}", bucket),
            format!("object:{}", object),
            format!("id:{}", object_id),
            format!("rIdx:{}", replicate_idx),
            format!("pIdx:{}", piece_idx),
        ],
    )
}

pub fn recover_piece_key(
    bucket: &str,
    object: &str,
    object_id: u64,
    segment_idx: u32,
    replicate_idx: i32,
) -> TaskKey {
    combine(
        KEY_PREFIX_RECOVERING,
        &[
            format!("bucket:{}", bucket),
            format!("object:{}", object),
            format!("id:{}", object_id),
            format!("segIdx:{}", segment_idx),
            format!("replicateIdx:{}", replicate_idx),
        ],
    )
}

pub fn gc_object_key(start: u64, end: u64, time: i64) -> TaskKey {
    combine(
        KEY_PREFIX_GC_OBJECT,
        &[
            format!("start{}", start),
            format!("end{}", end),
            format!("time{}", time),
        ],
    )
}

pub fn gc_zombie_piece_key(time: i64) -> TaskKey {
    combine(KEY_PREFIX_GC_ZOMBIE_PIECE, &[format!("time{}", time)])
}

pub fn gc_meta_key(time: i64) -> TaskKey {
    combine(KEY_PREFIX_GC_META, &[format!("time{}", time)])
}

pub fn download_object_key(bucket: &str, object: &str, object_id: u64, low: u64, high: u64) -> TaskKey {
    combine(
        KEY_PREFIX_DOWNLOAD_OBJECT,
        &[
            format!("bucket:{}", bucket),
            format!("object:{}", object),
            format!("id:{}", object_id),
            format!("low:{}", low),
            format!("high:{}", high),
        ],
    )
}

pub fn challenge_piece_key(
    bucket: &str,
    object: &str,
    object_id: u64,
    segment_idx: u32,
    redundancy_idx: i32,
    user: &str,
) -> TaskKey {
    combine(
        KEY_PREFIX_CHALLENGE_PIECE,
        &[
            format!("bucket:{}", bucket),
            format!("object:{}", object),
            format!("id:{}", object_id),
            format!("sIdx:{}", segment_idx),
            format!("rIdx:{}", redundancy_idx),
            user.to_string(),
        ],
    )
}

pub fn migrate_gvg_key(src_gvg_id: u32, bucket_id: u64, redundancy_idx: i32) -> TaskKey {
    combine(
        KEY_PREFIX_MIGRATE_GVG,
        &[
            format!("oldGvgID{}", src_gvg_id),
            format!("bucketID{}", bucket_id),
            format!("redundancyIndex{}", redundancy_idx),
        ],
    )
}

pub fn create_bucket_approval_key(bucket: &str, account: &str) -> TaskKey {
    combine(
        KEY_PREFIX_CREATE_BUCKET_APPROVAL,
        &[format!("bucket:{}", bucket), format!("account:{}", account)],
    )
}

pub fn create_object_approval_key(bucket: &str, object: &str, account: &str) -> TaskKey {
    combine(
        KEY_PREFIX_CREATE_OBJECT_APPROVAL,
        &[
            format!("bucket:{}", bucket),
            format!("object:{}", object),
            format!("account:{}", account),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_equality_ignores_ascii_case() {
        let a = TaskKey::new("Uploading-bucket:B-object:o-id:1");
        let b = TaskKey::new("uploading-BUCKET:b-object:O-id:1");
        assert_eq!(a, b);
        assert_ne!(a, TaskKey::new("Uploading-bucket:B-object:o-id:2"));
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        let mut map = HashMap::new();
        map.insert(TaskKey::new("GCObject-start1-end2-time3"), 7usize);
        assert_eq!(map.get(&TaskKey::new("gcobject-START1-end2-time3")), Some(&7));
    }

    #[test]
    fn test_uploading_key_is_shared_across_stages() {
        let key = uploading_key("photos", "cat.jpg", 42);
        assert_eq!(key.as_str(), "Uploading-bucket:photos-object:cat.jpg-id:42");
    }

    #[test]
    fn test_gc_object_key_format() {
        assert_eq!(
            gc_object_key(100, 600, 1700000000).as_str(),
            "GCObject-start100-end600-time1700000000"
        );
    }

    #[test]
    fn test_contains_sub_key() {
        let key = recover_piece_key("b", "o", 9, 3, -1);
        assert!(key.contains("segIdx:3"));
        assert!(!key.contains("segIdx:4"));
    }
}
