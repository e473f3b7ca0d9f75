//! Integrity verification of recovered objects.

use crate::spdb::{DbResult, SpDb};
use tracing::debug;

/// True when an integrity record exists for the object copy.
///
/// A missing record means the copy has not been recovered yet; any other
/// database error is returned.
pub fn verify_integrity(db: &dyn SpDb, object_id: u64, redundancy_index: i32) -> DbResult<bool> {
    match db.get_object_integrity(object_id, redundancy_index) {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!(object_id, redundancy_index, "Integrity record not found");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
