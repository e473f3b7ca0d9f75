//! Paged iteration over persisted upload progress.

use crate::spdb::{SpDb, UploadCursor, UploadObjectMeta};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Which rows a retry pass visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    Replicate,
    Seal,
    RejectUnseal,
}

impl RetryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replicate => "replicate",
            Self::Seal => "seal",
            Self::RejectUnseal => "reject_unseal",
        }
    }
}

impl fmt::Display for RetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Yields upload progress rows oldest first, fetching `prefetch_limit` at a
/// time and resuming after the last row seen.
///
/// Replicate and seal passes cover rows created within the last
/// `threshold` seconds; reject-unseal covers the window before that.
/// Iteration stops at the first empty page or database error.
pub struct TaskIterator {
    db: Arc<dyn SpDb>,
    kind: RetryKind,
    prefetch_limit: usize,
    cursor: UploadCursor,
    end_ts: i64,
    cached: VecDeque<UploadObjectMeta>,
    exhausted: bool,
}

impl TaskIterator {
    pub fn new(
        db: Arc<dyn SpDb>,
        kind: RetryKind,
        threshold_secs: i64,
        prefetch_limit: usize,
        now: i64,
    ) -> Self {
        let (start_ts, end_ts) = match kind {
            RetryKind::Replicate | RetryKind::Seal => (now - threshold_secs, 0),
            RetryKind::RejectUnseal => (now - 2 * threshold_secs, now - threshold_secs),
        };
        Self {
            db,
            kind,
            prefetch_limit,
            cursor: UploadCursor::after_ts(start_ts),
            end_ts,
            cached: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn kind(&self) -> RetryKind {
        self.kind
    }

    fn prefetch(&mut self) {
        let page = match self.kind {
            RetryKind::Replicate => self
                .db
                .get_upload_metas_to_replicate_by_start_ts(self.prefetch_limit, self.cursor),
            RetryKind::Seal => self
                .db
                .get_upload_metas_to_seal_by_start_ts(self.prefetch_limit, self.cursor),
            RetryKind::RejectUnseal => self.db.get_upload_metas_to_reject_by_range_ts(
                self.prefetch_limit,
                self.cursor,
                self.end_ts,
            ),
        };
        match page {
            Ok(page) if page.is_empty() => {
                debug!(kind = %self.kind, "No more rows to retry");
                self.exhausted = true;
            }
            Ok(page) => {
                if let Some(last) = page.last() {
                    self.cursor = last.cursor();
                }
                self.cached.extend(page);
            }
            Err(e) => {
                error!(kind = %self.kind, error = %e, "Failed to prefetch retry rows");
                self.exhausted = true;
            }
        }
    }
}

impl Iterator for TaskIterator {
    type Item = UploadObjectMeta;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cached.is_empty() && !self.exhausted {
            self.prefetch();
        }
        self.cached.pop_front()
    }
}

impl fmt::Debug for TaskIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskIterator")
            .field("kind", &self.kind)
            .field("cursor", &self.cursor)
            .field("end_ts", &self.end_ts)
            .field("cached", &self.cached.len())
            .finish()
    }
}
