//! Secondary provider selection for new global virtual groups.

use super::VgmError;
use std::collections::HashSet;

/// Collects candidate secondaries, preferring a configured set.
///
/// Preferred candidates come first in the result, then the others in the
/// order they were added.
#[derive(Debug, Clone)]
pub struct PreferSecondarySpPolicy {
    expected: usize,
    prefer_ids: HashSet<u32>,
    preferred: Vec<u32>,
    backup: Vec<u32>,
}

impl PreferSecondarySpPolicy {
    pub fn new(expected: usize, prefer_ids: &[u32]) -> Self {
        Self {
            expected,
            prefer_ids: prefer_ids.iter().copied().collect(),
            preferred: Vec::new(),
            backup: Vec::new(),
        }
    }

    pub fn add_candidate(&mut self, sp_id: u32) {
        if self.prefer_ids.contains(&sp_id) {
            self.preferred.push(sp_id);
        } else {
            self.backup.push(sp_id);
        }
    }

    /// Returns exactly the expected number of secondaries.
    pub fn generate(&self) -> Result<Vec<u32>, VgmError> {
        let available = self.preferred.len() + self.backup.len();
        if available < self.expected {
            return Err(VgmError::NotEnoughSp {
                expected: self.expected,
                available,
            });
        }
        Ok(self
            .preferred
            .iter()
            .chain(self.backup.iter())
            .take(self.expected)
            .copied()
            .collect())
    }
}
