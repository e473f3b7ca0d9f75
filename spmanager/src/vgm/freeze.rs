//! Short-horizon deny list for misbehaving secondary providers.

use crate::client::types::GlobalVirtualGroup;
use crate::time::now_unix;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

/// Default time a provider stays frozen.
pub const DEFAULT_FREEZE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct FrozenSp {
    joined_gvgs: Vec<GlobalVirtualGroup>,
    freeze_until: i64,
}

/// Providers excluded from new group generation, and the groups they
/// belong to, until their freeze period lapses.
#[derive(Debug)]
pub struct FreezeSpPool {
    entries: DashMap<u32, FrozenSp>,
    freeze_period: Duration,
}

impl Default for FreezeSpPool {
    fn default() -> Self {
        Self::new(DEFAULT_FREEZE_PERIOD)
    }
}

impl FreezeSpPool {
    pub fn new(freeze_period: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            freeze_period,
        }
    }

    /// Freezes `sp_id` from now for one freeze period, replacing any
    /// earlier entry.
    pub fn freeze(&self, sp_id: u32, gvgs: Vec<GlobalVirtualGroup>) {
        let freeze_until = now_unix() + self.freeze_period.as_secs() as i64;
        info!(sp_id, gvg_count = gvgs.len(), freeze_until, "Freezing secondary SP");
        self.entries.insert(
            sp_id,
            FrozenSp {
                joined_gvgs: gvgs,
                freeze_until,
            },
        );
    }

    pub fn release_expired(&self) -> usize {
        self.release_expired_at(now_unix())
    }

    /// Drops every entry whose freeze ended before `now`.
    pub fn release_expired_at(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|sp_id, entry| {
            let keep = entry.freeze_until >= now;
            if !keep {
                info!(sp_id, "Released secondary SP from freeze pool");
            }
            keep
        });
        before - self.entries.len()
    }

    pub fn release_all(&self) {
        self.entries.clear();
    }

    pub fn is_frozen(&self, sp_id: u32) -> bool {
        self.entries.contains_key(&sp_id)
    }

    pub fn frozen_sp_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of frozen providers' groups that belong to `family_id`.
    pub fn frozen_gvgs_in_family(&self, family_id: u32) -> Vec<u32> {
        let ids: BTreeSet<u32> = self
            .entries
            .iter()
            .flat_map(|e| {
                e.value()
                    .joined_gvgs
                    .iter()
                    .filter(|g| g.family_id == family_id)
                    .map(|g| g.id)
                    .collect::<Vec<_>>()
            })
            .collect();
        ids.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gvg(id: u32, family_id: u32) -> GlobalVirtualGroup {
        GlobalVirtualGroup {
            id,
            family_id,
            ..Default::default()
        }
    }

    #[test]
    fn test_freeze_and_project() {
        let pool = FreezeSpPool::new(Duration::from_secs(60));
        pool.freeze(3, vec![gvg(10, 1), gvg(11, 2)]);
        pool.freeze(4, vec![gvg(12, 1)]);

        assert_eq!(pool.frozen_sp_ids(), vec![3, 4]);
        assert_eq!(pool.frozen_gvgs_in_family(1), vec![10, 12]);
        assert_eq!(pool.frozen_gvgs_in_family(2), vec![11]);
        assert!(pool.frozen_gvgs_in_family(9).is_empty());
    }

    #[test]
    fn test_release_expired_only() {
        let pool = FreezeSpPool::new(Duration::from_secs(60));
        pool.freeze(3, vec![]);
        let now = now_unix();

        assert_eq!(pool.release_expired_at(now), 0);
        assert!(pool.is_frozen(3));
        assert_eq!(pool.release_expired_at(now + 61), 1);
        assert!(!pool.is_frozen(3));
    }

    #[test]
    fn test_release_all() {
        let pool = FreezeSpPool::default();
        pool.freeze(1, vec![]);
        pool.freeze(2, vec![]);
        pool.release_all();
        assert!(pool.is_empty());
    }
}
