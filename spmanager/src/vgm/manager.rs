//! Metadata snapshot and picking.

use super::{
    FreeStorageWeightPicker, FreezeSpPool, PreferSecondarySpPolicy, VgmConfig, VgmError,
    VgmResult,
};
use crate::client::types::{GlobalVirtualGroup, StorageProvider, VirtualGroupParams};
use crate::client::Consensus;
use crate::time::now_unix;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A global virtual group as seen by its primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GvgMeta {
    pub id: u32,
    pub family_id: u32,
    pub primary_sp_id: u32,
    pub secondary_sp_ids: Vec<u32>,
    pub secondary_sp_endpoints: Vec<String>,
    pub used_storage_size: u64,
    pub staking_storage_size: u64,
}

/// A family with its member groups and aggregate storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VgfMeta {
    pub id: u32,
    pub primary_sp_id: u32,
    pub gvgs: BTreeMap<u32, GvgMeta>,
    pub used_storage_size: u64,
    pub staking_storage_size: u64,
}

#[derive(Debug, Clone)]
struct Topology {
    self_sp: StorageProvider,
    other_sps: Vec<StorageProvider>,
    vg_params: VirtualGroupParams,
    families: BTreeMap<u32, VgfMeta>,
}

/// Picks families and groups for new buckets and replications.
///
/// Reads work against the last snapshot taken by [`refresh`](Self::refresh);
/// a failed refresh keeps the previous snapshot.
pub struct VirtualGroupManager {
    operator_address: String,
    chain: Arc<dyn Consensus>,
    config: VgmConfig,
    topology: RwLock<Option<Topology>>,
    freeze_pool: FreezeSpPool,
}

impl VirtualGroupManager {
    pub fn new(
        operator_address: impl Into<String>,
        chain: Arc<dyn Consensus>,
        config: VgmConfig,
    ) -> Self {
        let freeze_pool = FreezeSpPool::new(config.freeze_period);
        Self {
            operator_address: operator_address.into(),
            chain,
            config,
            topology: RwLock::new(None),
            freeze_pool,
        }
    }

    pub fn config(&self) -> &VgmConfig {
        &self.config
    }

    pub fn freeze_pool(&self) -> &FreezeSpPool {
        &self.freeze_pool
    }

    /// Id of this provider, once a refresh has found it on chain.
    pub fn self_sp_id(&self) -> Option<u32> {
        self.topology.read().as_ref().map(|t| t.self_sp.id)
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Rebuilds the snapshot from chain state.
    pub async fn refresh(&self) -> VgmResult<()> {
        let sps = self.chain.list_sps().await?;
        let Some(self_sp) = sps
            .iter()
            .find(|sp| sp.operator_address.eq_ignore_ascii_case(&self.operator_address))
            .cloned()
        else {
            error!(
                operator = %self.operator_address,
                "Current SP is not in the SP list, keeping previous metadata"
            );
            return Err(VgmError::StaledMetadata);
        };
        let endpoints: HashMap<u32, String> =
            sps.iter().map(|sp| (sp.id, sp.endpoint.clone())).collect();
        let other_sps: Vec<StorageProvider> =
            sps.into_iter().filter(|sp| sp.id != self_sp.id).collect();

        let vg_params = self.chain.query_virtual_group_params().await?;
        let mut families = BTreeMap::new();
        for vgf in self.chain.list_virtual_group_families(self_sp.id).await? {
            let mut meta = VgfMeta {
                id: vgf.id,
                primary_sp_id: self_sp.id,
                ..Default::default()
            };
            for gvg_id in &vgf.gvg_ids {
                let gvg = self.chain.query_global_virtual_group(*gvg_id).await?;
                let gvg_meta = GvgMeta {
                    id: gvg.id,
                    family_id: vgf.id,
                    primary_sp_id: self_sp.id,
                    secondary_sp_endpoints: gvg
                        .secondary_sp_ids
                        .iter()
                        .map(|id| endpoints.get(id).cloned().unwrap_or_default())
                        .collect(),
                    secondary_sp_ids: gvg.secondary_sp_ids.clone(),
                    used_storage_size: gvg.stored_size,
                    staking_storage_size: vg_params.staking_storage_size(&gvg),
                };
                meta.used_storage_size += gvg_meta.used_storage_size;
                meta.staking_storage_size += gvg_meta.staking_storage_size;
                meta.gvgs.insert(gvg.id, gvg_meta);
            }
            families.insert(vgf.id, meta);
        }

        debug!(families = families.len(), "Refreshed virtual group metadata");
        *self.topology.write() = Some(Topology {
            self_sp,
            other_sps,
            vg_params,
            families,
        });
        Ok(())
    }

    // =========================================================================
    // Picking
    // =========================================================================

    /// Picks a family for a new bucket.
    pub fn pick_virtual_group_family(&self) -> VgmResult<VgfMeta> {
        let topology = self.topology.read();
        let topology = topology.as_ref().ok_or(VgmError::PickVgf)?;
        let mut picker = FreeStorageWeightPicker::new(self.config.max_storage_usage);
        for family in topology.families.values() {
            picker.add(
                family.id,
                family.staking_storage_size,
                family.used_storage_size,
            );
        }
        picker
            .pick()
            .and_then(|id| topology.families.get(&id).cloned())
            .ok_or(VgmError::PickVgf)
    }

    /// Picks a group in `vgf_id`, skipping frozen groups and `exclude`.
    pub fn pick_global_virtual_group(&self, vgf_id: u32, exclude: &[u32]) -> VgmResult<GvgMeta> {
        let frozen = self.freeze_pool.frozen_gvgs_in_family(vgf_id);
        let topology = self.topology.read();
        let family = topology
            .as_ref()
            .and_then(|t| t.families.get(&vgf_id))
            .ok_or(VgmError::StaledMetadata)?;
        let mut picker = FreeStorageWeightPicker::new(self.config.max_storage_usage);
        for gvg in family.gvgs.values() {
            if frozen.contains(&gvg.id) || exclude.contains(&gvg.id) {
                continue;
            }
            picker.add(gvg.id, gvg.staking_storage_size, gvg.used_storage_size);
        }
        picker
            .pick()
            .and_then(|id| family.gvgs.get(&id).cloned())
            .ok_or_else(|| {
                warn!(vgf_id, "Failed to pick global virtual group");
                VgmError::PickGvg
            })
    }

    /// Proposes a new group with this provider as primary.
    ///
    /// Candidates are in-service providers that are not frozen.
    pub fn generate_global_virtual_group_meta(
        &self,
        mut policy: PreferSecondarySpPolicy,
    ) -> VgmResult<GvgMeta> {
        let topology = self.topology.read();
        let topology = topology.as_ref().ok_or(VgmError::StaledMetadata)?;
        for sp in &topology.other_sps {
            if sp.is_in_service() && !self.freeze_pool.is_frozen(sp.id) {
                policy.add_candidate(sp.id);
            }
        }
        let secondary_sp_ids = policy.generate()?;
        Ok(GvgMeta {
            primary_sp_id: topology.self_sp.id,
            secondary_sp_ids,
            staking_storage_size: self.config.default_staking_storage_size,
            ..Default::default()
        })
    }

    /// Deposit needed to stake `staking_storage_size` bytes, and its denom.
    pub fn deposit_for(&self, staking_storage_size: u64) -> Option<(u64, String)> {
        self.topology.read().as_ref().map(|t| {
            (
                t.vg_params
                    .gvg_staking_per_bytes
                    .saturating_mul(staking_storage_size),
                t.vg_params.deposit_denom.clone(),
            )
        })
    }

    /// Looks up a provider in the snapshot, then on chain.
    pub async fn query_sp_by_id(&self, sp_id: u32) -> VgmResult<StorageProvider> {
        let cached = self.topology.read().as_ref().and_then(|t| {
            std::iter::once(&t.self_sp)
                .chain(t.other_sps.iter())
                .find(|sp| sp.id == sp_id)
                .cloned()
        });
        if let Some(sp) = cached {
            return Ok(sp);
        }
        self.chain
            .list_sps()
            .await?
            .into_iter()
            .find(|sp| sp.id == sp_id)
            .ok_or(VgmError::SpNotFound(sp_id))
    }

    // =========================================================================
    // Freeze
    // =========================================================================

    pub fn freeze_sp_and_gvgs(&self, sp_id: u32, gvgs: Vec<GlobalVirtualGroup>) {
        self.freeze_pool.freeze(sp_id, gvgs);
    }

    /// Releases expired entries, then everything if too few unfrozen
    /// secondaries remain to build a group.
    pub async fn release_frozen_sps(&self) {
        self.freeze_pool.release_expired();

        let alive = match self.topology.read().as_ref() {
            Some(t) => t.other_sps.iter().filter(|sp| sp.is_in_service()).count(),
            None => return,
        };
        let params = match self.chain.query_storage_params_by_timestamp(now_unix()).await {
            Ok(params) => params,
            Err(e) => {
                debug!(error = %e, "Skipping freeze pool guard, storage params unavailable");
                return;
            }
        };
        if alive.saturating_sub(self.freeze_pool.len()) < params.redundancy_count() {
            info!(
                alive,
                frozen = self.freeze_pool.len(),
                "Too few unfrozen SPs, releasing freeze pool"
            );
            self.freeze_pool.release_all();
        }
    }

    /// Runs the refresh and release loops until cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut refresh = tokio::time::interval(self.config.refresh_interval);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut release = tokio::time::interval(self.config.release_interval);
        release.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Virtual group manager shutting down");
                    break;
                }

                _ = refresh.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "Failed to refresh virtual group metadata");
                    }
                }

                _ = release.tick() => {
                    self.release_frozen_sps().await;
                }
            }
        }
    }
}
