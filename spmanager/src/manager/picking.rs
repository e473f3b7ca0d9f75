//! Virtual group selection on behalf of handlers.
//!
//! Picking reads the [`VirtualGroupManager`](crate::vgm::VirtualGroupManager)
//! snapshot. When nothing fits, a new group is created on chain with this
//! provider as primary, the snapshot is refreshed and the pick is retried
//! once.

use super::Manager;
use crate::client::types::{CreateGvgRequest, StorageParams};
use crate::error::{ManagerError, ManagerResult};
use crate::time::now_unix;
use crate::vgm::{GvgMeta, PreferSecondarySpPolicy, VgfMeta, VgmError};
use tracing::{error, info, warn};

impl Manager {
    /// Picks a group in `vgf_id` for a replicate task.
    pub async fn pick_global_virtual_group(
        &self,
        vgf_id: u32,
        params: StorageParams,
    ) -> ManagerResult<GvgMeta> {
        match self.vgm.pick_global_virtual_group(vgf_id, &[]) {
            Ok(gvg) => return Ok(gvg),
            Err(e) => warn!(vgf_id, error = %e, "No global virtual group fits, creating one"),
        }
        self.create_global_virtual_group(vgf_id, params).await?;
        self.vgm.refresh().await?;
        Ok(self.vgm.pick_global_virtual_group(vgf_id, &[])?)
    }

    /// Picks a family for a new bucket. A new family is created when none
    /// has room.
    pub async fn pick_virtual_group_family(&self) -> ManagerResult<VgfMeta> {
        match self.vgm.pick_virtual_group_family() {
            Ok(vgf) => return Ok(vgf),
            Err(VgmError::PickVgf) => {}
            Err(e) => return Err(e.into()),
        }
        let params = self
            .chain
            .query_storage_params_by_timestamp(now_unix())
            .await?;
        self.create_global_virtual_group(0, params).await?;
        self.vgm.refresh().await?;
        Ok(self.vgm.pick_virtual_group_family()?)
    }

    /// Submits a new group in `vgf_id`, or in a new family when `vgf_id` is
    /// zero.
    pub(crate) async fn create_global_virtual_group(
        &self,
        vgf_id: u32,
        params: StorageParams,
    ) -> ManagerResult<()> {
        let meta = self
            .vgm
            .generate_global_virtual_group_meta(PreferSecondarySpPolicy::new(
                params.redundancy_count(),
                &self.config.gvg_prefer_sp_list,
            ))
            .inspect_err(|e| error!(vgf_id, error = %e, "Failed to generate gvg meta"))?;
        let (deposit, deposit_denom) = self
            .vgm
            .deposit_for(meta.staking_storage_size)
            .ok_or(ManagerError::Vgm(VgmError::StaledMetadata))?;

        let request = CreateGvgRequest {
            vgf_id,
            primary_sp_address: self.config.operator_address.clone(),
            secondary_sp_ids: meta.secondary_sp_ids,
            deposit,
            deposit_denom,
        };
        let tx_hash = self.meta.create_global_virtual_group(request).await?;
        info!(vgf_id, tx_hash = %tx_hash, "Created global virtual group");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::client::types::GlobalVirtualGroup;
    use crate::vgm::VgmError;
    use crate::error::ManagerError;

    #[tokio::test]
    async fn test_pick_existing_gvg() {
        let f = fixture().await;
        let gvg = f.manager.pick_global_virtual_group(1, params()).await.unwrap();
        assert_eq!(gvg.id, 11);
        assert!(f.chain.created_gvgs().is_empty());
    }

    #[tokio::test]
    async fn test_full_family_gets_new_gvg() {
        let chain = chain();
        chain.add_gvg(GlobalVirtualGroup {
            id: 11,
            family_id: 1,
            primary_sp_id: 1,
            secondary_sp_ids: vec![2, 3, 4],
            stored_size: 100,
            total_deposit: 100,
        });
        let f = fixture_with(config(), chain);
        f.manager.vgm().refresh().await.unwrap();

        let gvg = f.manager.pick_global_virtual_group(1, params()).await.unwrap();
        assert_ne!(gvg.id, 11);
        let created = f.chain.created_gvgs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].vgf_id, 1);
        assert_eq!(created[0].primary_sp_address, OPERATOR);
        assert_eq!(created[0].secondary_sp_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_pick_family_creates_one_when_none_exists() {
        let chain = crate::client::SimulatedChain::new();
        for id in 1..=4 {
            chain.add_sp(sp(id));
        }
        chain.set_storage_params(params());
        let f = fixture_with(config(), std::sync::Arc::new(chain));
        f.manager.vgm().refresh().await.unwrap();

        let vgf = f.manager.pick_virtual_group_family().await.unwrap();
        assert_eq!(vgf.primary_sp_id, 1);
        assert_eq!(f.chain.created_gvgs()[0].vgf_id, 0);
    }

    #[tokio::test]
    async fn test_not_enough_secondaries() {
        let chain = crate::client::SimulatedChain::new();
        chain.add_sp(sp(1));
        chain.add_sp(sp(2));
        chain.set_storage_params(params());
        let f = fixture_with(config(), std::sync::Arc::new(chain));
        f.manager.vgm().refresh().await.unwrap();

        let err = f.manager.pick_virtual_group_family().await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Vgm(VgmError::NotEnoughSp { expected: 3, .. })
        ));
    }
}
