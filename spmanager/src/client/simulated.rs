//! In-memory chain and metadata service.

use super::types::{
    BucketInfo, CompleteMigrationBucketEvent, CompleteSwapInRequest, CreateGvgRequest,
    GlobalVirtualGroup, MigrateBucketEvent, ObjectInfo, ObjectStatus, RejectUnsealRequest,
    SealObjectRequest, SpExitEvent, StorageParams, StorageProvider, SwapInInfo,
    VirtualGroupFamily, VirtualGroupParams,
};
use super::{BoxFuture, ClientError, ClientResult, Consensus, MetaClient};
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
struct ChainState {
    params: StorageParams,
    vg_params: VirtualGroupParams,
    objects: BTreeMap<u64, ObjectInfo>,
    buckets: HashMap<String, BucketInfo>,
    gvgs: BTreeMap<u32, GlobalVirtualGroup>,
    vgfs: BTreeMap<u32, VirtualGroupFamily>,
    sps: Vec<StorageProvider>,
    swap_ins: HashMap<(u32, u32), SwapInInfo>,
    sp_exit_events: Vec<SpExitEvent>,
    migrate_bucket_events: Vec<MigrateBucketEvent>,
    complete_migration_events: Vec<CompleteMigrationBucketEvent>,
    created_gvgs: Vec<CreateGvgRequest>,
    completed_swap_ins: Vec<CompleteSwapInRequest>,
    sealed: Vec<SealObjectRequest>,
    rejected: Vec<RejectUnsealRequest>,
}

/// Chain, metadata service and transaction sink in one in-memory value.
///
/// Transactions take effect immediately: sealing marks the object sealed,
/// creating a GVG adds it to its family, completing a swap-in removes the
/// pending swap-in.
#[derive(Default)]
pub struct SimulatedChain {
    state: RwLock<ChainState>,
    height: AtomicU64,
    offline: AtomicBool,
    tx_counter: AtomicU64,
}

fn ready<'a, T: Send + 'a>(value: T) -> BoxFuture<'a, T> {
    futures::future::ready(value).boxed()
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Makes every call fail with an RPC error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_storage_params(&self, params: StorageParams) {
        self.state.write().params = params;
    }

    pub fn set_virtual_group_params(&self, params: VirtualGroupParams) {
        self.state.write().vg_params = params;
    }

    pub fn add_sp(&self, sp: StorageProvider) {
        let mut state = self.state.write();
        state.sps.retain(|s| s.id != sp.id);
        state.sps.push(sp);
    }

    pub fn add_object(&self, object: ObjectInfo) {
        self.state.write().objects.insert(object.id, object);
    }

    pub fn remove_object(&self, object_id: u64) {
        self.state.write().objects.remove(&object_id);
    }

    pub fn add_bucket(&self, bucket: BucketInfo) {
        self.state
            .write()
            .buckets
            .insert(bucket.bucket_name.clone(), bucket);
    }

    pub fn add_family(&self, vgf: VirtualGroupFamily) {
        self.state.write().vgfs.insert(vgf.id, vgf);
    }

    /// Adds a group and links it into its family, creating the family if
    /// needed.
    pub fn add_gvg(&self, gvg: GlobalVirtualGroup) {
        let mut state = self.state.write();
        let family = state
            .vgfs
            .entry(gvg.family_id)
            .or_insert_with(|| VirtualGroupFamily {
                id: gvg.family_id,
                primary_sp_id: gvg.primary_sp_id,
                gvg_ids: Vec::new(),
            });
        if !family.gvg_ids.contains(&gvg.id) {
            family.gvg_ids.push(gvg.id);
        }
        state.gvgs.insert(gvg.id, gvg);
    }

    pub fn set_swap_in(&self, vgf_id: u32, gvg_id: u32, info: SwapInInfo) {
        self.state.write().swap_ins.insert((vgf_id, gvg_id), info);
    }

    pub fn add_sp_exit_event(&self, event: SpExitEvent) {
        self.state.write().sp_exit_events.push(event);
    }

    pub fn add_migrate_bucket_event(&self, event: MigrateBucketEvent) {
        self.state.write().migrate_bucket_events.push(event);
    }

    pub fn add_complete_migration_event(&self, event: CompleteMigrationBucketEvent) {
        self.state.write().complete_migration_events.push(event);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn object(&self, object_id: u64) -> Option<ObjectInfo> {
        self.state.read().objects.get(&object_id).cloned()
    }

    pub fn gvg(&self, gvg_id: u32) -> Option<GlobalVirtualGroup> {
        self.state.read().gvgs.get(&gvg_id).cloned()
    }

    pub fn created_gvgs(&self) -> Vec<CreateGvgRequest> {
        self.state.read().created_gvgs.clone()
    }

    pub fn completed_swap_ins(&self) -> Vec<CompleteSwapInRequest> {
        self.state.read().completed_swap_ins.clone()
    }

    pub fn sealed(&self) -> Vec<SealObjectRequest> {
        self.state.read().sealed.clone()
    }

    pub fn rejected(&self) -> Vec<RejectUnsealRequest> {
        self.state.read().rejected.clone()
    }

    fn online(&self) -> ClientResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ClientError::Rpc("chain unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn next_tx_hash(&self) -> String {
        format!("0x{:064x}", self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn read<T>(&self, f: impl FnOnce(&ChainState) -> ClientResult<T>) -> ClientResult<T> {
        self.online()?;
        f(&self.state.read())
    }

    fn write<T>(&self, f: impl FnOnce(&mut ChainState) -> ClientResult<T>) -> ClientResult<T> {
        self.online()?;
        f(&mut self.state.write())
    }

    fn find_object(state: &ChainState, object_id: u64) -> ClientResult<ObjectInfo> {
        state
            .objects
            .get(&object_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("object", object_id))
    }

    fn create_gvg(&self, state: &mut ChainState, request: CreateGvgRequest) -> ClientResult<()> {
        let primary = state
            .sps
            .iter()
            .find(|sp| sp.operator_address == request.primary_sp_address)
            .map(|sp| sp.id)
            .ok_or_else(|| ClientError::not_found("sp", &request.primary_sp_address))?;
        let vgf_id = if request.vgf_id == 0 {
            state.vgfs.keys().next_back().copied().unwrap_or(0) + 1
        } else {
            request.vgf_id
        };
        let gvg_id = state.gvgs.keys().next_back().copied().unwrap_or(0) + 1;
        let family = state
            .vgfs
            .entry(vgf_id)
            .or_insert_with(|| VirtualGroupFamily {
                id: vgf_id,
                primary_sp_id: primary,
                gvg_ids: Vec::new(),
            });
        family.gvg_ids.push(gvg_id);
        state.gvgs.insert(
            gvg_id,
            GlobalVirtualGroup {
                id: gvg_id,
                family_id: vgf_id,
                primary_sp_id: primary,
                secondary_sp_ids: request.secondary_sp_ids.clone(),
                stored_size: 0,
                total_deposit: request.deposit,
            },
        );
        state.created_gvgs.push(request);
        Ok(())
    }
}

impl Consensus for SimulatedChain {
    fn current_height(&self) -> BoxFuture<'_, ClientResult<u64>> {
        ready(self.online().map(|_| self.height.load(Ordering::SeqCst)))
    }

    fn query_storage_params(&self) -> BoxFuture<'_, ClientResult<StorageParams>> {
        ready(self.read(|s| Ok(s.params)))
    }

    fn query_storage_params_by_timestamp(
        &self,
        _timestamp: i64,
    ) -> BoxFuture<'_, ClientResult<StorageParams>> {
        ready(self.read(|s| Ok(s.params)))
    }

    fn query_virtual_group_params(&self) -> BoxFuture<'_, ClientResult<VirtualGroupParams>> {
        ready(self.read(|s| Ok(s.vg_params.clone())))
    }

    fn query_object_info_by_id(&self, object_id: u64) -> BoxFuture<'_, ClientResult<ObjectInfo>> {
        ready(self.read(|s| Self::find_object(s, object_id)))
    }

    fn query_global_virtual_group(
        &self,
        gvg_id: u32,
    ) -> BoxFuture<'_, ClientResult<GlobalVirtualGroup>> {
        ready(self.read(|s| {
            s.gvgs
                .get(&gvg_id)
                .cloned()
                .ok_or_else(|| ClientError::not_found("gvg", gvg_id))
        }))
    }

    fn query_virtual_group_family(
        &self,
        vgf_id: u32,
    ) -> BoxFuture<'_, ClientResult<VirtualGroupFamily>> {
        ready(self.read(|s| {
            s.vgfs
                .get(&vgf_id)
                .cloned()
                .ok_or_else(|| ClientError::not_found("vgf", vgf_id))
        }))
    }

    fn list_virtual_group_families(
        &self,
        sp_id: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<VirtualGroupFamily>>> {
        ready(self.read(|s| {
            Ok(s.vgfs
                .values()
                .filter(|f| f.primary_sp_id == sp_id)
                .cloned()
                .collect())
        }))
    }

    fn list_global_virtual_groups_by_family(
        &self,
        vgf_id: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<GlobalVirtualGroup>>> {
        ready(self.read(|s| {
            Ok(s.gvgs
                .values()
                .filter(|g| g.family_id == vgf_id)
                .cloned()
                .collect())
        }))
    }

    fn list_sps(&self) -> BoxFuture<'_, ClientResult<Vec<StorageProvider>>> {
        ready(self.read(|s| Ok(s.sps.clone())))
    }

    fn query_sp(&self, operator_address: &str) -> BoxFuture<'_, ClientResult<StorageProvider>> {
        let result = self.read(|s| {
            s.sps
                .iter()
                .find(|sp| sp.operator_address == operator_address)
                .cloned()
                .ok_or_else(|| ClientError::not_found("sp", operator_address))
        });
        ready(result)
    }

    fn query_swap_in_info(
        &self,
        vgf_id: u32,
        gvg_id: u32,
    ) -> BoxFuture<'_, ClientResult<Option<SwapInInfo>>> {
        ready(self.read(|s| Ok(s.swap_ins.get(&(vgf_id, gvg_id)).cloned())))
    }
}

impl MetaClient for SimulatedChain {
    fn list_objects_in_gvg(
        &self,
        gvg_id: u32,
        start_after: u64,
        limit: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<ObjectInfo>>> {
        ready(self.read(|s| {
            Ok(s.objects
                .range(start_after.saturating_add(1)..)
                .map(|(_, o)| o)
                .filter(|o| o.gvg_id == gvg_id)
                .take(limit as usize)
                .cloned()
                .collect())
        }))
    }

    fn list_global_virtual_groups_by_secondary_sp(
        &self,
        sp_id: u32,
    ) -> BoxFuture<'_, ClientResult<Vec<GlobalVirtualGroup>>> {
        ready(self.read(|s| {
            Ok(s.gvgs
                .values()
                .filter(|g| g.secondary_sp_ids.contains(&sp_id))
                .cloned()
                .collect())
        }))
    }

    fn list_sp_exit_events(
        &self,
        block_height: u64,
        _operator_address: &str,
    ) -> BoxFuture<'_, ClientResult<Vec<SpExitEvent>>> {
        ready(self.read(|s| {
            Ok(s.sp_exit_events
                .iter()
                .filter(|e| e.block_height <= block_height)
                .cloned()
                .collect())
        }))
    }

    fn list_migrate_bucket_events(
        &self,
        block_height: u64,
        _operator_address: &str,
    ) -> BoxFuture<'_, ClientResult<Vec<MigrateBucketEvent>>> {
        ready(self.read(|s| {
            Ok(s.migrate_bucket_events
                .iter()
                .filter(|e| e.block_height <= block_height)
                .cloned()
                .collect())
        }))
    }

    fn list_complete_migration_bucket_events(
        &self,
        block_height: u64,
        _operator_address: &str,
    ) -> BoxFuture<'_, ClientResult<Vec<CompleteMigrationBucketEvent>>> {
        ready(self.read(|s| {
            Ok(s.complete_migration_events
                .iter()
                .filter(|e| e.block_height <= block_height)
                .cloned()
                .collect())
        }))
    }

    fn get_object_by_id(&self, object_id: u64) -> BoxFuture<'_, ClientResult<ObjectInfo>> {
        ready(self.read(|s| Self::find_object(s, object_id)))
    }

    fn get_bucket_by_bucket_name(
        &self,
        bucket_name: &str,
    ) -> BoxFuture<'_, ClientResult<BucketInfo>> {
        let result = self.read(|s| {
            s.buckets
                .get(bucket_name)
                .cloned()
                .ok_or_else(|| ClientError::not_found("bucket", bucket_name))
        });
        ready(result)
    }

    fn create_global_virtual_group(
        &self,
        request: CreateGvgRequest,
    ) -> BoxFuture<'_, ClientResult<String>> {
        let result = self
            .write(|s| self.create_gvg(s, request))
            .map(|_| self.next_tx_hash());
        ready(result)
    }

    fn complete_swap_in(
        &self,
        request: CompleteSwapInRequest,
    ) -> BoxFuture<'_, ClientResult<String>> {
        let result = self
            .write(|s| {
                s.swap_ins.remove(&(request.vgf_id, request.gvg_id));
                s.completed_swap_ins.push(request);
                Ok(())
            })
            .map(|_| self.next_tx_hash());
        ready(result)
    }

    fn seal_object(&self, request: SealObjectRequest) -> BoxFuture<'_, ClientResult<String>> {
        let result = self
            .write(|s| {
                let object = s
                    .objects
                    .values_mut()
                    .find(|o| {
                        o.bucket_name == request.bucket_name
                            && o.object_name == request.object_name
                    })
                    .ok_or_else(|| ClientError::not_found("object", &request.object_name))?;
                object.status = ObjectStatus::Sealed;
                object.gvg_id = request.gvg_id;
                s.sealed.push(request);
                Ok(())
            })
            .map(|_| self.next_tx_hash());
        ready(result)
    }

    fn reject_unseal_object(
        &self,
        request: RejectUnsealRequest,
    ) -> BoxFuture<'_, ClientResult<String>> {
        let result = self
            .write(|s| {
                s.objects.retain(|_, o| {
                    !(o.bucket_name == request.bucket_name
                        && o.object_name == request.object_name)
                });
                s.rejected.push(request);
                Ok(())
            })
            .map(|_| self.next_tx_hash());
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(id: u32) -> StorageProvider {
        StorageProvider {
            id,
            operator_address: format!("0xsp{}", id),
            endpoint: format!("https://sp{}.example", id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_objects_in_gvg_pages_by_id() {
        let chain = SimulatedChain::new();
        for id in 1..=5 {
            chain.add_object(ObjectInfo {
                id,
                gvg_id: if id == 3 { 9 } else { 1 },
                ..Default::default()
            });
        }

        let page = chain.list_objects_in_gvg(1, 1, 2).await.unwrap();
        let ids: Vec<u64> = page.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_create_gvg_links_into_family() {
        let chain = SimulatedChain::new();
        chain.add_sp(sp(1));
        chain
            .create_global_virtual_group(CreateGvgRequest {
                vgf_id: 0,
                primary_sp_address: "0xsp1".into(),
                secondary_sp_ids: vec![2, 3],
                deposit: 100,
                deposit_denom: "BNB".into(),
            })
            .await
            .unwrap();

        let families = chain.list_virtual_group_families(1).await.unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].gvg_ids, vec![1]);
        assert_eq!(chain.gvg(1).unwrap().total_deposit, 100);
    }

    #[tokio::test]
    async fn test_complete_swap_in_clears_pending() {
        let chain = SimulatedChain::new();
        chain.set_swap_in(0, 7, SwapInInfo::default());
        assert!(chain.query_swap_in_info(0, 7).await.unwrap().is_some());

        chain
            .complete_swap_in(CompleteSwapInRequest { vgf_id: 0, gvg_id: 7 })
            .await
            .unwrap();

        assert!(chain.query_swap_in_info(0, 7).await.unwrap().is_none());
        assert_eq!(chain.completed_swap_ins().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_calls() {
        let chain = SimulatedChain::new();
        chain.set_offline(true);
        assert!(matches!(
            chain.current_height().await,
            Err(ClientError::Rpc(_))
        ));
        chain.set_offline(false);
        assert_eq!(chain.current_height().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let chain = SimulatedChain::new();
        let err = chain.query_object_info_by_id(42).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
