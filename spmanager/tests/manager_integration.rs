//! Integration tests for the manager's upload pipeline.
//!
//! These tests drive the manager only through its public surface, acting as
//! the executor that polls `dispatch` and reports back:
//! - Upload → replicate → seal, with progress persisted at every step
//! - At most one pipeline task per object at any time
//! - Failed executions retried until their budget runs out
//! - Restart restores unfinished work from a saved database
//!
//! Run with: `cargo test --test manager_integration`

use std::sync::Arc;

use spmanager::client::types::{
    GlobalVirtualGroup, ObjectInfo, ObjectStatus, SpStatus, StorageParams, StorageProvider,
};
use spmanager::client::SimulatedChain;
use spmanager::error::ManagerError;
use spmanager::manager::{Manager, ManagerConfig};
use spmanager::metrics::{outcome, RecordingMetricsSink};
use spmanager::resource::default_executor_budget;
use spmanager::spdb::{MemorySpDb, SpDb, TaskState};
use spmanager::task::{Task, TaskError, TaskKind};

// ============================================================================
// Test Helpers
// ============================================================================

const EXECUTOR: &str = "executor-1";

fn params() -> StorageParams {
    StorageParams {
        redundant_data_chunk_num: 2,
        redundant_parity_chunk_num: 1,
        ..StorageParams::default()
    }
}

/// Eight providers with provider 1 as this one, primary of group 11 in
/// family 1.
fn create_chain() -> Arc<SimulatedChain> {
    let chain = Arc::new(SimulatedChain::new());
    for id in 1..=8 {
        chain.add_sp(StorageProvider {
            id,
            operator_address: format!("0xsp{}", id),
            endpoint: format!("https://sp{}", id),
            status: SpStatus::InService,
        });
    }
    chain.set_storage_params(params());
    chain.add_gvg(GlobalVirtualGroup {
        id: 11,
        family_id: 1,
        primary_sp_id: 1,
        secondary_sp_ids: vec![2, 3, 4],
        stored_size: 10,
        total_deposit: 100,
    });
    chain
}

fn create_config() -> ManagerConfig {
    let mut config = ManagerConfig::default().with_operator_address("0xsp1");
    config.vgm.default_staking_storage_size = 100;
    config.retry.enabled = false;
    config
}

fn create_manager(
    config: ManagerConfig,
    chain: &Arc<SimulatedChain>,
    db: &Arc<MemorySpDb>,
) -> (Arc<Manager>, Arc<RecordingMetricsSink>) {
    let metrics = Arc::new(RecordingMetricsSink::new());
    let manager = Manager::builder(config)
        .chain(chain.clone())
        .meta(chain.clone())
        .db(db.clone())
        .metrics(metrics.clone())
        .build()
        .unwrap();
    (manager, metrics)
}

/// Registers a created object on the chain and returns its upload task.
fn create_object(chain: &SimulatedChain, id: u64) -> Task {
    let object = ObjectInfo {
        id,
        bucket_name: "bucket".into(),
        object_name: format!("object-{}", id),
        payload_size: 1024,
        status: ObjectStatus::Created,
        ..Default::default()
    };
    chain.add_object(object.clone());
    Task::new_upload(object, params(), 1)
}

async fn upload(manager: &Manager, task: Task) {
    manager.handle_create_upload(task.clone()).unwrap();
    manager.handle_done_upload(task).await.unwrap();
    manager.background().wait_idle().await;
}

/// Fills in what a secondary provider would report after storing pieces.
fn complete_replicate(mut task: Task) -> Task {
    let replicate = task.as_replicate_mut().unwrap();
    replicate.secondary_addresses = vec!["0xsp2".into(), "0xsp3".into(), "0xsp4".into()];
    replicate.secondary_signatures = vec![vec![2], vec![3], vec![4]];
    task
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_object_flows_through_replicate_and_seal() {
    let chain = create_chain();
    let db = Arc::new(MemorySpDb::new());
    let (manager, metrics) = create_manager(create_config(), &chain, &db);
    manager.vgm().refresh().await.unwrap();
    let budget = default_executor_budget();

    upload(&manager, create_object(&chain, 1)).await;
    assert_eq!(
        db.get_upload_state(1).unwrap().task_state,
        TaskState::ReplicateObjectDoing
    );

    let replicate = manager.dispatch(&budget, EXECUTOR).unwrap();
    assert_eq!(replicate.kind(), TaskKind::ReplicatePiece);
    assert_eq!(replicate.as_replicate().unwrap().gvg_id, 11);
    assert_eq!(replicate.retry(), 1);
    assert!(manager.dispatch(&budget, EXECUTOR).is_none());

    manager.handle_replicate(complete_replicate(replicate)).unwrap();
    manager.background().wait_idle().await;
    assert_eq!(
        db.get_upload_state(1).unwrap().task_state,
        TaskState::SealObjectDoing
    );

    let seal = manager.dispatch(&budget, EXECUTOR).unwrap();
    assert_eq!(seal.kind(), TaskKind::SealObject);
    assert_eq!(seal.as_seal().unwrap().secondary_signatures.len(), 3);

    manager.handle_seal(seal).unwrap();
    manager.background().wait_idle().await;

    assert_eq!(manager.uploading_count(), 0);
    assert!(manager.dispatch(&budget, EXECUTOR).is_none());
    assert_eq!(
        db.get_upload_state(1).unwrap().task_state,
        TaskState::SealObjectDone
    );
    assert_eq!(metrics.outcome_count(outcome::SUCCEED_UPLOAD), 1);
    assert_eq!(metrics.outcome_count(outcome::SUCCEED_SEAL), 1);
}

#[tokio::test]
async fn test_object_has_one_pipeline_task_at_a_time() {
    let chain = create_chain();
    let db = Arc::new(MemorySpDb::new());
    let (manager, _) = create_manager(create_config(), &chain, &db);
    manager.vgm().refresh().await.unwrap();
    let budget = default_executor_budget();

    let task = create_object(&chain, 1);
    manager.handle_create_upload(task.clone()).unwrap();
    assert_eq!(manager.query_tasks("object-1").len(), 1);

    manager.handle_done_upload(task.clone()).await.unwrap();
    manager.background().wait_idle().await;
    let stages = manager.query_tasks("object-1");
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].kind(), TaskKind::ReplicatePiece);

    // A second upload of the same object is refused while it replicates
    assert_eq!(
        manager.handle_create_upload(task),
        Err(ManagerError::RepeatedTask)
    );

    let replicate = manager.dispatch(&budget, EXECUTOR).unwrap();
    manager.handle_replicate(complete_replicate(replicate)).unwrap();
    manager.background().wait_idle().await;
    let stages = manager.query_tasks("object-1");
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].kind(), TaskKind::SealObject);
}

#[tokio::test]
async fn test_upload_parallelism_counts_every_stage() {
    let chain = create_chain();
    let db = Arc::new(MemorySpDb::new());
    let mut config = create_config();
    config.max_upload_parallelism = 2;
    let (manager, _) = create_manager(config, &chain, &db);
    manager.vgm().refresh().await.unwrap();

    upload(&manager, create_object(&chain, 1)).await;
    manager
        .handle_create_upload(create_object(&chain, 2))
        .unwrap();
    assert_eq!(manager.uploading_count(), 2);
    assert_eq!(
        manager.handle_create_upload(create_object(&chain, 3)),
        Err(ManagerError::ExceedTask)
    );
}

#[tokio::test]
async fn test_failed_seal_is_abandoned_once_out_of_retries() {
    let chain = create_chain();
    let db = Arc::new(MemorySpDb::new());
    let mut config = create_config();
    config.tasks.seal.max_retry = 0;
    let (manager, metrics) = create_manager(config, &chain, &db);
    manager.vgm().refresh().await.unwrap();
    let budget = default_executor_budget();

    upload(&manager, create_object(&chain, 1)).await;
    let replicate = manager.dispatch(&budget, EXECUTOR).unwrap();
    manager.handle_replicate(complete_replicate(replicate)).unwrap();
    manager.background().wait_idle().await;

    let mut seal = manager.dispatch(&budget, EXECUTOR).unwrap();
    seal.set_error(Some(TaskError::new("tx failed")));
    manager.handle_seal(seal).unwrap();
    manager.background().wait_idle().await;

    assert_eq!(manager.uploading_count(), 0);
    let state = db.get_upload_state(1).unwrap();
    assert_eq!(state.task_state, TaskState::SealObjectError);
    assert_eq!(metrics.outcome_count(outcome::FAILED_SEAL), 1);
    assert_eq!(metrics.outcome_count(outcome::CANCEL_SEAL), 1);
}

// ============================================================================
// Restart
// ============================================================================

#[tokio::test]
async fn test_restart_restores_replicate_work() {
    let chain = create_chain();
    let db = Arc::new(MemorySpDb::new());
    let (manager, _) = create_manager(create_config(), &chain, &db);
    manager.vgm().refresh().await.unwrap();
    upload(&manager, create_object(&chain, 1)).await;
    upload(&manager, create_object(&chain, 2)).await;

    let replicate = manager
        .dispatch(&default_executor_budget(), EXECUTOR)
        .unwrap();
    manager.handle_replicate(complete_replicate(replicate)).unwrap();
    manager.background().wait_idle().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spdb.json");
    db.save(&path).unwrap();
    drop(manager);

    let restored = Arc::new(MemorySpDb::load(&path).unwrap());
    let (manager, _) = create_manager(create_config(), &chain, &restored);
    manager.start().await.unwrap();

    let kinds: Vec<TaskKind> = ["object-1", "object-2"]
        .iter()
        .flat_map(|name| manager.query_tasks(name))
        .map(|task| task.kind())
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&TaskKind::ReplicatePiece));
    assert!(kinds.contains(&TaskKind::SealObject));
    assert_eq!(manager.uploading_count(), 2);

    manager.shutdown().await;
}
