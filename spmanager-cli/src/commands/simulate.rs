//! Simulate command - run a manager against an in-memory chain.
//!
//! Registers a set of storage providers, pushes synthetic objects through
//! upload and then acts as the executor: every dispatched replicate, seal
//! and GC task is reported back as successful until the queues drain or
//! Ctrl+C is pressed.

use spmanager::client::types::{ObjectInfo, ObjectStatus, SpStatus, StorageParams, StorageProvider};
use spmanager::client::SimulatedChain;
use spmanager::manager::{Manager, ManagerConfig, SpExitPlanner};
use spmanager::metrics::TracingMetricsSink;
use spmanager::resource::default_executor_budget;
use spmanager::spdb::MemorySpDb;
use spmanager::task::{Task, TaskKind, TaskPayload};
use spmanager::time::now_unix;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Operator used when the config file leaves it empty.
const SIMULATED_OPERATOR: &str = "0xsp1";

/// Executor name reported on dispatch.
const EXECUTOR: &str = "simulated-executor";

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub objects: u64,
    pub sps: u32,
    pub payload_size: u64,
    pub db: Option<PathBuf>,
}

/// Run the simulate command.
pub fn run(runner: &CliRunner, args: SimulateArgs) -> Result<(), CliError> {
    runner.log_startup("simulate");

    let params = StorageParams {
        redundant_data_chunk_num: 2,
        redundant_parity_chunk_num: 1,
        ..StorageParams::default()
    };
    if (args.sps as usize) <= params.redundancy_count() {
        return Err(CliError::Config(format!(
            "at least {} storage providers are needed, got {}",
            params.redundancy_count() + 1,
            args.sps
        )));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(simulate(runner, args, params))
}

async fn simulate(
    runner: &CliRunner,
    args: SimulateArgs,
    params: StorageParams,
) -> Result<(), CliError> {
    let mut config = ManagerConfig::from(runner.config());
    if config.operator_address.is_empty() {
        config.operator_address = SIMULATED_OPERATOR.to_string();
    }

    let chain = Arc::new(SimulatedChain::new());
    for id in 1..=args.sps {
        let operator_address = if id == 1 {
            config.operator_address.clone()
        } else {
            format!("0xsp{}", id)
        };
        chain.add_sp(StorageProvider {
            id,
            operator_address,
            endpoint: format!("https://sp{}.simulated", id),
            status: SpStatus::InService,
        });
    }
    chain.set_storage_params(params);
    chain.set_height(1_000_000);

    let db = Arc::new(match &args.db {
        Some(path) if path.exists() => MemorySpDb::load(path)
            .map_err(|e| CliError::Config(format!("failed to load {}: {}", path.display(), e)))?,
        _ => MemorySpDb::new(),
    });

    let shutdown = CancellationToken::new();
    let manager = Manager::builder(config)
        .chain(chain.clone())
        .meta(chain.clone())
        .db(db.clone())
        .metrics(Arc::new(TracingMetricsSink))
        .planner(Arc::new(SpExitPlanner::new(db.clone())))
        .shutdown(shutdown.clone())
        .build()?;
    manager.start().await?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            signal_token.cancel();
        }
    });

    let family = manager.pick_virtual_group_family().await?;
    println!("Using virtual group family {}", family.id);

    for id in 1..=args.objects {
        let object = ObjectInfo {
            id,
            bucket_name: "simulated-bucket".to_string(),
            object_name: format!("object-{}", id),
            payload_size: args.payload_size,
            status: ObjectStatus::Created,
            create_at: now_unix(),
            ..Default::default()
        };
        chain.add_object(object.clone());
        let task = Task::new_upload(object, params, family.id);
        manager.handle_create_upload(task.clone())?;
        manager.handle_done_upload(task).await?;
    }
    println!("Uploaded {} objects", args.objects);

    let executed = execute_until_idle(&manager, &shutdown).await;
    manager.background().wait_idle().await;
    println!("Executed {} tasks", executed);
    println!("{}", manager.statistics());

    manager.shutdown().await;
    if let Some(path) = &args.db {
        db.save(path)
            .map_err(|e| CliError::Config(format!("failed to save {}: {}", path.display(), e)))?;
        println!("Saved database to {}", path.display());
    }
    Ok(())
}

/// Dispatches and completes tasks until nothing is left to hand out.
async fn execute_until_idle(manager: &Arc<Manager>, shutdown: &CancellationToken) -> usize {
    let budget = default_executor_budget();
    let mut executed = 0;
    while !shutdown.is_cancelled() {
        let Some(task) = manager.dispatch(&budget, EXECUTOR) else {
            if manager.uploading_count() == 0 {
                break;
            }
            // Wait for background writes and timeouts to release held tasks
            tokio::time::sleep(Duration::from_millis(200)).await;
            continue;
        };
        let key = task.key().clone();
        let kind = task.kind();
        if let Err(e) = complete(manager, task) {
            warn!(task_key = %key, kind = %kind, error = %e, "Simulated report rejected");
        }
        executed += 1;
    }
    executed
}

/// Reports `task` back to the manager as successfully executed.
fn complete(manager: &Manager, mut task: Task) -> Result<(), CliError> {
    match task.kind() {
        TaskKind::ReplicatePiece => {
            if let Some(replicate) = task.as_replicate_mut() {
                replicate.secondary_addresses = replicate.secondary_endpoints.clone();
                replicate.secondary_signatures = replicate
                    .secondary_endpoints
                    .iter()
                    .map(|endpoint| endpoint.as_bytes().to_vec())
                    .collect();
            }
            manager.handle_replicate(task)?;
        }
        TaskKind::SealObject => manager.handle_seal(task)?,
        TaskKind::GcObject => {
            if let Some(gc) = task.as_gc_object_mut() {
                gc.current_block = gc.end_block + 1;
            }
            manager.handle_gc_object(task)?;
        }
        TaskKind::ReceivePiece => {
            if let TaskPayload::ReceivePiece(receive) = &mut task.payload {
                receive.sealed = true;
            }
            manager.handle_receive(task)?;
        }
        TaskKind::RecoverPiece => {
            if let Some(recover) = task.as_recover_piece_mut() {
                recover.recovered = true;
            }
            manager.handle_recover_piece(task)?;
        }
        TaskKind::MigrateGvg => {
            if let Some(migrate) = task.as_migrate_gvg_mut() {
                migrate.finished = true;
            }
            manager.handle_migrate_gvg(task)?;
        }
        other => info!(kind = %other, "No simulated executor for task kind"),
    }
    Ok(())
}
