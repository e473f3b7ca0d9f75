//! spmanager - task scheduling core for a storage-provider daemon
//!
//! Objects uploaded by clients move through a pipeline of upload, replication
//! to secondary providers, on-chain sealing, garbage collection and recovery.
//! This crate owns the in-memory task queues for every stage, the manager that
//! drives state transitions between them, and the background schedulers that
//! recover lost pieces and restore work after a restart.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use spmanager::client::SimulatedChain;
//! use spmanager::manager::{Manager, ManagerConfig};
//! use spmanager::resource::default_executor_budget;
//! use spmanager::spdb::MemorySpDb;
//!
//! let chain = Arc::new(SimulatedChain::new());
//! let manager = Manager::builder(ManagerConfig::default().with_operator_address("0xsp1"))
//!     .chain(chain.clone())
//!     .meta(chain)
//!     .db(Arc::new(MemorySpDb::new()))
//!     .build()?;
//! manager.start().await?;
//!
//! // Executors poll for work within their resource budget
//! if let Some(task) = manager.dispatch(&default_executor_budget(), "executor-1") {
//!     // ... execute, then report back through the matching handler
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod queue;
pub mod recovery;
pub mod resource;
pub mod retry;
pub mod spdb;
pub mod task;
pub mod time;
pub mod vgm;

/// Version of the spmanager library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
