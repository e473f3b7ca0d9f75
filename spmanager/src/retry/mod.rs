//! Restoring work from persisted upload progress.
//!
//! Queues are a cache over the progress rows in the database. After a
//! restart, or when a task silently dropped out of its queue, the
//! [`TaskRetryScheduler`] walks those rows and finishes the work: replicate
//! tasks are pushed again, seals are resubmitted, and objects stuck past
//! the reject threshold are rejected on chain.

mod config;
mod iterator;
mod scheduler;

pub use config::{
    RetryConfig, DEFAULT_RETRY_BACKOFF, DEFAULT_RETRY_ITEM_INTERVAL, DEFAULT_RETRY_LOOP_INTERVAL,
    DEFAULT_RETRY_PREFETCH_LIMIT,
};
pub use iterator::{RetryKind, TaskIterator};
pub use scheduler::{RetryTarget, TaskRetryScheduler};

use crate::client::types::ObjectStatus;
use crate::client::ClientError;
use crate::error::ManagerError;
use crate::queue::QueueError;
use crate::spdb::DbError;
use thiserror::Error;

/// Why a single row could not be retried. Every failure is retried on the
/// next loop.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("object {object_id} is not in created status: {status:?}")]
    NotCreated { object_id: u64, status: ObjectStatus },

    #[error("failed to query storage params: {0}")]
    Params(ClientError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl RetryError {
    /// True when the loop should pause before the next row: the chain is
    /// unreachable or the replicate queue is full. A deleted object is not
    /// a reason to slow down.
    pub fn needs_backoff(&self) -> bool {
        match self {
            Self::Client(e) => !e.is_not_found(),
            Self::Params(_) => true,
            Self::Manager(ManagerError::Queue(QueueError::Exceed { .. })) => true,
            Self::Manager(ManagerError::ExceedTask) => true,
            _ => false,
        }
    }
}
