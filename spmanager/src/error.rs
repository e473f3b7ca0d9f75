//! Errors surfaced by the manager's public handlers.
//!
//! Every variant carries a stable numeric code so executors can tell
//! admission outcomes apart without matching on message text.

use crate::client::ClientError;
use crate::queue::QueueError;
use crate::spdb::DbError;
use crate::vgm::VgmError;
use thiserror::Error;

/// Code of a dangling (null or incomplete) task.
pub const CODE_DANGLING_TASK: i32 = 60001;
pub const CODE_REPEATED_TASK: i32 = 60002;
pub const CODE_EXCEED_TASK: i32 = 60003;
pub const CODE_CANCELED_TASK: i32 = 60004;
pub const CODE_FUTURE_SUPPORT: i32 = 60005;
pub const CODE_NO_SCHEDULER: i32 = 60006;
pub const CODE_INVALID_SWAP_OUT: i32 = 60007;
/// Code shared by every persistence failure.
pub const CODE_DB: i32 = 65201;
pub const CODE_VGM: i32 = 60101;
pub const CODE_CLIENT: i32 = 60201;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ManagerError {
    /// The task carried no payload or an incomplete one.
    #[error("task is dangling")]
    DanglingTask,

    #[error("task is repeated")]
    RepeatedTask,

    /// A queue or the cross-queue upload cap is full.
    #[error("task exceeds capacity")]
    ExceedTask,

    /// The task was retired, is stale, or reported backwards progress.
    #[error("task canceled")]
    CanceledTask,

    #[error("future support")]
    FutureSupport,

    #[error("no scheduler for migration")]
    NoScheduler,

    /// A swap-out named a successor other than this provider.
    #[error("swap out successor {successor} is not this provider {self_sp}")]
    InvalidSwapOut { successor: u32, self_sp: u32 },

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("virtual group error: {0}")]
    Vgm(#[from] VgmError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("queue error: {0}")]
    Queue(QueueError),
}

impl ManagerError {
    /// Stable numeric code reported to executors.
    pub fn code(&self) -> i32 {
        match self {
            Self::DanglingTask => CODE_DANGLING_TASK,
            Self::RepeatedTask => CODE_REPEATED_TASK,
            Self::ExceedTask => CODE_EXCEED_TASK,
            Self::CanceledTask => CODE_CANCELED_TASK,
            Self::FutureSupport => CODE_FUTURE_SUPPORT,
            Self::NoScheduler => CODE_NO_SCHEDULER,
            Self::InvalidSwapOut { .. } => CODE_INVALID_SWAP_OUT,
            Self::Db(_) => CODE_DB,
            Self::Vgm(_) => CODE_VGM,
            Self::Client(_) => CODE_CLIENT,
            Self::Queue(QueueError::Repeated { .. }) => CODE_REPEATED_TASK,
            Self::Queue(QueueError::Exceed { .. }) => CODE_EXCEED_TASK,
        }
    }
}

impl From<QueueError> for ManagerError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ManagerError::DanglingTask.code(), 60001);
        assert_eq!(ManagerError::RepeatedTask.code(), 60002);
        assert_eq!(ManagerError::ExceedTask.code(), 60003);
        assert_eq!(ManagerError::CanceledTask.code(), 60004);
        assert_eq!(ManagerError::FutureSupport.code(), 60005);
        assert_eq!(ManagerError::NoScheduler.code(), 60006);
        assert_eq!(
            ManagerError::from(DbError::Backend("down".into())).code(),
            65201
        );
    }

    #[test]
    fn test_queue_errors_map_to_admission_codes() {
        let repeated: ManagerError = QueueError::Repeated {
            queue: "upload".into(),
            key: "k".into(),
        }
        .into();
        assert_eq!(repeated.code(), CODE_REPEATED_TASK);

        let exceed: ManagerError = QueueError::Exceed {
            queue: "upload".into(),
            cap: 1,
        }
        .into();
        assert_eq!(exceed.code(), CODE_EXCEED_TASK);
    }
}
