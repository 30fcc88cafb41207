use focusdeck_ipc::TaskId;
use thiserror::Error;

/// A lifecycle operation was refused. Nothing was changed locally or queued
/// for the remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FocusError {
    #[error("\"{title}\" is already in focus - complete or pause it first")]
    AlreadyFocused { id: TaskId, title: String },

    #[error("task {0} is not in focus")]
    NotFocused(TaskId),

    #[error("no task is in focus")]
    NothingFocused,

    #[error("task {0} is already done")]
    AlreadyDone(TaskId),

    #[error("no task with id {0}")]
    NotFound(TaskId),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
