use thiserror::Error;

use crate::error::ErrorKind;
use crate::task::TaskSystemError;

/// Errors raised while validating or dispatching an `execute_task` call.
/// Failures that happen *during* execution are not reported here — they
/// are captured as `FAILED` events on the execution's own stream
/// (per the executor's error-propagation policy).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no project named '{name}' is registered")]
    ProjectUnknown { name: String },

    #[error("no task with id '{task_id}' is registered for project '{project_name}'")]
    TaskUnknown { project_name: String, task_id: String },

    #[error(transparent)]
    Dependency(#[from] TaskSystemError),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::ProjectUnknown { .. } => ErrorKind::ProjectUnknown,
            ExecutorError::TaskUnknown { .. } => ErrorKind::TaskUnknown,
            ExecutorError::Dependency(source) => source.kind(),
        }
    }
}
