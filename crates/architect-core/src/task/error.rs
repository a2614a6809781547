use thiserror::Error;

use crate::error::ErrorKind;

/// Errors raised by the task registry and dependency resolver.
#[derive(Debug, Error)]
pub enum TaskSystemError {
    #[error("task '{task_id}' is already registered (first by plugin '{first_plugin}', again by plugin '{second_plugin}')")]
    IdCollision { task_id: String, first_plugin: String, second_plugin: String },

    #[error("task '{task_id}' depends on unknown task '{dependency_id}'")]
    UnknownDependency { task_id: String, dependency_id: String },

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("no task with id '{task_id}' is registered for this project")]
    NotFound { task_id: String },
}

impl TaskSystemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskSystemError::IdCollision { .. } => ErrorKind::TaskIdCollision,
            TaskSystemError::UnknownDependency { .. } => ErrorKind::DependencyUnknown,
            TaskSystemError::Cycle { .. } => ErrorKind::DependencyCycle,
            TaskSystemError::NotFound { .. } => ErrorKind::TaskUnknown,
        }
    }
}
