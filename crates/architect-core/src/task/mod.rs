//! Task records, the phase/workflow ordering model, and the dependency
//! resolver that turns a registry plus an entry task id into an ordered
//! execution sequence.
pub mod dependency;
pub mod error;
pub mod handler;
pub mod phase;
pub mod registry;
pub mod result;

pub use dependency::DependencyGraph;
pub use error::TaskSystemError;
pub use handler::{Environment, ProjectContext, TaskHandler};
pub use phase::{Phase, Workflow};
pub use registry::TaskRegistry;
pub use result::TaskResult;

/// A single registered unit of work.
///
/// Task ids are unique within a registry; `depends_on` ids must resolve
/// within the same registry or the dependency resolver reports them as
/// missing.
#[derive(Clone)]
pub struct Task {
    pub id: String,
    pub phase: Option<Phase>,
    pub depends_on: Vec<String>,
    pub description: String,
    /// The id of the plugin that registered this task; carried so a
    /// `TASK_ID_COLLISION` failure can name both offending plugins.
    pub registered_by: String,
    pub handler: TaskHandler,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("depends_on", &self.depends_on)
            .field("description", &self.description)
            .field("registered_by", &self.registered_by)
            .field("handler", &"<fn>")
            .finish()
    }
}

/// A JSON-serialisable summary of a task, for the HTTP surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub phase: Option<Phase>,
    pub depends_on: Vec<String>,
    pub description: String,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            phase: task.phase,
            depends_on: task.depends_on.clone(),
            description: task.description.clone(),
        }
    }
}
