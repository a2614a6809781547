use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::command::{CommandError, CommandOutput};
use crate::config::ConfigDocument;
use crate::task::TaskResult;

/// What a task handler is given access to besides its own arguments: a
/// command executor and a resource extractor, per the executor's
/// environment contract. Implemented concretely by
/// [`crate::executor::TaskEnvironment`]; handlers only ever see the
/// trait object.
pub trait Environment: Send + Sync {
    /// Runs `command` in `cwd` with an optional timeout override (falls
    /// back to the engine's configured default). Arguments baked into
    /// `command` must already be shell-escaped by the caller; this
    /// primitive does not re-escape anything.
    fn run_command(
        &self,
        cwd: &Path,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError>;

    /// Reads a bundled textual resource shipped inside the calling
    /// plugin's artifact, by name. `None` if no such resource exists.
    fn read_resource(&self, name: &str) -> Option<String>;
}

/// The project-scoped, read-only state a handler executes against.
#[derive(Debug, Clone, Copy)]
pub struct ProjectContext<'a> {
    pub project_name: &'a str,
    pub directory: &'a Path,
    pub config: &'a ConfigDocument,
}

/// A task's handler: synchronous, taking the environment, the project
/// context, and the caller-supplied argument list, returning a result
/// tree.
pub type TaskHandler =
    Arc<dyn Fn(&dyn Environment, &ProjectContext<'_>, &[String]) -> TaskResult + Send + Sync>;
