//! The concrete [`Environment`] a task handler runs against: a bounded-
//! timeout shell command primitive and a resource reader. Handlers only
//! ever see this through the `&dyn Environment` trait object.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::command::{CommandError, CommandOutput};
use crate::task::handler::Environment;

/// Runs commands through a shell and reads resources from a fixed
/// directory (the owning project's directory — plugin artifacts in
/// this workspace are `cdylib`s, not archives, so bundled resources are
/// modelled as plain files alongside the project rather than packed
/// into the artifact itself).
pub struct TaskEnvironment {
    default_timeout: Duration,
    resource_dir: PathBuf,
}

impl TaskEnvironment {
    pub fn new(default_timeout: Duration, resource_dir: PathBuf) -> Self {
        Self { default_timeout, resource_dir }
    }
}

impl Environment for TaskEnvironment {
    fn run_command(
        &self,
        cwd: &Path,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let cwd = cwd.to_path_buf();
        let command = command.to_string();

        // `Environment::run_command` is a synchronous contract (handlers
        // are plain functions, including ones reached through the
        // plugin FFI boundary), but spawning and waiting on a child
        // process is inherently async under tokio. `block_in_place`
        // hands this worker thread's other work to the rest of the
        // runtime for the duration of the blocking call.
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(run_command_async(&cwd, &command, timeout))
        })
    }

    fn read_resource(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.resource_dir.join(name)).ok()
    }
}

async fn run_command_async(cwd: &Path, command: &str, timeout: Duration) -> Result<CommandOutput, CommandError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .kill_on_drop(true)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|source| CommandError::Spawn { command: command.to_string(), source })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(source)) => Err(CommandError::Spawn { command: command.to_string(), source }),
        Err(_) => {
            warn!(%command, timeout_secs = timeout.as_secs(), "command timed out");
            Err(CommandError::Timeout { command: command.to_string(), timeout_secs: timeout.as_secs() })
        }
    }
}
