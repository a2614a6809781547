//! The command-execution primitive shared by the [`task`](crate::task)
//! environment contract and the [`executor`](crate::executor)'s concrete
//! implementation of it.
//!
//! Kept as its own leaf module (rather than folded into `executor`) so
//! that `task::Environment` — which every task handler is written
//! against — does not need to depend on the executor crate-internals
//! that actually spawn the subprocess.

use thiserror::Error;

use crate::error::ErrorKind;

/// The captured outcome of a successfully spawned, non-timed-out
/// command. `exit_code` is always in `[0, 255]`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The only two failure modes the command executor can surface, per
/// the command-execution contract: everything else is folded into a
/// [`CommandOutput`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command '{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("failed to spawn command '{command}': {source}")]
    Spawn { command: String, #[source] source: std::io::Error },
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Timeout { .. } => ErrorKind::CommandTimeout,
            CommandError::Spawn { .. } => ErrorKind::CommandSpawn,
        }
    }
}
