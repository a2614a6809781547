//! The crate-wide error type, aggregating every subsystem's typed error
//! behind one `Result` alias, the same way the corpus this engine is
//! descended from rolls its kernel, plugin, stage, storage, and event
//! errors into one top-level `Error`.

use thiserror::Error;

use crate::command::CommandError;
use crate::config::ConfigError;
use crate::event::EventBusError;
use crate::executor::ExecutorError;
use crate::plugin::PluginError;
use crate::project::ProjectError;
use crate::task::TaskSystemError;

/// The taxonomy of failure kinds the engine's external interfaces report.
/// Named exactly as the error-handling design enumerates them; every
/// variant below maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigInvalid,
    PluginLoad,
    TaskIdCollision,
    DependencyCycle,
    DependencyUnknown,
    ProjectUnknown,
    TaskUnknown,
    CommandTimeout,
    CommandSpawn,
    SubscriberOverrun,
    HandlerFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "CONFIG_INVALID",
            ErrorKind::PluginLoad => "PLUGIN_LOAD",
            ErrorKind::TaskIdCollision => "TASK_ID_COLLISION",
            ErrorKind::DependencyCycle => "DEPENDENCY_CYCLE",
            ErrorKind::DependencyUnknown => "DEPENDENCY_UNKNOWN",
            ErrorKind::ProjectUnknown => "PROJECT_UNKNOWN",
            ErrorKind::TaskUnknown => "TASK_UNKNOWN",
            ErrorKind::CommandTimeout => "COMMAND_TIMEOUT",
            ErrorKind::CommandSpawn => "COMMAND_SPAWN",
            ErrorKind::SubscriberOverrun => "SUBSCRIBER_OVERRUN",
            ErrorKind::HandlerFailed => "HANDLER_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The crate's aggregated error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    TaskSystem(#[from] TaskSystemError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The taxonomy kind this error reports at the external interfaces.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::ConfigInvalid,
            Error::Project(e) => e.kind(),
            Error::Plugin(e) => e.kind(),
            Error::TaskSystem(e) => e.kind(),
            Error::Executor(e) => e.kind(),
            Error::EventBus(_) => ErrorKind::SubscriberOverrun,
            Error::Command(e) => e.kind(),
            Error::Other(_) => ErrorKind::HandlerFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
