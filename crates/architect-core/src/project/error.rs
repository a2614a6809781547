use thiserror::Error;

use crate::config::ConfigError;
use crate::error::ErrorKind;
use crate::plugin::PluginError;

/// Errors raised while registering or looking up a project.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to load configuration for project '{name}': {source}")]
    Config { name: String, #[source] source: ConfigError },

    #[error("failed to load plugins for project '{name}': {source}")]
    PluginLoad { name: String, #[source] source: PluginError },

    #[error("no project named '{name}' is registered")]
    NotFound { name: String },
}

impl ProjectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectError::Config { .. } => ErrorKind::ConfigInvalid,
            ProjectError::PluginLoad { source, .. } => source.kind(),
            ProjectError::NotFound { .. } => ErrorKind::ProjectUnknown,
        }
    }
}
