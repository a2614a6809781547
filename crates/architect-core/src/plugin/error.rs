use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::error::ErrorKind;
use crate::task::TaskSystemError;

/// Errors raised while resolving, loading, or registering a plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("no plugin source registered for source type '{source_type}'")]
    UnknownSourceType { source_type: String },

    #[error("plugin source '{source_type}' could not resolve '{plugin_id}': {message}")]
    SourceResolution { source_type: String, plugin_id: String, message: String },

    #[error("failed to load plugin artifact at {path}: {source}")]
    Load { path: PathBuf, #[source] source: libloading::Error },

    #[error("plugin artifact at {path} is not a valid plugin: {message}")]
    InvalidArtifact { path: PathBuf, message: String },

    #[error("plugin '{plugin_id}' panicked during {operation}")]
    Panic { plugin_id: String, operation: &'static str },

    #[error("plugin '{plugin_id}' context could not be bound: {source}")]
    ContextBind { plugin_id: String, #[source] source: ConfigError },

    #[error("plugin '{plugin_id}' failed to register its tasks: {source}")]
    Registration { plugin_id: String, #[source] source: TaskSystemError },

    #[error("failed to parse the project's plugin descriptors: {0}")]
    Descriptors(#[from] ConfigError),
}

impl PluginError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PluginError::Registration { source, .. } => source.kind(),
            PluginError::Descriptors(_) => ErrorKind::ConfigInvalid,
            _ => ErrorKind::PluginLoad,
        }
    }
}
