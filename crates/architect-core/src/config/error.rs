use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or decoding a configuration document.
///
/// Every variant here is surfaced to callers as the engine-wide
/// `CONFIG_INVALID` kind (see [`crate::error::ErrorKind`]).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("configuration document is not valid {format}: {source}")]
    Parse { format: &'static str, source: String },

    #[error("configuration document's top level must be a mapping")]
    NotAMapping,

    #[error("'{key}' could not be decoded into its plugin context type: {source}")]
    Bind { key: String, #[source] source: serde_json::Error },

    #[error("support for the '{format}' configuration format is not compiled in")]
    UnsupportedFormat { format: &'static str },
}
