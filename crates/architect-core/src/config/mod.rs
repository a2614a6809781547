//! The generic configuration-document value tree.
//!
//! A project's declarative configuration file (`architect.yml` by
//! default) decodes into a [`ConfigDocument`]: a mapping of scalars,
//! mappings, and sequences with no fixed schema at the top level. Plugin
//! authors bind a typed, `Default`-able context struct to one slice of
//! this tree (see [`ConfigDocument::bind`]); the engine itself only
//! ever inspects the handful of top-level keys named in the project
//! configuration table.
//!
//! Internally every supported format is decoded into a `serde_json::Value`
//! so the rest of the crate has exactly one value-tree type to reason
//! about, regardless of which optional format feature produced it.
pub mod error;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub use error::ConfigError;

/// A scalar, mapping, or sequence decoded from a configuration document.
pub type ConfigValue = Value;

/// The on-disk encodings a configuration document may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Guesses the format from a file extension; defaults to YAML, the
    /// format for `architect.yml`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            #[cfg(feature = "toml-config")]
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// A decoded configuration document, held as a generic value tree.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    /// An empty document (no top-level keys). Used when a project has no
    /// configuration file at all.
    pub fn empty() -> Self {
        Self { root: Value::Object(Map::new()) }
    }

    /// Parses a document from its textual form in the given format.
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let root = match format {
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(text)
                    .map_err(|source| ConfigError::Parse { format: "yaml", source: source.to_string() })?;
                serde_json::to_value(yaml)
                    .map_err(|source| ConfigError::Parse { format: "yaml", source: source.to_string() })?
            }
            #[cfg(not(feature = "yaml-config"))]
            ConfigFormat::Yaml => {
                return Err(ConfigError::UnsupportedFormat { format: "yaml" });
            }
            ConfigFormat::Json => serde_json::from_str(text)
                .map_err(|source| ConfigError::Parse { format: "json", source: source.to_string() })?,
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => {
                let table: toml::Value = toml::from_str(text)
                    .map_err(|source| ConfigError::Parse { format: "toml", source: source.to_string() })?;
                serde_json::to_value(table)
                    .map_err(|source| ConfigError::Parse { format: "toml", source: source.to_string() })?
            }
        };
        // An empty or all-comments document decodes to `Value::Null` in
        // both YAML and TOML; treat that the same as an empty mapping
        // rather than rejecting a project with no declared keys yet.
        let root = if root.is_null() { Value::Object(Map::new()) } else { root };
        if !root.is_object() {
            return Err(ConfigError::NotAMapping);
        }
        Ok(Self { root })
    }

    /// Reads and parses a document from disk, inferring the format from
    /// the file extension.
    pub async fn read(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path);
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&text, format)
    }

    /// The raw value at a top-level key, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.as_object().and_then(|map| map.get(key))
    }

    /// All top-level keys, in document order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.root.as_object().into_iter().flat_map(|map| map.keys())
    }

    /// Decodes the sub-mapping at `key` into a typed, `Default`-able
    /// context. A missing key yields `T::default()`; unknown fields
    /// inside a present mapping are tolerated by serde's usual
    /// unknown-field behaviour (the target type must not set
    /// `deny_unknown_fields` if it wants this).
    pub fn bind<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.get(key) {
            None => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|source| ConfigError::Bind { key: key.to_string(), source }),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }
}
