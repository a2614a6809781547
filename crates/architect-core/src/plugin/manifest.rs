use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ConfigDocument, ConfigError};

/// What the project configuration declares for one plugin:
/// `{source_type, source_parameters, plugin_id, version}`.
///
/// The core recognises `local` and `remote-release` as built-in source
/// types; the set is extensible through [`crate::plugin::source`]'s
/// strategy registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub plugin_id: String,
    pub version: Option<String>,
    pub source_type: String,
    pub source_parameters: Value,
}

impl PluginDescriptor {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.source_parameters.get(key).and_then(Value::as_str)
    }
}

/// One entry of the `plugins` sequence in a project's configuration
/// document.
#[derive(Debug, Deserialize)]
struct RawPluginEntry {
    name: String,
    repo: Option<String>,
    #[serde(rename = "type")]
    source_type: Option<String>,
    path: Option<String>,
    version: Option<String>,
}

impl From<RawPluginEntry> for PluginDescriptor {
    fn from(raw: RawPluginEntry) -> Self {
        let source_type = raw.source_type.unwrap_or_else(|| {
            if raw.repo.is_some() { "remote-release" } else { "local" }.to_string()
        });

        let mut parameters = Map::new();
        if let Some(path) = raw.path {
            parameters.insert("path".to_string(), Value::String(path));
        }
        if let Some(repo) = raw.repo {
            parameters.insert("repo".to_string(), Value::String(repo));
        }
        if let Some(version) = &raw.version {
            parameters.insert("version".to_string(), Value::String(version.clone()));
        }

        PluginDescriptor {
            plugin_id: raw.name,
            version: raw.version,
            source_type,
            source_parameters: Value::Object(parameters),
        }
    }
}

/// Reads the `plugins` key of a project's configuration document into a
/// list of descriptors. An absent `plugins` key yields an empty list.
pub fn parse_descriptors(config: &ConfigDocument) -> Result<Vec<PluginDescriptor>, ConfigError> {
    match config.get("plugins") {
        None => Ok(Vec::new()),
        Some(value) => {
            let raw: Vec<RawPluginEntry> = serde_json::from_value(value.clone())
                .map_err(|source| ConfigError::Bind { key: "plugins".to_string(), source })?;
            Ok(raw.into_iter().map(PluginDescriptor::from).collect())
        }
    }
}
