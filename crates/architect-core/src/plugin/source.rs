use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::credentials::CredentialStore;
use crate::plugin::error::PluginError;
use crate::plugin::manifest::PluginDescriptor;

/// A strategy resolving a [`PluginDescriptor`] to a local artifact file.
#[async_trait]
pub trait PluginSource: Send + Sync {
    fn can_handle(&self, source_type: &str) -> bool;
    async fn resolve(&self, descriptor: &PluginDescriptor) -> Result<PathBuf, PluginError>;
}

/// The `local` source: the descriptor names a filesystem path directly.
pub struct LocalSource;

#[async_trait]
impl PluginSource for LocalSource {
    fn can_handle(&self, source_type: &str) -> bool {
        source_type == "local"
    }

    async fn resolve(&self, descriptor: &PluginDescriptor) -> Result<PathBuf, PluginError> {
        let path = descriptor.parameter("path").ok_or_else(|| PluginError::SourceResolution {
            source_type: "local".to_string(),
            plugin_id: descriptor.plugin_id.clone(),
            message: "missing 'path' parameter".to_string(),
        })?;
        let path = PathBuf::from(path);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PluginError::SourceResolution {
                source_type: "local".to_string(),
                plugin_id: descriptor.plugin_id.clone(),
                message: format!("no artifact at {}", path.display()),
            });
        }
        Ok(path)
    }
}

/// The `remote-release` source: downloads a release artifact named by a
/// repository coordinate and version, caching it under a process-wide
/// directory keyed by a stable hash of the descriptor.
pub struct RemoteReleaseSource {
    cache_dir: PathBuf,
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
    timeout: Duration,
    retry_budget: u32,
}

impl RemoteReleaseSource {
    pub fn new(cache_dir: PathBuf, credentials: Arc<CredentialStore>, timeout: Duration) -> Self {
        Self {
            cache_dir,
            client: reqwest::Client::new(),
            credentials,
            timeout,
            retry_budget: 3,
        }
    }

    fn cache_key(descriptor: &PluginDescriptor) -> String {
        let mut hasher = Sha256::new();
        hasher.update(descriptor.source_type.as_bytes());
        hasher.update(descriptor.source_parameters.to_string().as_bytes());
        hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
    }

    fn release_url(repo: &str, version: &str, plugin_id: &str) -> String {
        format!("https://github.com/{repo}/releases/download/{version}/{plugin_id}.so")
    }
}

#[async_trait]
impl PluginSource for RemoteReleaseSource {
    fn can_handle(&self, source_type: &str) -> bool {
        source_type == "remote-release"
    }

    async fn resolve(&self, descriptor: &PluginDescriptor) -> Result<PathBuf, PluginError> {
        let key = Self::cache_key(descriptor);
        let cached_path = self.cache_dir.join(format!("{key}.bin"));
        if tokio::fs::try_exists(&cached_path).await.unwrap_or(false) {
            return Ok(cached_path);
        }

        let repo = descriptor.parameter("repo").ok_or_else(|| PluginError::SourceResolution {
            source_type: "remote-release".to_string(),
            plugin_id: descriptor.plugin_id.clone(),
            message: "missing 'repo' parameter".to_string(),
        })?;
        let version = descriptor.version.as_deref().ok_or_else(|| PluginError::SourceResolution {
            source_type: "remote-release".to_string(),
            plugin_id: descriptor.plugin_id.clone(),
            message: "missing 'version' parameter".to_string(),
        })?;

        let url = Self::release_url(repo, version, &descriptor.plugin_id);
        let token = self.credentials.token_for_host(&url).await;

        let mut last_error = None;
        for attempt in 1..=self.retry_budget {
            let mut request = self.client.get(&url).timeout(self.timeout);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let bytes = response.bytes().await.map_err(|source| PluginError::SourceResolution {
                        source_type: "remote-release".to_string(),
                        plugin_id: descriptor.plugin_id.clone(),
                        message: source.to_string(),
                    })?;
                    tokio::fs::create_dir_all(&self.cache_dir).await.map_err(|source| {
                        PluginError::SourceResolution {
                            source_type: "remote-release".to_string(),
                            plugin_id: descriptor.plugin_id.clone(),
                            message: format!("failed to create plugin cache directory: {source}"),
                        }
                    })?;
                    tokio::fs::write(&cached_path, &bytes).await.map_err(|source| {
                        PluginError::SourceResolution {
                            source_type: "remote-release".to_string(),
                            plugin_id: descriptor.plugin_id.clone(),
                            message: format!("failed to write cached artifact: {source}"),
                        }
                    })?;
                    info!(plugin = %descriptor.plugin_id, %url, "downloaded plugin artifact");
                    return Ok(cached_path);
                }
                Ok(response) => {
                    last_error = Some(format!("server returned {}", response.status()));
                }
                Err(source) => {
                    last_error = Some(source.to_string());
                }
            }
            warn!(plugin = %descriptor.plugin_id, attempt, "plugin download attempt failed, retrying");
        }

        Err(PluginError::SourceResolution {
            source_type: "remote-release".to_string(),
            plugin_id: descriptor.plugin_id.clone(),
            message: last_error.unwrap_or_else(|| "exhausted retry budget".to_string()),
        })
    }
}

/// A process-wide registry of plugin sources, tried in registration
/// order for the first one that claims a given source type.
pub struct SourceRegistry {
    sources: Vec<Box<dyn PluginSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    pub fn register(&mut self, source: Box<dyn PluginSource>) {
        self.sources.push(source);
    }

    pub async fn resolve(&self, descriptor: &PluginDescriptor) -> Result<PathBuf, PluginError> {
        for source in &self.sources {
            if source.can_handle(&descriptor.source_type) {
                return source.resolve(descriptor).await;
            }
        }
        Err(PluginError::UnknownSourceType { source_type: descriptor.source_type.clone() })
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
