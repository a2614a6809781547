//! The process-private credential store consulted by remote plugin
//! sources.
//!
//! A thin YAML-backed `{provider: token}` map under
//! `<user-home>/.architect-engine/config.yml`, guarded by the same
//! [`ConfigDocument`] machinery as project configuration so there is
//! exactly one YAML-decoding code path in the crate. Values are
//! base64-obfuscated, not encrypted — this store is meant to keep a
//! token out of shell history and `ps` output, not to resist a reader
//! of the file itself. Tokens are never echoed back over the HTTP
//! surface; the only consumer is [`crate::plugin::source::RemoteReleaseSource`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::ErrorKind;

const DIR_NAME: &str = ".architect-engine";
const FILE_NAME: &str = "config.yml";

/// Errors raised while reading, writing, or decoding the credential
/// store file.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credential store at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("credential store at {path} is not valid YAML: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },

    #[error("could not determine the current user's home directory")]
    NoHomeDir,
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigInvalid
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(flatten)]
    providers: BTreeMap<String, String>,
}

/// A process-private `{provider: token}` map consulted by remote plugin
/// sources. The store's own file is the only place a token is ever
/// written; the in-memory map is kept behind an `RwLock` so the `/auth`
/// HTTP surface (§6.2) can add or revoke a provider's token at runtime
/// without restarting the daemon, while remote sources reading a token
/// mid-request never block on a writer for longer than one save.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    tokens: RwLock<BTreeMap<String, String>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self { path: PathBuf::new(), tokens: RwLock::new(BTreeMap::new()) }
    }
}

impl CredentialStore {
    /// Loads the store from `<user-home>/.architect-engine/config.yml`.
    /// A missing file is treated as an empty store, not an error — most
    /// projects never configure a remote plugin source that needs one.
    pub async fn load() -> Result<Self, CredentialError> {
        let path = Self::default_path()?;
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self, CredentialError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self { path: path.to_path_buf(), tokens: RwLock::new(BTreeMap::new()) });
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CredentialError::Io { path: path.to_path_buf(), source })?;
        let stored: StoredTokens = serde_yaml::from_str(&text)
            .map_err(|source| CredentialError::Parse { path: path.to_path_buf(), source })?;
        let tokens = stored
            .providers
            .into_iter()
            .filter_map(|(provider, obfuscated)| {
                decode(&obfuscated).map(|token| (provider.clone(), token)).or_else(|| {
                    warn!(%provider, "credential store entry is not valid base64, ignoring");
                    None
                })
            })
            .collect();
        Ok(Self { path: path.to_path_buf(), tokens: RwLock::new(tokens) })
    }

    /// Persists `tokens` to `path`, obfuscating every value and
    /// restricting the file to owner-only permissions on POSIX.
    pub async fn save_to(
        path: &Path,
        tokens: &BTreeMap<String, String>,
    ) -> Result<(), CredentialError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CredentialError::Io { path: parent.to_path_buf(), source })?;
        }
        let stored = StoredTokens {
            providers: tokens.iter().map(|(provider, token)| (provider.clone(), encode(token))).collect(),
        };
        let text = serde_yaml::to_string(&stored)
            .map_err(|source| CredentialError::Parse { path: path.to_path_buf(), source })?;
        tokio::fs::write(path, text)
            .await
            .map_err(|source| CredentialError::Io { path: path.to_path_buf(), source })?;
        restrict_permissions(path).await;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, CredentialError> {
        let home = dirs::home_dir().ok_or(CredentialError::NoHomeDir)?;
        Ok(home.join(DIR_NAME).join(FILE_NAME))
    }

    /// Looks up a bearer token by the host portion of a URL. `None` if
    /// no matching provider is configured, or the URL has no host.
    pub async fn token_for_host(&self, url: &str) -> Option<String> {
        let host = host_of(url)?;
        self.tokens.read().await.get(host).cloned()
    }

    pub async fn token_for_provider(&self, provider: &str) -> Option<String> {
        self.tokens.read().await.get(provider).cloned()
    }

    pub async fn has_provider(&self, provider: &str) -> bool {
        self.tokens.read().await.contains_key(provider)
    }

    /// Sets `provider`'s token, persisting the whole store to disk
    /// immediately. Used by the credential store's `POST /auth/{provider}`
    /// HTTP adapter; never reachable from a remote plugin source.
    pub async fn set_token(&self, provider: &str, token: String) -> Result<(), CredentialError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(provider.to_string(), token);
        if !self.path.as_os_str().is_empty() {
            Self::save_to(&self.path, &tokens).await?;
        }
        Ok(())
    }

    /// Removes `provider`'s token, if any, persisting the change.
    /// Returns whether a token was actually present.
    pub async fn remove_token(&self, provider: &str) -> Result<bool, CredentialError> {
        let mut tokens = self.tokens.write().await;
        let removed = tokens.remove(provider).is_some();
        if removed && !self.path.as_os_str().is_empty() {
            Self::save_to(&self.path, &tokens).await?;
        }
        Ok(removed)
    }
}

/// Extracts the host portion of an `http(s)://host[:port]/path` URL
/// without pulling in a full URL-parsing dependency for one lookup.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split("://").nth(1)?;
    let authority = rest.split('/').next()?;
    let host = authority.rsplit('@').next().unwrap_or(authority);
    Some(host.split(':').next().unwrap_or(host))
}

fn encode(token: &str) -> String {
    BASE64.encode(token.as_bytes())
}

fn decode(obfuscated: &str) -> Option<String> {
    BASE64.decode(obfuscated).ok().and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(source) = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        warn!(path = %path.display(), %source, "failed to restrict credential store permissions");
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}
