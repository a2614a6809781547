//! Top-level bootstrap: wires the project registry, plugin loader,
//! executor, and event bus into one [`Engine`] handle, constructed once
//! from an immutable [`EngineConfig`] the way the corpus this engine
//! descends from reads its own storage/config layer once and passes it
//! explicitly into every constructor that needs it.
//!
//! Library code never reads environment variables directly; only
//! [`EngineConfig::from_env`] does, and only the daemon binary's `main`
//! calls it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::credentials::CredentialStore;
use crate::event::EventBus;
use crate::executor::Executor;
use crate::plugin::PluginLoader;
use crate::project::ProjectRegistry;

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PLUGIN_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
const DEFAULT_EVENT_REPLAY_SIZE: usize = 64;
const DEFAULT_EVENT_SUBSCRIBER_BUFFER: usize = 64;
const DEFAULT_HTTP_PORT: u16 = 7420;

/// Every process-wide tunable the engine exposes: the project-
/// registration cache flag (§4.1), the command executor's default
/// timeout (§4.4), the event bus's replay size and per-subscriber live
/// buffer capacity (§4.5), the plugin artifact cache directory (§4.2),
/// and the HTTP surface's bind address (§6.2).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub project_cache_enabled: bool,
    pub command_timeout: Duration,
    pub event_replay_size: usize,
    pub event_subscriber_buffer: usize,
    pub plugin_cache_dir: PathBuf,
    pub plugin_download_timeout: Duration,
    pub http_bind_address: SocketAddr,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_cache_enabled: true,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            event_replay_size: DEFAULT_EVENT_REPLAY_SIZE,
            event_subscriber_buffer: DEFAULT_EVENT_SUBSCRIBER_BUFFER,
            plugin_cache_dir: default_plugin_cache_dir(),
            plugin_download_timeout: Duration::from_secs(DEFAULT_PLUGIN_DOWNLOAD_TIMEOUT_SECS),
            http_bind_address: SocketAddr::from(([127, 0, 0, 1], DEFAULT_HTTP_PORT)),
        }
    }
}

impl EngineConfig {
    /// Builds a config from [`EngineConfig::default`], overridden by
    /// `ARCHITECT_*` environment variables where set. A malformed
    /// override (non-numeric timeout, non-parsing address) is ignored
    /// with a warning rather than refusing to start.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            project_cache_enabled: env_bool("ARCHITECT_PROJECT_CACHE", defaults.project_cache_enabled),
            command_timeout: env_secs("ARCHITECT_COMMAND_TIMEOUT_SECS", defaults.command_timeout),
            event_replay_size: env_usize("ARCHITECT_EVENT_REPLAY_SIZE", defaults.event_replay_size),
            event_subscriber_buffer: env_usize(
                "ARCHITECT_EVENT_SUBSCRIBER_BUFFER",
                defaults.event_subscriber_buffer,
            ),
            plugin_cache_dir: std::env::var("ARCHITECT_PLUGIN_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.plugin_cache_dir),
            plugin_download_timeout: env_secs(
                "ARCHITECT_PLUGIN_DOWNLOAD_TIMEOUT_SECS",
                defaults.plugin_download_timeout,
            ),
            http_bind_address: std::env::var("ARCHITECT_HTTP_BIND")
                .ok()
                .and_then(|v| match v.parse() {
                    Ok(addr) => Some(addr),
                    Err(source) => {
                        warn!(value = %v, %source, "invalid ARCHITECT_HTTP_BIND, using default");
                        None
                    }
                })
                .unwrap_or(defaults.http_bind_address),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
        Err(_) => default,
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn default_plugin_cache_dir() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("architect-engine").join("plugins")
}

/// One process's wired-together core: the project registry, the task
/// executor, and the execution event bus, all built from one
/// [`EngineConfig`] and sharing one plugin loader / credential store.
///
/// Cheaply cloned (every field is an `Arc`), so the daemon's HTTP
/// handlers hold a clone each rather than a reference with a lifetime
/// tied to the listener.
#[derive(Clone)]
pub struct Engine {
    pub config: Arc<EngineConfig>,
    pub projects: Arc<ProjectRegistry>,
    pub executor: Arc<Executor>,
    pub events: Arc<EventBus>,
    pub credentials: Arc<CredentialStore>,
}

impl Engine {
    /// Loads the credential store, wires the plugin loader, project
    /// registry, event bus, and executor from `config`, and returns the
    /// assembled handle. Never fails: a credential store that cannot be
    /// read or parsed degrades to an empty one rather than blocking
    /// start-up, since most projects never need a remote plugin source.
    pub async fn new(config: EngineConfig) -> Self {
        let credentials = Arc::new(match CredentialStore::load().await {
            Ok(store) => store,
            Err(source) => {
                warn!(%source, "failed to load credential store, starting with an empty one");
                CredentialStore::default()
            }
        });

        let plugin_loader = Arc::new(PluginLoader::new(
            config.plugin_cache_dir.clone(),
            Arc::clone(&credentials),
            config.plugin_download_timeout,
        ));
        let projects = Arc::new(ProjectRegistry::new(plugin_loader, config.project_cache_enabled));
        let events = Arc::new(EventBus::new(config.event_replay_size, config.event_subscriber_buffer));
        let executor =
            Executor::new(Arc::clone(&projects), Arc::clone(&events), config.project_cache_enabled, config.command_timeout);

        Self { config: Arc::new(config), projects, executor, events, credentials }
    }
}
