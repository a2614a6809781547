use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ConfigDocument;
use crate::plugin::PluginLoader;
use crate::project::{Project, ProjectError, CONFIG_FILE_NAMES, SUB_PROJECTS_DIR_NAME};
use crate::task::TaskRegistry;

/// The canonical set of registered projects, keyed by name.
///
/// Readers take a strong `Arc<Project>` handle and may keep using it
/// after a writer replaces the registry's entry for that name — the
/// old snapshot simply stops being reachable from `get_project`/
/// `list_projects`.
pub struct ProjectRegistry {
    projects: RwLock<HashMap<String, Arc<Project>>>,
    plugin_loader: Arc<PluginLoader>,
    cache_enabled: bool,
}

impl ProjectRegistry {
    pub fn new(plugin_loader: Arc<PluginLoader>, cache_enabled: bool) -> Self {
        Self { projects: RwLock::new(HashMap::new()), plugin_loader, cache_enabled }
    }

    /// Registers (or re-registers) a project rooted at `directory`.
    ///
    /// `requested_name` is the default name; a `project.name` key in
    /// the project's own configuration document takes precedence. The
    /// cache is keyed by that resolved name, not `requested_name` — the
    /// config is read before the cache lookup so a project whose config
    /// overrides its name still hits the cache on repeat registration.
    pub async fn register_project(
        &self,
        requested_name: &str,
        directory: &Path,
    ) -> Result<Arc<Project>, ProjectError> {
        let directory = directory.to_path_buf();
        let config = self.read_config(requested_name, &directory).await?;
        let name = resolve_project_name(&config, requested_name);

        if self.cache_enabled {
            if let Some(existing) = self.projects.read().await.get(&name) {
                if existing.directory == directory {
                    return Ok(Arc::clone(existing));
                }
            }
        }

        let project = self.build_project(name, directory, config).await?;
        let name = project.name.clone();
        let project = Arc::new(project);
        self.projects.write().await.insert(name.clone(), Arc::clone(&project));
        info!(project = %name, directory = %project.directory.display(), "project registered");
        Ok(project)
    }

    /// Inserts an already-built [`Project`] directly, bypassing config
    /// reading and plugin loading entirely. Exposed for embedders that
    /// construct a project's task tree programmatically (in-process
    /// plugins, test harnesses) rather than through a declarative
    /// configuration file on disk.
    pub async fn insert(&self, project: Arc<Project>) {
        self.projects.write().await.insert(project.name.clone(), project);
    }

    pub async fn get_project(&self, name: &str) -> Option<Arc<Project>> {
        self.projects.read().await.get(name).cloned()
    }

    pub async fn list_projects(&self) -> Vec<Arc<Project>> {
        let mut projects: Vec<_> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }

    /// Reads `directory`'s config, resolves its effective name, and
    /// builds a full [`Project`] (plugin load + sub-project discovery).
    /// Always does a full build — callers that want the registration
    /// cache's short-circuit go through [`Self::register_project`]
    /// instead; this is also how sub-projects are built, since they
    /// aren't individually cache-checked.
    fn load_project<'a>(
        &'a self,
        requested_name: &'a str,
        directory: &'a Path,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Project, ProjectError>> + 'a>> {
        Box::pin(async move {
            let config = self.read_config(requested_name, directory).await?;
            let name = resolve_project_name(&config, requested_name);
            self.build_project(name, directory.to_path_buf(), config).await
        })
    }

    async fn build_project(
        &self,
        name: String,
        directory: PathBuf,
        config: ConfigDocument,
    ) -> Result<Project, ProjectError> {
        let mut tasks = TaskRegistry::new();
        self.plugin_loader.load_project_plugins(&config, &mut tasks).await.map_err(|source| {
            warn!(project = %name, error = %source, "plugin load failed during project registration");
            ProjectError::PluginLoad { name: name.clone(), source }
        })?;

        let sub_projects = self.discover_sub_projects(&directory).await?;

        Ok(Project { name, directory, config, tasks, sub_projects })
    }

    async fn read_config(&self, name: &str, directory: &Path) -> Result<ConfigDocument, ProjectError> {
        for candidate in CONFIG_FILE_NAMES {
            let path = directory.join(candidate);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return ConfigDocument::read(&path)
                    .await
                    .map_err(|source| ProjectError::Config { name: name.to_string(), source });
            }
        }
        Ok(ConfigDocument::empty())
    }

    async fn discover_sub_projects(&self, directory: &Path) -> Result<Vec<Project>, ProjectError> {
        let sub_projects_dir = directory.join(SUB_PROJECTS_DIR_NAME);
        if !tokio::fs::try_exists(&sub_projects_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&sub_projects_dir).await {
            Ok(read_dir) => read_dir,
            Err(_) => return Ok(Vec::new()),
        };
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let has_config = futures_any_config_file(&path).await;
            if has_config {
                entries.push(path);
            }
        }
        entries.sort();

        let mut sub_projects = Vec::with_capacity(entries.len());
        for path in entries {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| path.display().to_string());
            sub_projects.push(self.load_project(&name, &path).await?);
        }
        Ok(sub_projects)
    }
}

/// Resolves a project's effective name: its config's `project.name` key
/// if present, otherwise the name the caller requested.
fn resolve_project_name(config: &ConfigDocument, requested_name: &str) -> String {
    config
        .get("project")
        .and_then(|v| v.get("name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| requested_name.to_string())
}

async fn futures_any_config_file(dir: &Path) -> bool {
    for candidate in CONFIG_FILE_NAMES {
        if tokio::fs::try_exists(dir.join(candidate)).await.unwrap_or(false) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::credentials::CredentialStore;

    fn registry() -> ProjectRegistry {
        let loader = Arc::new(PluginLoader::new(
            std::env::temp_dir().join("architect-engine-registry-test-cache"),
            Arc::new(CredentialStore::default()),
            Duration::from_secs(1),
        ));
        ProjectRegistry::new(loader, true)
    }

    #[tokio::test]
    async fn registering_a_project_without_a_config_file_uses_the_requested_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let project = registry.register_project("widgets", dir.path()).await.unwrap();
        assert_eq!(project.name, "widgets");
        assert!(project.sub_projects.is_empty());
    }

    #[tokio::test]
    async fn project_config_name_overrides_the_requested_name() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("architect.yml"), "project:\n  name: override-name\n").await.unwrap();
        let registry = registry();
        let project = registry.register_project("widgets", dir.path()).await.unwrap();
        assert_eq!(project.name, "override-name");
    }

    #[tokio::test]
    async fn re_registering_the_same_directory_returns_the_cached_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let first = registry.register_project("widgets", dir.path()).await.unwrap();
        let second = registry.register_project("widgets", dir.path()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn re_registering_with_a_config_overridden_name_still_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("architect.yml"), "project:\n  name: override-name\n").await.unwrap();
        let registry = registry();
        let first = registry.register_project("widgets", dir.path()).await.unwrap();
        let second = registry.register_project("widgets", dir.path()).await.unwrap();
        assert_eq!(first.name, "override-name");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn re_registering_a_different_directory_replaces_the_entry() {
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let first = registry.register_project("widgets", first_dir.path()).await.unwrap();
        let second = registry.register_project("widgets", second_dir.path()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.get_project("widgets").await.unwrap().directory, second_dir.path());
    }

    #[tokio::test]
    async fn discovers_sub_projects_with_a_config_file_sorted_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let sub_root = dir.path().join(SUB_PROJECTS_DIR_NAME);
        tokio::fs::create_dir_all(sub_root.join("b-child")).await.unwrap();
        tokio::fs::create_dir_all(sub_root.join("a-child")).await.unwrap();
        tokio::fs::write(sub_root.join("b-child").join("architect.yml"), "").await.unwrap();
        tokio::fs::write(sub_root.join("a-child").join("architect.yml"), "").await.unwrap();
        // No config file: not picked up as a sub-project.
        tokio::fs::create_dir_all(sub_root.join("c-not-a-project")).await.unwrap();

        let registry = registry();
        let project = registry.register_project("parent", dir.path()).await.unwrap();
        let names: Vec<_> = project.sub_projects.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["a-child", "b-child"]);
    }

    #[tokio::test]
    async fn list_projects_is_sorted_by_name() {
        let registry = registry();
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        registry.register_project("zeta", dir_a.path()).await.unwrap();
        registry.register_project("alpha", dir_b.path()).await.unwrap();
        let names: Vec<_> = registry.list_projects().await.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
