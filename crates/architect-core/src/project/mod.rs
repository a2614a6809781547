//! The project model and the registration cache.
pub mod error;
pub mod registry;

pub use error::ProjectError;
pub use registry::ProjectRegistry;

use std::path::PathBuf;

use crate::config::ConfigDocument;
use crate::task::TaskRegistry;

/// The name of the configuration file recognised at a project's root;
/// `.yaml` is accepted as an alias.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["architect.yml", "architect.yaml"];

/// The directory name, if present at a project's root, whose immediate
/// children are scanned for sub-projects.
pub const SUB_PROJECTS_DIR_NAME: &str = "sub-projects";

/// A registered unit of work: a name, an on-disk directory, a decoded
/// configuration document, the task registry built from its loaded
/// plugins, and an ordered list of sub-projects.
///
/// The project tree is acyclic and each project's name is unique inside
/// its parent; enforced at registration/sub-project-discovery time, not
/// re-checked here.
pub struct Project {
    pub name: String,
    pub directory: PathBuf,
    pub config: ConfigDocument,
    pub tasks: TaskRegistry,
    pub sub_projects: Vec<Project>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("tasks", &self.tasks)
            .field("sub_projects", &self.sub_projects.iter().map(|p| &p.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Project {
    /// Finds a sub-project by name, non-recursively.
    pub fn sub_project(&self, name: &str) -> Option<&Project> {
        self.sub_projects.iter().find(|p| p.name == name)
    }
}

/// A JSON-serialisable summary of a project, for the HTTP surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub directory: PathBuf,
    pub task_count: usize,
    pub sub_projects: Vec<String>,
}

impl From<&Project> for ProjectSummary {
    fn from(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            directory: project.directory.clone(),
            task_count: project.tasks.len(),
            sub_projects: project.sub_projects.iter().map(|p| p.name.clone()).collect(),
        }
    }
}
