use std::collections::BTreeMap;

use crate::task::error::TaskSystemError;
use crate::task::Task;

/// Per-project mapping from task id to task record.
///
/// Backed by a `BTreeMap` so listing is always sorted by id without a
/// separate sort step, matching the "order-preserving listing" the
/// registry promises.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Task>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry").field("ids", &self.tasks.keys().collect::<Vec<_>>()).finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task, failing `TASK_ID_COLLISION` if its id is
    /// already taken (naming both plugins).
    pub fn add(&mut self, task: Task) -> Result<(), TaskSystemError> {
        if let Some(existing) = self.tasks.get(&task.id) {
            return Err(TaskSystemError::IdCollision {
                task_id: task.id,
                first_plugin: existing.registered_by.clone(),
                second_plugin: task.registered_by,
            });
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// All tasks, sorted by id.
    pub fn list(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskResult;
    use std::sync::Arc;

    fn dummy_task(id: &str, plugin: &str) -> Task {
        Task {
            id: id.to_string(),
            phase: None,
            depends_on: Vec::new(),
            description: String::new(),
            registered_by: plugin.to_string(),
            handler: Arc::new(|_, _, _| TaskResult::success("ok")),
        }
    }

    #[test]
    fn listing_empty_registry_yields_empty() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.list().count(), 0);
    }

    #[test]
    fn add_detects_collision_naming_both_plugins() {
        let mut registry = TaskRegistry::new();
        registry.add(dummy_task("build", "plugin-a")).unwrap();
        let err = registry.add(dummy_task("build", "plugin-b")).unwrap_err();
        match err {
            TaskSystemError::IdCollision { task_id, first_plugin, second_plugin } => {
                assert_eq!(task_id, "build");
                assert_eq!(first_plugin, "plugin-a");
                assert_eq!(second_plugin, "plugin-b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn listing_is_sorted_by_id() {
        let mut registry = TaskRegistry::new();
        registry.add(dummy_task("zeta", "p")).unwrap();
        registry.add(dummy_task("alpha", "p")).unwrap();
        let ids: Vec<&str> = registry.list().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }
}
