use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use crate::task::error::TaskSystemError;
use crate::task::registry::TaskRegistry;

/// Resolves an entry task id against a [`TaskRegistry`] into an ordered
/// execution sequence.
///
/// The graph has two kinds of edges, both oriented "must complete
/// before": explicit `depends_on` edges, and phase edges added between
/// every pair of tasks in the same workflow whose phases are ordered.
/// Resolution walks backward from the entry task to collect its full
/// transitive dependency closure, then topologically sorts that induced
/// subgraph, breaking ties between simultaneously-runnable tasks by
/// ascending task id so the same registry always yields the same order.
pub struct DependencyGraph<'a> {
    registry: &'a TaskRegistry,
}

impl<'a> DependencyGraph<'a> {
    pub fn new(registry: &'a TaskRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, entry_task_id: &str) -> Result<Vec<String>, TaskSystemError> {
        if !self.registry.contains(entry_task_id) {
            return Err(TaskSystemError::NotFound { task_id: entry_task_id.to_string() });
        }

        let mut edges: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        let mut reverse: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for task in self.registry.list() {
            edges.entry(task.id.as_str()).or_default();
            reverse.entry(task.id.as_str()).or_default();
        }

        for task in self.registry.list() {
            for dep in &task.depends_on {
                if !self.registry.contains(dep) {
                    return Err(TaskSystemError::UnknownDependency {
                        task_id: task.id.clone(),
                        dependency_id: dep.clone(),
                    });
                }
                edges.entry(dep.as_str()).or_default().insert(task.id.as_str());
                reverse.entry(task.id.as_str()).or_default().insert(dep.as_str());
            }
        }

        let tasks: Vec<_> = self.registry.list().collect();
        for a in &tasks {
            let Some(phase_a) = a.phase else { continue };
            for b in &tasks {
                if a.id == b.id {
                    continue;
                }
                let Some(phase_b) = b.phase else { continue };
                if phase_a.precedes(phase_b) {
                    edges.entry(a.id.as_str()).or_default().insert(b.id.as_str());
                    reverse.entry(b.id.as_str()).or_default().insert(a.id.as_str());
                }
            }
        }

        // Ancestor closure: everything reachable backward from the entry
        // task, including the entry itself.
        let mut included: BTreeSet<&str> = BTreeSet::new();
        let mut stack = vec![entry_task_id];
        while let Some(id) = stack.pop() {
            if !included.insert(id) {
                continue;
            }
            if let Some(preds) = reverse.get(id) {
                for pred in preds {
                    stack.push(pred);
                }
            }
        }

        let mut in_degree: HashMap<&str, usize> = included.iter().map(|id| (*id, 0)).collect();
        for id in &included {
            if let Some(successors) = edges.get(id) {
                for succ in successors {
                    if included.contains(succ) {
                        *in_degree.get_mut(succ).expect("successor is in induced subgraph") += 1;
                    }
                }
            }
        }

        let mut frontier: BinaryHeap<Reverse<&str>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| Reverse(*id))
            .collect();

        let mut order = Vec::with_capacity(included.len());
        while let Some(Reverse(id)) = frontier.pop() {
            order.push(id.to_string());
            if let Some(successors) = edges.get(id) {
                for succ in successors {
                    if !included.contains(succ) {
                        continue;
                    }
                    let degree = in_degree.get_mut(succ).expect("successor is in induced subgraph");
                    *degree -= 1;
                    if *degree == 0 {
                        frontier.push(Reverse(succ));
                    }
                }
            }
        }

        if order.len() != included.len() {
            let cycle = find_cycle(&included, &edges).unwrap_or_else(|| vec![entry_task_id.to_string()]);
            return Err(TaskSystemError::Cycle { cycle });
        }

        Ok(order)
    }
}

fn find_cycle<'b>(included: &BTreeSet<&'b str>, edges: &HashMap<&'b str, BTreeSet<&'b str>>) -> Option<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut path: Vec<&str> = Vec::new();
    for start in included {
        if visited.contains(start) {
            continue;
        }
        if let Some(cycle) = dfs_cycle(start, edges, included, &mut visited, &mut on_stack, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn dfs_cycle<'b>(
    node: &'b str,
    edges: &HashMap<&'b str, BTreeSet<&'b str>>,
    included: &BTreeSet<&'b str>,
    visited: &mut HashSet<&'b str>,
    on_stack: &mut HashSet<&'b str>,
    path: &mut Vec<&'b str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    on_stack.insert(node);
    path.push(node);

    if let Some(successors) = edges.get(node) {
        for succ in successors {
            if !included.contains(succ) {
                continue;
            }
            if on_stack.contains(succ) {
                let start_idx = path.iter().position(|n| n == succ).unwrap_or(0);
                let mut cycle: Vec<String> = path[start_idx..].iter().map(|s| s.to_string()).collect();
                cycle.push((*succ).to_string());
                return Some(cycle);
            }
            if !visited.contains(succ) {
                if let Some(cycle) = dfs_cycle(succ, edges, included, visited, on_stack, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    on_stack.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Phase, Task, TaskResult};
    use std::sync::Arc;

    fn task(id: &str, phase: Option<Phase>, depends_on: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            phase,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            description: String::new(),
            registered_by: "test".to_string(),
            handler: Arc::new(|_, _, _| TaskResult::success("ok")),
        }
    }

    #[test]
    fn task_with_no_phase_or_dependencies_runs_alone() {
        let mut registry = TaskRegistry::new();
        registry.add(task("solo", None, &[])).unwrap();
        let order = DependencyGraph::new(&registry).resolve("solo").unwrap();
        assert_eq!(order, vec!["solo".to_string()]);
    }

    #[test]
    fn explicit_dependency_runs_before_dependent() {
        let mut registry = TaskRegistry::new();
        registry.add(task("a", Some(Phase::Build), &[])).unwrap();
        registry.add(task("b", Some(Phase::Test), &["a"])).unwrap();
        let order = DependencyGraph::new(&registry).resolve("b").unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn phase_ordering_pulls_in_earlier_phase_tasks() {
        let mut registry = TaskRegistry::new();
        registry.add(task("lint", Some(Phase::Lint), &[])).unwrap();
        registry.add(task("build", Some(Phase::Build), &[])).unwrap();
        let order = DependencyGraph::new(&registry).resolve("build").unwrap();
        assert_eq!(order, vec!["lint".to_string(), "build".to_string()]);
    }

    #[test]
    fn equal_depth_ties_break_by_ascending_id() {
        let mut registry = TaskRegistry::new();
        registry.add(task("zeta", None, &[])).unwrap();
        registry.add(task("alpha", None, &[])).unwrap();
        registry.add(task("root", None, &["zeta", "alpha"])).unwrap();
        let order = DependencyGraph::new(&registry).resolve("root").unwrap();
        assert_eq!(order, vec!["alpha".to_string(), "zeta".to_string(), "root".to_string()]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut registry = TaskRegistry::new();
        registry.add(task("loop", None, &["loop"])).unwrap();
        let err = DependencyGraph::new(&registry).resolve("loop").unwrap_err();
        assert!(matches!(err, TaskSystemError::Cycle { .. }));
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let mut registry = TaskRegistry::new();
        registry.add(task("a", None, &["ghost"])).unwrap();
        let err = DependencyGraph::new(&registry).resolve("a").unwrap_err();
        match err {
            TaskSystemError::UnknownDependency { task_id, dependency_id } => {
                assert_eq!(task_id, "a");
                assert_eq!(dependency_id, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
