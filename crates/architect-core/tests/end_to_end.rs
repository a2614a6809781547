//! End-to-end executor/event-bus scenarios exercised through the public
//! API only (no internal `#[cfg(test)]` hooks): a hand-built project
//! tree registered via `ProjectRegistry::insert`, run through a real
//! `Executor`, observed through a real `EventBus` subscription. These
//! correspond to the single-task-success, dependency-order, and
//! sub-project-failure-propagation scenarios, plus the boundary
//! behaviours and round-trip laws it names.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use architect_core::config::ConfigDocument;
use architect_core::credentials::CredentialStore;
use architect_core::executor::ExecutorError;
use architect_core::plugin::PluginLoader;
use architect_core::project::ProjectRegistry;
use architect_core::task::{Phase, TaskRegistry, TaskSystemError};
use architect_core::{EventBus, EventKind, Executor, Project, Task, TaskResult};
use tokio_stream::StreamExt;

fn task(id: &str, phase: Option<Phase>, depends_on: &[&str], outcome: TaskResult) -> Task {
    Task {
        id: id.to_string(),
        phase,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        description: String::new(),
        registered_by: "end-to-end-test".to_string(),
        handler: Arc::new(move |_, _, _| outcome.clone()),
    }
}

fn bare_project(name: &str, tasks: TaskRegistry, sub_projects: Vec<Project>) -> Project {
    Project { name: name.to_string(), directory: PathBuf::from("."), config: ConfigDocument::empty(), tasks, sub_projects }
}

async fn harness(cache_enabled: bool) -> (Arc<ProjectRegistry>, Arc<Executor>, Arc<EventBus>) {
    let loader = Arc::new(PluginLoader::new(
        std::env::temp_dir().join("architect-engine-e2e-cache"),
        Arc::new(CredentialStore::default()),
        Duration::from_secs(5),
    ));
    let registry = Arc::new(ProjectRegistry::new(loader, cache_enabled));
    let events = Arc::new(EventBus::new(64, 64));
    let executor = Executor::new(Arc::clone(&registry), Arc::clone(&events), cache_enabled, Duration::from_secs(300));
    (registry, executor, events)
}

/// Scenario A — a single standalone task succeeding.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_a_single_task_success() {
    let (registry, executor, events) = harness(false).await;
    let mut tasks = TaskRegistry::new();
    tasks.add(task("hello", None, &[], TaskResult::success("ok"))).unwrap();
    registry.insert(Arc::new(bare_project("demo", tasks, Vec::new()))).await;

    let outcome = executor.execute_task("demo", "hello", Vec::new()).await.unwrap();
    let events: Vec<_> = events.subscribe(outcome.execution_id).collect::<Vec<_>>().await;
    let kinds: Vec<_> = events.into_iter().map(|e| e.unwrap().kind).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::TaskCompleted, EventKind::Completed]);
}

/// Scenario B — `b` depends on `a`; `a` must fully complete before `b`
/// starts, and the overall terminal is `COMPLETED`.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_b_dependency_order_across_phases() {
    let (registry, executor, events) = harness(false).await;
    let mut tasks = TaskRegistry::new();
    tasks.add(task("a", Some(Phase::Build), &[], TaskResult::success("a done"))).unwrap();
    tasks.add(task("b", Some(Phase::Test), &["a"], TaskResult::success("b done"))).unwrap();
    registry.insert(Arc::new(bare_project("demo", tasks, Vec::new()))).await;

    let outcome = executor.execute_task("demo", "b", Vec::new()).await.unwrap();
    let events: Vec<_> =
        events.subscribe(outcome.execution_id).collect::<Vec<_>>().await.into_iter().map(Result::unwrap).collect();

    assert_eq!(events.len(), 5);
    assert_eq!((events[0].kind, events[0].task_id.as_deref()), (EventKind::Started, Some("a")));
    assert_eq!((events[1].kind, events[1].task_id.as_deref()), (EventKind::TaskCompleted, Some("a")));
    assert_eq!((events[2].kind, events[2].task_id.as_deref()), (EventKind::Started, Some("b")));
    assert_eq!((events[3].kind, events[3].task_id.as_deref()), (EventKind::TaskCompleted, Some("b")));
    assert_eq!(events[4].kind, EventKind::Completed);
    assert!(events[4].task_id.is_none());
}

/// Scenario C — a sub-project's task failure aborts the whole execution
/// before the parent project's own same-named task ever starts.
#[tokio::test(flavor = "multi_thread")]
async fn scenario_c_subproject_failure_propagates_and_blocks_parent() {
    let (registry, executor, events) = harness(false).await;

    let mut sub_tasks = TaskRegistry::new();
    sub_tasks.add(task("build", None, &[], TaskResult::failure("boom").with_sub_results(vec![TaskResult::failure("line1\nline2")]))).unwrap();
    let sub = bare_project("sub", sub_tasks, Vec::new());

    let mut root_tasks = TaskRegistry::new();
    root_tasks.add(task("build", None, &[], TaskResult::success("root ok"))).unwrap();
    registry.insert(Arc::new(bare_project("root", root_tasks, vec![sub]))).await;

    let outcome = executor.execute_task("root", "build", Vec::new()).await.unwrap();
    let events: Vec<_> =
        events.subscribe(outcome.execution_id).collect::<Vec<_>>().await.into_iter().map(Result::unwrap).collect();

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].kind, EventKind::Started);
    assert_eq!(events[0].project, "sub");
    assert_eq!(events[0].parent_project.as_deref(), Some("root"));
    assert_eq!(events[1].kind, EventKind::Failed);
    assert_eq!(events[1].project, "sub");
    assert!(events[1].error_details.as_deref().unwrap().contains("FAIL"));
    assert_eq!(events[2].kind, EventKind::Failed);
    assert!(events[2].task_id.is_none());
    // The root project's own `build` task never started: only 3 events
    // total, none of them carrying `project: "root"` with a `task_id`.
    assert!(!events.iter().any(|e| e.project == "root" && e.task_id.is_some()));
}

/// Boundary: a project with no sub-projects reduces recursion to the
/// local case (no STARTED/terminal events for a project that doesn't
/// exist).
#[tokio::test(flavor = "multi_thread")]
async fn boundary_empty_sub_project_list_runs_only_the_local_task() {
    let (registry, executor, events) = harness(false).await;
    let mut tasks = TaskRegistry::new();
    tasks.add(task("solo", None, &[], TaskResult::success("ok"))).unwrap();
    registry.insert(Arc::new(bare_project("lonely", tasks, Vec::new()))).await;

    let outcome = executor.execute_task("lonely", "solo", Vec::new()).await.unwrap();
    let events: Vec<_> =
        events.subscribe(outcome.execution_id).collect::<Vec<_>>().await.into_iter().map(Result::unwrap).collect();
    assert!(events.iter().all(|e| e.project == "lonely"));
}

/// Boundary: an empty task registry lists as empty, and resolving a
/// self-dependent task (cycle of length 1) fails `DEPENDENCY_CYCLE`
/// synchronously, before any execution id is allocated.
#[tokio::test(flavor = "multi_thread")]
async fn boundary_empty_registry_and_self_dependency_cycle() {
    let (registry, executor, _events) = harness(false).await;

    let empty_tasks = TaskRegistry::new();
    assert_eq!(empty_tasks.list().count(), 0);

    let mut tasks = TaskRegistry::new();
    tasks.add(task("loop", None, &["loop"], TaskResult::success("unreachable"))).unwrap();
    registry.insert(Arc::new(bare_project("cyclic", tasks, Vec::new()))).await;

    let err = executor.execute_task("cyclic", "loop", Vec::new()).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Dependency(TaskSystemError::Cycle { .. })));
}

/// `execute_task` against an unknown project or unknown task fails
/// synchronously with the matching taxonomy kind.
#[tokio::test(flavor = "multi_thread")]
async fn unknown_project_and_task_are_rejected_synchronously() {
    let (registry, executor, _events) = harness(false).await;
    let mut tasks = TaskRegistry::new();
    tasks.add(task("hello", None, &[], TaskResult::success("ok"))).unwrap();
    registry.insert(Arc::new(bare_project("demo", tasks, Vec::new()))).await;

    assert!(matches!(
        executor.execute_task("ghost", "hello", Vec::new()).await.unwrap_err(),
        ExecutorError::ProjectUnknown { .. }
    ));
    assert!(matches!(
        executor.execute_task("demo", "ghost", Vec::new()).await.unwrap_err(),
        ExecutorError::TaskUnknown { .. }
    ));
}

/// Task-result caching: a second execution of the same task with the
/// same args and project name is observed as `SKIPPED`, not
/// re-invoked, once caching is enabled.
#[tokio::test(flavor = "multi_thread")]
async fn cached_task_result_is_skipped_on_second_execution() {
    let (registry, executor, events) = harness(true).await;
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let mut tasks = TaskRegistry::new();
    tasks
        .add(Task {
            id: "build".to_string(),
            phase: None,
            depends_on: Vec::new(),
            description: String::new(),
            registered_by: "test".to_string(),
            handler: Arc::new(move |_, _, _| {
                calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                TaskResult::success("built")
            }),
        })
        .unwrap();
    registry.insert(Arc::new(bare_project("demo", tasks, Vec::new()))).await;

    let first = executor.execute_task("demo", "build", Vec::new()).await.unwrap();
    let first_kinds: Vec<_> = events
        .subscribe(first.execution_id)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|e| e.unwrap().kind)
        .collect();
    assert_eq!(first_kinds, vec![EventKind::Started, EventKind::TaskCompleted, EventKind::Completed]);

    let second = executor.execute_task("demo", "build", Vec::new()).await.unwrap();
    let second_kinds: Vec<_> = events
        .subscribe(second.execution_id)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|e| e.unwrap().kind)
        .collect();
    assert_eq!(second_kinds, vec![EventKind::Started, EventKind::Skipped, EventKind::Completed]);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1, "handler must not re-run on a cache hit");
}

/// Round-trip law (a): registering the same `(name, path)` twice while
/// caching is enabled returns the same task list without reloading
/// plugins (no plugins are declared here, so "reload" would otherwise
/// be unobservable; the `Arc::ptr_eq` check stands in for "did not
/// rebuild").
#[tokio::test]
async fn round_trip_law_a_repeated_registration_is_idempotent_under_cache() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(PluginLoader::new(
        std::env::temp_dir().join("architect-engine-e2e-cache-2"),
        Arc::new(CredentialStore::default()),
        Duration::from_secs(5),
    ));
    let registry = ProjectRegistry::new(loader, true);

    let first = registry.register_project("widgets", dir.path()).await.unwrap();
    let second = registry.register_project("widgets", dir.path()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.tasks.list().count(), second.tasks.list().count());
}

/// Round-trip law (b): a `TaskResult` tree rendered to text and parsed
/// back yields the same success verdict at every node.
#[test]
fn round_trip_law_b_render_parse_preserves_verdict_at_every_node() {
    let tree = TaskResult::success("root").with_sub_results(vec![
        TaskResult::success("ok child"),
        TaskResult::failure("bad child").with_sub_results(vec![TaskResult::failure("grandchild boom")]),
    ]);
    let parsed = TaskResult::parse(&tree.render()).expect("renders and re-parses");
    assert_eq!(tree.is_failed(), parsed.is_failed());
    assert_eq!(tree, parsed);
}
