//! End-to-end tests of the HTTP surface, driven
//! in-process against the real `axum::Router` via `tower::ServiceExt::oneshot`
//! — no bound socket involved.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use architect_core::config::ConfigDocument;
use architect_core::credentials::CredentialStore;
use architect_core::plugin::PluginLoader;
use architect_core::project::ProjectRegistry;
use architect_core::task::{Phase, TaskRegistry};
use architect_core::{Engine, EngineConfig, EventBus, Executor, Project, Task, TaskResult};
use architectd::routes::router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn task(id: &str, phase: Option<Phase>, depends_on: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        phase,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        description: format!("{id} task"),
        registered_by: "http-surface-test".to_string(),
        handler: Arc::new(|_, _, _| TaskResult::success("done")),
    }
}

fn bare_project(name: &str, tasks: TaskRegistry) -> Project {
    Project { name: name.to_string(), directory: PathBuf::from("."), config: ConfigDocument::empty(), tasks, sub_projects: Vec::new() }
}

/// Builds an `Engine` with a credential store rooted under a temp
/// directory rather than the real user home, so `/auth` tests never
/// touch the operator's own `~/.architect-engine`.
async fn engine_with_project(project: Project) -> Engine {
    let cache_dir = tempfile::tempdir().unwrap().into_path();
    let cred_path = tempfile::tempdir().unwrap().into_path().join("config.yml");

    let config = EngineConfig { plugin_cache_dir: cache_dir, ..EngineConfig::default() };
    let credentials = Arc::new(CredentialStore::load_from(&cred_path).await.unwrap());
    let loader = Arc::new(PluginLoader::new(config.plugin_cache_dir.clone(), Arc::clone(&credentials), Duration::from_secs(5)));
    let projects = Arc::new(ProjectRegistry::new(loader, config.project_cache_enabled));
    projects.insert(Arc::new(project)).await;
    let events = Arc::new(EventBus::new(config.event_replay_size, config.event_subscriber_buffer));
    let executor = Executor::new(Arc::clone(&projects), Arc::clone(&events), config.project_cache_enabled, config.command_timeout);

    Engine { config: Arc::new(config), projects, executor, events, credentials }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn list_projects_returns_registered_project_summaries() {
    let mut tasks = TaskRegistry::new();
    tasks.add(task("build", Some(Phase::Build), &[])).unwrap();
    let engine = engine_with_project(bare_project("demo", tasks)).await;

    let response = router(engine).oneshot(Request::get("/api/projects").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!([{"name": "demo", "directory": ".", "task_count": 1, "sub_projects": []}]));
}

#[tokio::test(flavor = "multi_thread")]
async fn get_project_on_unknown_name_is_404_with_error_body() {
    let engine = engine_with_project(bare_project("demo", TaskRegistry::new())).await;

    let response =
        router(engine).oneshot(Request::get("/api/projects/ghost").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "PROJECT_UNKNOWN");
}

#[tokio::test(flavor = "multi_thread")]
async fn list_tasks_is_sorted_by_id() {
    let mut tasks = TaskRegistry::new();
    tasks.add(task("zeta", None, &[])).unwrap();
    tasks.add(task("alpha", None, &[])).unwrap();
    let engine = engine_with_project(bare_project("demo", tasks)).await;

    let response =
        router(engine).oneshot(Request::get("/api/projects/demo/tasks").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let ids: Vec<_> = body.as_array().unwrap().iter().map(|t| t["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["alpha", "zeta"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn get_task_on_unknown_id_is_404_task_unknown() {
    let engine = engine_with_project(bare_project("demo", TaskRegistry::new())).await;
    let response = router(engine)
        .oneshot(Request::get("/api/projects/demo/tasks/ghost").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "TASK_UNKNOWN");
}

/// Dispatching an execution returns its id immediately; the execution's
/// stream (fetched right after) carries the expected lifecycle events.
#[tokio::test(flavor = "multi_thread")]
async fn execute_task_dispatches_and_stream_reports_completion() {
    let mut tasks = TaskRegistry::new();
    tasks.add(task("build", None, &[])).unwrap();
    let engine = engine_with_project(bare_project("demo", tasks)).await;
    let app = router(engine);

    let dispatch = app
        .clone()
        .oneshot(
            Request::post("/api/projects/demo/tasks/build")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&Vec::<String>::new()).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(dispatch.status(), StatusCode::OK);
    let dispatch_body = body_json(dispatch).await;
    let execution_id = dispatch_body["execution_id"].as_str().unwrap().to_string();

    // The background execution is tiny and synchronous; give the spawned
    // task a moment to run before reading the stream back.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stream_response = app
        .oneshot(Request::get(format!("/api/executions/{execution_id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(stream_response.status(), StatusCode::OK);
    assert_eq!(
        stream_response.headers().get("content-type").unwrap(),
        "application/x-ndjson"
    );
    let bytes = stream_response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    let ids: Vec<_> = lines.iter().map(|l| l["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["task.started", "task.completed", "execution.completed"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn execute_task_on_unknown_task_is_404_before_any_execution_id_is_allocated() {
    let engine = engine_with_project(bare_project("demo", TaskRegistry::new())).await;
    let response = router(engine)
        .oneshot(
            Request::post("/api/projects/demo/tasks/ghost")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&Vec::<String>::new()).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// The `/auth` endpoints round-trip a token's presence without ever
/// echoing the token value itself back.
#[tokio::test(flavor = "multi_thread")]
async fn auth_endpoints_set_check_and_revoke_a_token() {
    let engine = engine_with_project(bare_project("demo", TaskRegistry::new())).await;
    let app = router(engine);

    let initial_status = app
        .clone()
        .oneshot(Request::get("/auth/github.com/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(initial_status).await, json!({"configured": false}));

    let set = app
        .clone()
        .oneshot(
            Request::post("/auth/github.com")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json!({"token": "ghp_secret"})).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(set.status(), StatusCode::NO_CONTENT);

    let after_set = app
        .clone()
        .oneshot(Request::get("/auth/github.com/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let after_set_body = body_json(after_set).await;
    assert_eq!(after_set_body, json!({"configured": true}));
    assert!(!after_set_body.to_string().contains("ghp_secret"));

    let deleted = app
        .clone()
        .oneshot(Request::delete("/auth/github.com").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let second_delete =
        app.clone().oneshot(Request::delete("/auth/github.com").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(second_delete.status(), StatusCode::NOT_FOUND);
}
