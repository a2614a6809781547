//! The HTTP surface the engine exposes to external collaborators:
//! project registration and listing, task listing,
//! execution dispatch, the execution event stream, and the credential
//! store's `/auth` endpoints.

use std::path::PathBuf;

use architect_core::executor::ExecutorError;
use architect_core::project::ProjectError;
use architect_core::{Engine, Error, EventKind, ExecutionEvent, ProjectSummary, TaskSummary};
use axum::body::Body;
use bytes::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::ApiError;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/api/projects", post(register_project).get(list_projects))
        .route("/api/projects/:name", get(get_project))
        .route("/api/projects/:name/tasks", get(list_tasks))
        .route("/api/projects/:name/tasks/:task_id", get(get_task).post(execute_task))
        .route("/api/executions/:execution_id", get(stream_execution))
        .route("/auth/:provider", post(set_auth).delete(delete_auth))
        .route("/auth/:provider/status", get(auth_status))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

#[derive(Deserialize)]
struct RegisterProjectRequest {
    name: Option<String>,
    path: String,
}

/// `POST /api/projects` — idempotent registration.
async fn register_project(
    State(engine): State<Engine>,
    Json(request): Json<RegisterProjectRequest>,
) -> Result<Json<ProjectSummary>, ApiError> {
    let directory = PathBuf::from(&request.path);
    let name = request.name.unwrap_or_else(|| {
        directory.file_name().and_then(|n| n.to_str()).map(str::to_string).unwrap_or_else(|| request.path.clone())
    });

    let project = engine.projects.register_project(&name, &directory).await?;
    Ok(Json(ProjectSummary::from(project.as_ref())))
}

/// `GET /api/projects` — listing, sorted by name.
async fn list_projects(State(engine): State<Engine>) -> Json<Vec<ProjectSummary>> {
    let projects = engine.projects.list_projects().await;
    Json(projects.iter().map(|project| ProjectSummary::from(project.as_ref())).collect())
}

/// `GET /api/projects/{name}` — project summary or `404`.
async fn get_project(
    State(engine): State<Engine>,
    Path(name): Path<String>,
) -> Result<Json<ProjectSummary>, ApiError> {
    let project = engine
        .projects
        .get_project(&name)
        .await
        .ok_or_else(|| ApiError(Error::Project(ProjectError::NotFound { name: name.clone() })))?;
    Ok(Json(ProjectSummary::from(project.as_ref())))
}

/// `GET /api/projects/{name}/tasks` — sorted task list.
async fn list_tasks(
    State(engine): State<Engine>,
    Path(name): Path<String>,
) -> Result<Json<Vec<TaskSummary>>, ApiError> {
    let project = engine
        .projects
        .get_project(&name)
        .await
        .ok_or_else(|| ApiError(Error::Project(ProjectError::NotFound { name: name.clone() })))?;
    Ok(Json(project.tasks.list().map(TaskSummary::from).collect()))
}

/// `GET /api/projects/{name}/tasks/{id}` — task summary or `404`.
async fn get_task(
    State(engine): State<Engine>,
    Path((name, task_id)): Path<(String, String)>,
) -> Result<Json<TaskSummary>, ApiError> {
    let project = engine
        .projects
        .get_project(&name)
        .await
        .ok_or_else(|| ApiError(Error::Project(ProjectError::NotFound { name: name.clone() })))?;
    let task = project.tasks.get(&task_id).ok_or_else(|| {
        ApiError(Error::Executor(ExecutorError::TaskUnknown { project_name: name.clone(), task_id: task_id.clone() }))
    })?;
    Ok(Json(TaskSummary::from(task)))
}

#[derive(Serialize)]
struct ExecuteResponse {
    execution_id: Uuid,
}

/// `POST /api/projects/{name}/tasks/{id}` — dispatches the execution and
/// returns its id immediately; the body is the `args` array (an absent
/// or empty body is treated as no arguments).
async fn execute_task(
    State(engine): State<Engine>,
    Path((name, task_id)): Path<(String, String)>,
    body: Option<Json<Vec<String>>>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let args = body.map(|Json(args)| args).unwrap_or_default();
    let outcome = engine.executor.execute_task(&name, &task_id, args).await?;
    Ok(Json(ExecuteResponse { execution_id: outcome.execution_id }))
}

/// `GET /api/executions/{execution_id}` — newline-framed JSON stream
/// closing once a terminal event for this execution has
/// been observed.
async fn stream_execution(State(engine): State<Engine>, Path(execution_id): Path<Uuid>) -> Response {
    let events = engine.events.subscribe(execution_id).map(|item| {
        let line = match item {
            Ok(event) => serde_json::to_vec(&StreamPayload { id: event_kind_id(&event), event: Some(&event), error: None }),
            Err(err) => serde_json::to_vec(&StreamPayload::<ExecutionEvent> {
                id: "subscriber.overrun",
                event: None,
                error: Some(err.to_string()),
            }),
        };
        let mut line = line.unwrap_or_default();
        line.push(b'\n');
        Ok::<Bytes, std::convert::Infallible>(Bytes::from(line))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(events))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(Serialize)]
struct StreamPayload<'a, T: Serialize> {
    id: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// The stable event-kind name carried in every stream line's `id` field.
fn event_kind_id(event: &ExecutionEvent) -> &'static str {
    let is_overall = event.task_id.is_none();
    match (event.kind, is_overall) {
        (EventKind::Started, true) => "execution.started",
        (EventKind::Started, false) => "task.started",
        (EventKind::Completed, true) => "execution.completed",
        (EventKind::Completed, false) => "task.completed",
        (EventKind::Failed, true) => "execution.failed",
        (EventKind::Failed, false) => "task.failed",
        (EventKind::Skipped, true) => "execution.skipped",
        (EventKind::Skipped, false) => "task.skipped",
        (EventKind::TaskCompleted, _) => "task.completed",
        (EventKind::Output, _) => "task.output",
    }
}

#[derive(Deserialize)]
struct SetTokenRequest {
    token: String,
}

#[derive(Serialize)]
struct AuthStatus {
    configured: bool,
}

/// `POST /auth/{provider}` — stores a bearer token for `provider`.
async fn set_auth(
    State(engine): State<Engine>,
    Path(provider): Path<String>,
    Json(request): Json<SetTokenRequest>,
) -> Result<StatusCode, ApiError> {
    engine
        .credentials
        .set_token(&provider, request.token)
        .await
        .map_err(|source| ApiError(Error::Other(source.to_string())))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /auth/{provider}` — revokes `provider`'s token, if any.
async fn delete_auth(State(engine): State<Engine>, Path(provider): Path<String>) -> Result<StatusCode, ApiError> {
    let removed = engine
        .credentials
        .remove_token(&provider)
        .await
        .map_err(|source| ApiError(Error::Other(source.to_string())))?;
    Ok(if removed { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND })
}

/// `GET /auth/{provider}/status` — whether a token is configured. Never
/// echoes the token itself back over the HTTP surface.
async fn auth_status(State(engine): State<Engine>, Path(provider): Path<String>) -> Json<AuthStatus> {
    Json(AuthStatus { configured: engine.credentials.has_provider(&provider).await })
}
