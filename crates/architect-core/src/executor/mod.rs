//! The recursive task executor: depth-first descent
//! over a project's sub-project tree, per-task lifecycle events funneled
//! into the [`EventBus`](crate::event::EventBus), optional result
//! caching, and cooperative cancellation.

pub mod environment;
pub mod error;

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

pub use error::ExecutorError;

use crate::event::{EventBus, EventKind, ExecutionEvent};
use crate::executor::environment::TaskEnvironment;
use crate::project::{Project, ProjectRegistry};
use crate::task::dependency::DependencyGraph;
use crate::task::handler::ProjectContext;
use crate::task::{Task, TaskResult};

/// What `execute_task` hands back immediately: execution itself runs in
/// the background, observable only through the event stream.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOutcome {
    pub execution_id: Uuid,
}

/// The fingerprint the optional result cache keys on: `(task_id, args,
/// project_name)` is the minimal safe key.
type CacheKey = (String, Vec<String>, String);

/// Why a recursive descent stopped short of running every task.
enum Halt {
    TaskFailed,
    Cancelled,
}

/// Runs resolved task sequences against a project tree, funnelling
/// lifecycle events into an [`EventBus`] and tracking in-flight
/// executions for cooperative cancellation.
pub struct Executor {
    registry: Arc<ProjectRegistry>,
    events: Arc<EventBus>,
    cache_enabled: bool,
    command_timeout: Duration,
    cache: Mutex<HashMap<CacheKey, TaskResult>>,
    cancellations: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl Executor {
    pub fn new(registry: Arc<ProjectRegistry>, events: Arc<EventBus>, cache_enabled: bool, command_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            events,
            cache_enabled,
            command_timeout,
            cache: Mutex::new(HashMap::new()),
            cancellations: Mutex::new(HashMap::new()),
        })
    }

    /// Validates `project_name`/`task_id`, allocates an execution id,
    /// and spawns the background task that actually runs it. Returns as
    /// soon as the execution id is allocated; this call never itself
    /// fails once inputs validate.
    pub async fn execute_task(
        self: &Arc<Self>,
        project_name: &str,
        task_id: &str,
        args: Vec<String>,
    ) -> Result<ExecuteOutcome, ExecutorError> {
        let project = self
            .registry
            .get_project(project_name)
            .await
            .ok_or_else(|| ExecutorError::ProjectUnknown { name: project_name.to_string() })?;

        if !project.tasks.contains(task_id) {
            return Err(ExecutorError::TaskUnknown {
                project_name: project_name.to_string(),
                task_id: task_id.to_string(),
            });
        }
        // Resolving the dependency order here, before spawning, surfaces
        // `DEPENDENCY_CYCLE`/`DEPENDENCY_UNKNOWN` synchronously rather
        // than only as a background failure no caller observes.
        DependencyGraph::new(&project.tasks).resolve(task_id)?;

        let execution_id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancellations.lock().unwrap().insert(execution_id, Arc::clone(&cancel));

        let executor = Arc::clone(self);
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            executor.run_execution(execution_id, project, task_id, args, cancel).await;
        });

        Ok(ExecuteOutcome { execution_id })
    }

    /// Cooperatively cancels an in-flight execution: pending per-task
    /// starts are aborted, but a handler already running is not
    /// interrupted. Returns `false` if no such execution is in flight.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        match self.cancellations.lock().unwrap().get(&execution_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    async fn run_execution(
        self: Arc<Self>,
        execution_id: Uuid,
        project: Arc<Project>,
        task_id: String,
        args: Vec<String>,
        cancel: Arc<AtomicBool>,
    ) {
        let verdict = self.execute_subtree(execution_id, &project, &task_id, &args, None, &cancel).await;

        let (kind, message) = match verdict {
            Ok(()) => (EventKind::Completed, None),
            Err(Halt::TaskFailed) => (EventKind::Failed, Some("one or more tasks failed".to_string())),
            Err(Halt::Cancelled) => (EventKind::Failed, Some("cancelled".to_string())),
        };
        self.events.emit(
            execution_id,
            ExecutionEvent {
                execution_id,
                kind,
                project: project.name.clone(),
                parent_project: None,
                task_id: None,
                success: matches!(kind, EventKind::Completed),
                message,
                error_details: None,
            },
        );
        self.events.close(execution_id);
        self.cancellations.lock().unwrap().remove(&execution_id);
        info!(%execution_id, project = %project.name, task = %task_id, "execution finished");
    }

    /// Depth-first descent: every sub-project that declares `task_id`
    /// runs first (recursively), then `project`'s own resolved sequence
    /// runs. A sub-project lacking `task_id` is skipped — a vacuous
    /// success, not a `TASK_UNKNOWN` failure: a stricter reading would
    /// make most trees unexecutable.
    fn execute_subtree<'a>(
        &'a self,
        execution_id: Uuid,
        project: &'a Project,
        task_id: &'a str,
        args: &'a [String],
        parent_project: Option<String>,
        cancel: &'a Arc<AtomicBool>,
    ) -> Pin<Box<dyn Future<Output = Result<(), Halt>> + Send + 'a>> {
        Box::pin(async move {
            for sub in &project.sub_projects {
                if cancel.load(Ordering::SeqCst) {
                    return Err(Halt::Cancelled);
                }
                if !sub.tasks.contains(task_id) {
                    continue;
                }
                self.execute_subtree(execution_id, sub, task_id, args, Some(project.name.clone()), cancel).await?;
            }

            if cancel.load(Ordering::SeqCst) {
                return Err(Halt::Cancelled);
            }

            let order = DependencyGraph::new(&project.tasks)
                .resolve(task_id)
                .expect("resolved once already in execute_task; the registry does not mutate during an execution");

            for id in order {
                if cancel.load(Ordering::SeqCst) {
                    return Err(Halt::Cancelled);
                }
                let task = project.tasks.get(&id).expect("id came from this registry's own resolver");
                self.run_single_task(execution_id, project, task, args, parent_project.clone(), cancel).await?;
            }

            Ok(())
        })
    }

    async fn run_single_task(
        &self,
        execution_id: Uuid,
        project: &Project,
        task: &Task,
        args: &[String],
        parent_project: Option<String>,
        cancel: &AtomicBool,
    ) -> Result<(), Halt> {
        if cancel.load(Ordering::SeqCst) {
            return Err(Halt::Cancelled);
        }

        self.events.emit(
            execution_id,
            ExecutionEvent {
                execution_id,
                kind: EventKind::Started,
                project: project.name.clone(),
                parent_project: parent_project.clone(),
                task_id: Some(task.id.clone()),
                success: true,
                message: None,
                error_details: None,
            },
        );

        let cache_key: CacheKey = (task.id.clone(), args.to_vec(), project.name.clone());
        if self.cache_enabled {
            if let Some(cached) = self.cache.lock().unwrap().get(&cache_key).cloned() {
                self.events.emit(
                    execution_id,
                    ExecutionEvent {
                        execution_id,
                        kind: EventKind::Skipped,
                        project: project.name.clone(),
                        parent_project,
                        task_id: Some(task.id.clone()),
                        success: true,
                        message: cached.message.clone(),
                        error_details: None,
                    },
                );
                return Ok(());
            }
        }

        let env = TaskEnvironment::new(self.command_timeout, project.directory.clone());
        let ctx = ProjectContext { project_name: &project.name, directory: &project.directory, config: &project.config };
        let handler = Arc::clone(&task.handler);
        let args_owned = args.to_vec();
        let task_id = task.id.clone();

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| (handler)(&env, &ctx, &args_owned))).unwrap_or_else(|panic_obj| {
            let message = panic_message(&panic_obj);
            warn!(task = %task_id, %message, "task handler panicked");
            TaskResult::failure(format!("task '{task_id}' handler panicked: {message}"))
        });

        if result.is_failed() {
            let error_details =
                if result.sub_results.is_empty() { result.message.clone() } else { Some(result.render()) };
            self.events.emit(
                execution_id,
                ExecutionEvent {
                    execution_id,
                    kind: EventKind::Failed,
                    project: project.name.clone(),
                    parent_project,
                    task_id: Some(task.id.clone()),
                    success: false,
                    message: result.message.clone(),
                    error_details,
                },
            );
            return Err(Halt::TaskFailed);
        }

        if self.cache_enabled {
            self.cache.lock().unwrap().insert(cache_key, result.clone());
        }
        self.events.emit(
            execution_id,
            ExecutionEvent {
                execution_id,
                kind: EventKind::TaskCompleted,
                project: project.name.clone(),
                parent_project,
                task_id: Some(task.id.clone()),
                success: true,
                message: result.message.clone(),
                error_details: None,
            },
        );
        Ok(())
    }
}

fn panic_message(panic_obj: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_obj.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic_obj.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
