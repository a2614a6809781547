//! The per-execution event bus: one producer (the
//! executor), many consumers (HTTP streamers), bounded replay for
//! subscribers that arrive late, and a bounded live buffer per
//! subscriber so one slow reader cannot stall the others.
//!
//! Grounded on the same single-producer/many-consumer shape the corpus
//! this engine descends from uses for its own event dispatcher, adapted
//! from a synchronous in-process fan-out to an async, per-execution
//! multicast with replay: a `tokio::sync::mpsc` channel per subscriber,
//! fed from a `std::sync::Mutex`-guarded replay ring plus subscriber
//! list, with `tokio_stream` turning the receiver into the `Stream`
//! callers actually consume.

pub mod error;

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

pub use error::EventBusError;

const DEFAULT_REPLAY_SIZE: usize = 64;
const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// The kind of one entry on an execution's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Started,
    Completed,
    Failed,
    Skipped,
    Output,
    TaskCompleted,
}

/// One entry on an execution's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: Uuid,
    pub kind: EventKind,
    pub project: String,
    /// Set when this event was emitted from inside a sub-project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// A multi-line diagnostic preserved verbatim (exception chains,
    /// rendered `TaskResult` sub-trees).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl ExecutionEvent {
    /// Whether this event is the one terminal event for the *overall*
    /// execution, as opposed to a per-task terminal. The two share a
    /// `kind` vocabulary (`COMPLETED`/`FAILED`/`SKIPPED`); they are told
    /// apart only by the absence of a `task_id` on the overall terminal.
    pub fn is_overall_terminal(&self) -> bool {
        self.task_id.is_none() && matches!(self.kind, EventKind::Completed | EventKind::Failed | EventKind::Skipped)
    }
}

struct Subscriber {
    tx: mpsc::Sender<ExecutionEvent>,
    overrun: Arc<AtomicBool>,
}

#[derive(Default)]
struct ExecutionState {
    replay: VecDeque<ExecutionEvent>,
    subscribers: Vec<Subscriber>,
    terminal: bool,
}

/// Per-execution hot multicast with bounded replay and bounded
/// per-subscriber live buffering.
pub struct EventBus {
    replay_capacity: usize,
    subscriber_buffer: usize,
    executions: Mutex<HashMap<Uuid, ExecutionState>>,
}

impl EventBus {
    pub fn new(replay_capacity: usize, subscriber_buffer: usize) -> Self {
        Self { replay_capacity, subscriber_buffer, executions: Mutex::new(HashMap::new()) }
    }

    /// Queues `event` for every current subscriber of `execution_id` and
    /// appends it to the replay buffer. Never blocks: a subscriber whose
    /// live buffer is full is disconnected, surfacing
    /// [`EventBusError::SubscriberOverrun`] as the last item its stream
    /// yields once its already-queued events have drained.
    pub fn emit(&self, execution_id: Uuid, event: ExecutionEvent) {
        let mut executions = self.executions.lock().unwrap();
        let state = executions.entry(execution_id).or_default();

        state.replay.push_back(event.clone());
        while state.replay.len() > self.replay_capacity {
            state.replay.pop_front();
        }

        state.subscribers.retain(|subscriber| match subscriber.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                subscriber.overrun.store(true, Ordering::SeqCst);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Marks `execution_id` terminal: current subscribers see their
    /// channel close right after whatever is already queued, and every
    /// later subscription receives only the replay buffer before
    /// closing immediately.
    ///
    /// Callers emit the overall terminal [`ExecutionEvent`] through
    /// [`EventBus::emit`] first, then call this to finalize the stream.
    pub fn close(&self, execution_id: Uuid) {
        let mut executions = self.executions.lock().unwrap();
        if let Some(state) = executions.get_mut(&execution_id) {
            state.terminal = true;
            state.subscribers.clear();
        }
    }

    /// Replays buffered events in emission order, then streams live
    /// events until the execution is closed. An execution that has
    /// already closed (or that was never observed) yields only its
    /// buffered replay and closes immediately.
    pub fn subscribe(
        &self,
        execution_id: Uuid,
    ) -> Pin<Box<dyn Stream<Item = Result<ExecutionEvent, EventBusError>> + Send>> {
        let mut executions = self.executions.lock().unwrap();
        let state = executions.entry(execution_id).or_default();
        let replay: Vec<ExecutionEvent> = state.replay.iter().cloned().collect();

        if state.terminal {
            return Box::pin(tokio_stream::iter(replay.into_iter().map(Ok)));
        }

        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        let overrun = Arc::new(AtomicBool::new(false));
        state.subscribers.push(Subscriber { tx, overrun: Arc::clone(&overrun) });

        let live = OverrunTerminated { inner: ReceiverStream::new(rx), overrun, execution_id, signalled: false };
        Box::pin(tokio_stream::iter(replay.into_iter().map(Ok)).chain(live))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_SIZE, DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// Wraps a subscriber's live receiver so that, once it is exhausted, a
/// pending overrun flag is surfaced as one final `Err` item instead of
/// silently ending the stream.
struct OverrunTerminated {
    inner: ReceiverStream<ExecutionEvent>,
    overrun: Arc<AtomicBool>,
    execution_id: Uuid,
    signalled: bool,
}

impl Stream for OverrunTerminated {
    type Item = Result<ExecutionEvent, EventBusError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(None) => {
                if !self.signalled && self.overrun.load(Ordering::SeqCst) {
                    self.signalled = true;
                    Poll::Ready(Some(Err(EventBusError::SubscriberOverrun { execution_id: self.execution_id })))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
