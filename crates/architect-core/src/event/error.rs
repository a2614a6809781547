use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorKind;

/// Errors the event bus itself raises (as opposed to errors it merely
/// carries on behalf of a task handler).
#[derive(Debug, Error)]
pub enum EventBusError {
    /// A subscriber's live buffer filled before it could keep up; it is
    /// disconnected immediately and not retried. Other subscribers of
    /// the same execution are unaffected.
    #[error("subscriber to execution {execution_id} overran its live buffer and was disconnected")]
    SubscriberOverrun { execution_id: Uuid },
}

impl EventBusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventBusError::SubscriberOverrun { .. } => ErrorKind::SubscriberOverrun,
        }
    }
}
