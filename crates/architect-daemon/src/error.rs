//! Maps the core library's typed errors onto HTTP status codes.
//!
//! Registration-time errors are returned synchronously here, per
//! the engine's error-propagation policy; execution-time errors never reach
//! this module — they surface only as `FAILED` events on the execution's
//! own stream.

use architect_core::{Error, ErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Wraps any error convertible into [`architect_core::Error`] so handlers
/// can use `?` and get a well-formed JSON error response.
pub struct ApiError(pub Error);

impl<E> From<E> for ApiError
where
    Error: From<E>,
{
    fn from(source: E) -> Self {
        ApiError(Error::from(source))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        let body = ErrorBody { error: self.0.kind().as_str(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ProjectUnknown | ErrorKind::TaskUnknown => StatusCode::NOT_FOUND,
        ErrorKind::TaskIdCollision => StatusCode::CONFLICT,
        ErrorKind::ConfigInvalid | ErrorKind::DependencyCycle | ErrorKind::DependencyUnknown => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::PluginLoad
        | ErrorKind::CommandTimeout
        | ErrorKind::CommandSpawn
        | ErrorKind::SubscriberOverrun
        | ErrorKind::HandlerFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
