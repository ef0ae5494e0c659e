use std::any::Any;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

use super::{correlation::CorrelationId, dto::ErrorBody};
use crate::readings::ReadingError;

/// Every failure a handler can return. Rendered as the `ErrorBody` envelope;
/// 5xx bodies never carry internal detail, which only goes to the log.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Reading(#[from] ReadingError),

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Reading(ReadingError::Validation(_))
            | ApiError::Json(_)
            | ApiError::Query(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Reading(ReadingError::DuplicateKey) => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Reading(ReadingError::StorageUnavailable(_)) | ApiError::Unhandled(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn description(&self) -> (String, &'static str) {
        match self {
            ApiError::Reading(ReadingError::Validation(msg)) => {
                (msg.clone(), "validation.error")
            }
            ApiError::Json(rejection) => (rejection.body_text(), "validation.error"),
            ApiError::Query(rejection) => (rejection.body_text(), "validation.error"),
            ApiError::Reading(ReadingError::DuplicateKey) => {
                ("Possible duplicate".to_owned(), "possible.duplicate")
            }
            ApiError::NotFound => ("Not Found".to_owned(), "not.found"),
            ApiError::Reading(ReadingError::StorageUnavailable(_)) | ApiError::Unhandled(_) => {
                internal_description()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "Request failed");
        } else {
            info!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let (description, description_key) = self.description();
        envelope(status, description, description_key)
    }
}

/// Response for a handler that panicked. Used with `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("<non-string panic payload>");
    error!(panic = %detail, "Handler panicked");

    let (description, description_key) = internal_description();
    envelope(StatusCode::INTERNAL_SERVER_ERROR, description, description_key)
}

fn internal_description() -> (String, &'static str) {
    ("Internal Server Error".to_owned(), "internal.server.error")
}

fn envelope(status: StatusCode, description: String, description_key: &str) -> Response {
    let id = CorrelationId::current().unwrap_or_default();
    let body = ErrorBody {
        id: id.to_string(),
        description,
        description_key: description_key.to_owned(),
    };
    (status, Json(body)).into_response()
}
