use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use backend_application::{AppError, RunError};

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl From<AppError> for HttpError {
    fn from(value: AppError) -> Self {
        match value {
            AppError::BadRequest(msg) => HttpError::BadRequest(msg),
            AppError::NotFound(msg) => HttpError::NotFound(msg),
            AppError::Conflict(msg) => HttpError::Conflict(msg),
            AppError::Internal(err) => HttpError::Internal(format!("{:#}", err)),
        }
    }
}

impl From<RunError> for HttpError {
    fn from(value: RunError) -> Self {
        match value {
            RunError::StoreUnavailable(_) => HttpError::ServiceUnavailable(value.to_string()),
            RunError::AlreadyRunning => HttpError::Conflict(value.to_string()),
            RunError::Lease(_) => HttpError::Internal(value.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Conflict(_) => StatusCode::CONFLICT,
            HttpError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            HttpError::BadRequest(msg) => format!("bad request: {}", msg),
            HttpError::NotFound(msg) | HttpError::Conflict(msg) => msg,
            HttpError::ServiceUnavailable(msg) => msg,
            HttpError::Internal(msg) => {
                error!("internal error: {}", msg);
                "internal error".to_string()
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
