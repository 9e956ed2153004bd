use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The session coordinator is no longer consuming events.
    #[error("session coordinator stopped")]
    CoordinatorStopped,
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The coordinator did not answer in time.
    #[error("operation timed out")]
    Timeout,
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::CoordinatorStopped => {
                AppError::ServiceUnavailable("session coordinator stopped".into())
            }
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let not_found: AppError = ServiceError::NotFound("room `4` not found".into()).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let stopped: AppError = ServiceError::CoordinatorStopped.into();
        assert_eq!(
            stopped.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let timeout: AppError = ServiceError::Timeout.into();
        assert!(timeout.to_string().contains("timed out"));
    }
}
