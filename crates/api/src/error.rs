use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::export_orchestrator::OrchestrationError;
use crate::services::worker_client::WorkerClientError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Worker rejected request: {0}")]
    WorkerRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    msg.clone(),
                )
            }
            ApiError::WorkerUnavailable(msg) => (
                StatusCode::BAD_GATEWAY,
                "worker_unavailable",
                msg.clone(),
            ),
            ApiError::WorkerRejected(msg) => {
                (StatusCode::BAD_GATEWAY, "worker_rejected", msg.clone())
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => {
                ApiError::Internal(format!("Database error: {}", db_err))
            }
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<WorkerClientError> for ApiError {
    fn from(err: WorkerClientError) -> Self {
        match err {
            WorkerClientError::Unavailable(msg) => ApiError::WorkerUnavailable(msg),
            WorkerClientError::Rejected { status, body } => {
                ApiError::WorkerRejected(format!("status {}: {}", status, body))
            }
            WorkerClientError::InvalidResponse(msg) => {
                ApiError::WorkerRejected(format!("invalid response: {}", msg))
            }
        }
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(err: OrchestrationError) -> Self {
        match err {
            OrchestrationError::UnknownUser(user_id) => {
                ApiError::NotFound(format!("User {} not found", user_id))
            }
            OrchestrationError::Configuration(msg) => ApiError::Configuration(msg),
            OrchestrationError::Persistence(e) => e.into(),
            OrchestrationError::AllBatchesFailed { failed, detail } => {
                ApiError::WorkerUnavailable(format!(
                    "All {} batches failed to enqueue: {}",
                    failed, detail
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_unauthorized() {
        let error = ApiError::Unauthorized("missing token".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_api_error_forbidden() {
        let error = ApiError::Forbidden("admin only".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_api_error_worker_variants_map_to_bad_gateway() {
        let error = ApiError::WorkerUnavailable("connection refused".to_string());
        assert_eq!(error.into_response().status(), StatusCode::BAD_GATEWAY);

        let error = ApiError::WorkerRejected("status 422".to_string());
        assert_eq!(error.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_api_error_configuration_is_internal() {
        let error = ApiError::Configuration("destination email not set".to_string());
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let error: ApiError = sqlx::Error::RowNotFound.into();
        match error {
            ApiError::NotFound(msg) => assert_eq!(msg, "Resource not found"),
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_from_worker_client_error() {
        let error: ApiError = WorkerClientError::Rejected {
            status: 422,
            body: "bad payload".to_string(),
        }
        .into();
        match error {
            ApiError::WorkerRejected(msg) => assert!(msg.contains("422")),
            _ => panic!("Expected WorkerRejected error"),
        }
    }
}
