//! API error handling
//!
//! Every failure is rendered as an `ErrorBody` (`{code, message, status}`),
//! the contract the client relies on.
//!
//! Author: hephaex@gmail.com

use crate::auth::AuthError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use muse_core::{ErrorBody, ErrorCode, MuseError};

fn error_body(code: ErrorCode, status: StatusCode, message: impl Into<String>) -> ErrorBody {
    ErrorBody {
        code,
        message: message.into(),
        status: status.as_u16(),
        details: None,
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Auth(AuthError),
    Timeout(String),
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Auth(err) => return err.into_response(),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                error_body(ErrorCode::BadRequest, StatusCode::BAD_REQUEST, msg),
            ),
            AppError::Timeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                error_body(ErrorCode::Timeout, StatusCode::GATEWAY_TIMEOUT, msg),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body(
                        ErrorCode::InternalError,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error",
                    ),
                )
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body(
                        ErrorCode::DatabaseError,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Database operation failed",
                    ),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<MuseError> for AppError {
    fn from(err: MuseError) -> Self {
        match err {
            MuseError::ValidationError(msg) => AppError::BadRequest(msg),
            MuseError::InferenceError(msg) => AppError::Internal(format!("Inference error: {msg}")),
            MuseError::ConfigError(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            MuseError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> ErrorBody {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_body() {
        let response = AppError::BadRequest("missing sentence".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_of(response).await;
        assert_eq!(body.code, ErrorCode::BadRequest);
        assert_eq!(body.status, 400);
        assert_eq!(body.message, "missing sentence");
    }

    #[tokio::test]
    async fn test_auth_error_passthrough() {
        let response = AppError::from(AuthError::TokenExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_of(response).await;
        assert_eq!(body.code, ErrorCode::TokenExpired);
        assert!(body.code.is_expired());
    }

    #[tokio::test]
    async fn test_timeout_is_gateway_timeout() {
        let response = AppError::Timeout("inference timed out".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_of(response).await.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let response = AppError::Database("no such table: users".to_string()).into_response();
        let body = body_of(response).await;
        assert_eq!(body.code, ErrorCode::DatabaseError);
        assert!(body.details.is_none());
        assert!(!body.message.contains("users"));
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let err = AppError::from(MuseError::InferenceError(
            "model server at http://10.0.0.7:8501 returned 500".to_string(),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(response).await;
        assert_eq!(body.code, ErrorCode::InternalError);
        assert_eq!(body.message, "Internal server error");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_validation_error_maps_to_bad_request() {
        let err = AppError::from(MuseError::ValidationError("empty".to_string()));
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
