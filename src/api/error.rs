//! JSON error responses.
//!
//! Every failure is returned as `{"error": {"code", "message"}}`. Internal
//! and upstream details are logged, never sent to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;
use crate::validation::RegistryError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Gone(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Gone(_) => (StatusCode::GONE, "EXPIRED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::Unauthorized(msg.to_string())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Upstream(_) => "An upstream service error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::Upstream(_) => tracing::error!(error = %self, "upstream error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => Self::NotFound(err.to_string()),
            Error::Validation(msg) => Self::Validation(msg),
            Error::Conflict(msg) => Self::Conflict(msg),
            Error::InvalidTransition { .. } => Self::Conflict(err.to_string()),
            Error::Expired(_) => Self::Gone(err.to_string()),
            Error::Forbidden(_) => Self::Forbidden(err.to_string()),
            Error::Unauthorized(msg) => Self::Unauthorized(msg),
            Error::Registry(msg) | Error::Mail(msg) => Self::Upstream(msg),
            Error::Io(_) | Error::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotConfigured(_) | RegistryError::Unavailable(_) => Self::ServiceUnavailable(err.to_string()),
            RegistryError::InvalidInput(msg) => Self::Validation(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    use crate::models::{ApprovalStatus, OnboardingStatus};

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (Error::not_found("client 3"), StatusCode::NOT_FOUND),
            (Error::validation("bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::conflict("stale"), StatusCode::CONFLICT),
            (
                Error::InvalidTransition {
                    event: "APPROVE",
                    onboarding: OnboardingStatus::EmailSent,
                    approval: ApprovalStatus::NotRequested,
                },
                StatusCode::CONFLICT,
            ),
            (Error::Expired("signing link".into()), StatusCode::GONE),
            (Error::Forbidden("clients:approve".into()), StatusCode::FORBIDDEN),
            (Error::Mail("smtp down".into()), StatusCode::BAD_GATEWAY),
            (Error::Database(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, _) = ApiError::from(err).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn unconfigured_registry_is_unavailable() {
        let err = ApiError::from(RegistryError::NotConfigured("KVK_API_KEY is not set".into()));
        assert_eq!(err.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);

        let err = ApiError::from(RegistryError::InvalidInput("'N' has no country prefix".into()));
        assert_eq!(err.status_and_code().0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn internal_details_are_not_exposed() {
        let response = ApiError::Internal("password=hunter2 in connection string".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "INTERNAL_ERROR");
        assert!(!body.error.message.contains("hunter2"));
    }

    #[tokio::test]
    async fn invalid_transition_message_names_the_states() {
        let err = Error::InvalidTransition {
            event: "APPROVE",
            onboarding: OnboardingStatus::EmailSent,
            approval: ApprovalStatus::NotRequested,
        };
        let response = ApiError::from(err).into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.message, "cannot apply APPROVE while client is EMAIL_SENT/NOT_REQUESTED");
    }
}
