//! Mapping of core errors onto HTTP responses.

use crate::dto::ErrorRes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use cohort_core::CoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    ServiceUnavailable(String),
    BadGateway(String),
    Internal,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(_)
            | CoreError::MalformedReference { .. }
            | CoreError::Urn(_)
            | CoreError::Translation(_)
            | CoreError::Hub(_) => ApiError::BadRequest(err.to_string()),
            CoreError::FederationDisabled | CoreError::Cancelled(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            CoreError::BrokerSend { .. } => {
                tracing::error!("Hub delivery error: {err}");
                ApiError::BadGateway(err.to_string())
            }
            other => {
                tracing::error!("Core error: {other:?}");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::ServiceUnavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into()),
        };
        (status, Json(ErrorRes { error: message })).into_response()
    }
}
