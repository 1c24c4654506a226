use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::rest::dto::ErrorBody;
use crate::api::rest::extract::RequestId;
use crate::domain::error::DomainError;

/// HTTP error rendered as `{code, message, requestId}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    request_id: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: request_id.as_str().to_owned(),
        }
    }

    pub fn bad_request(message: impl Into<String>, request_id: &RequestId) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, request_id)
    }

    pub fn unauthorized(message: impl Into<String>, request_id: &RequestId) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, request_id)
    }

    pub fn forbidden(request_id: &RequestId) -> Self {
        Self::new(StatusCode::FORBIDDEN, "access denied", request_id)
    }

    pub fn internal(request_id: &RequestId) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error",
            request_id,
        )
    }

    /// Final mapping of engine errors to wire statuses. Internal details
    /// were logged by the engine and are not echoed back.
    pub fn from_domain(e: DomainError, request_id: &RequestId) -> Self {
        match e {
            DomainError::InvalidCredentials => Self::unauthorized(e.to_string(), request_id),
            DomainError::Cancelled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string(), request_id)
            }
            DomainError::DeadlineExceeded => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, e.to_string(), request_id)
            }
            DomainError::Internal { .. } => Self::internal(request_id),
            client => Self::bad_request(client.to_string(), request_id),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.status.as_u16(),
            message: self.message,
            request_id: self.request_id,
        };
        (self.status, Json(body)).into_response()
    }
}
