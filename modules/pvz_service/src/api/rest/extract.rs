//! Request extractors shared by the handlers.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use crate::api::rest::error::ApiError;
use crate::api::rest::ApiState;
use crate::domain::model::Role;
use crate::domain::ports::Claims;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request. Taken from `x-request-id`, or
/// generated once per request when the header is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_parts(parts: &mut Parts) -> Self {
        if let Some(id) = parts.extensions.get::<RequestId>() {
            return id.clone();
        }
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| RequestId(v.to_owned()))
            .unwrap_or_else(|| RequestId(uuid::Uuid::new_v4().to_string()));
        parts.extensions.insert(id.clone());
        id
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Verified bearer token claims.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub claims: Claims,
    request_id: RequestId,
}

impl Authenticated {
    /// Rejects with 403 unless the caller holds one of `allowed`.
    pub fn require(&self, allowed: &[Role]) -> Result<&Claims, ApiError> {
        if self.claims.is_any_of(allowed) {
            Ok(&self.claims)
        } else {
            debug!(role = %self.claims.role, ?allowed, "role not allowed");
            Err(ApiError::forbidden(&self.request_id))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = RequestId::from_parts(parts);
        let Some(state) = parts.extensions.get::<Arc<ApiState>>().cloned() else {
            tracing::error!("pvz REST state is not installed on the router");
            return Err(ApiError::internal(&request_id));
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing bearer token", &request_id))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            debug!(error = %e, "token rejected");
            ApiError::unauthorized("invalid token", &request_id)
        })?;

        Ok(Self { claims, request_id })
    }
}
