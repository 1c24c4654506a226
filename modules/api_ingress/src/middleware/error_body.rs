use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;

use super::request_id::XRequestId;

/// Error body shared by every failing response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: u16,
    message: String,
    request_id: String,
}

fn is_json(res: &Response) -> bool {
    res.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Renders error responses produced below the routes (timeout, body limit,
/// unmatched routes) as `{code, message, requestId}`. JSON bodies pass through.
pub async fn render_bare_errors(req: Request, next: Next) -> Response {
    let request_id = req
        .extensions()
        .get::<XRequestId>()
        .map(|rid| rid.0.clone())
        .unwrap_or_default();

    let res = next.run(req).await;
    let status = res.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&res) {
        return res;
    }

    let body = ErrorBody {
        code: status.as_u16(),
        message: status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_ascii_lowercase(),
        request_id,
    };
    let (mut parts, _) = res.into_parts();
    let (json_parts, json_body) = Json(body).into_response().into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    parts.headers.extend(json_parts.headers);
    Response::from_parts(parts, json_body)
}
