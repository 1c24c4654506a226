use std::time::Duration;

use http::{Request, Response};
use tower_http::trace::{MakeSpan, OnResponse};
use tracing::field::Empty;
use tracing::Span;

use crate::middleware::request_id::REQUEST_ID_HEADER;

/// Opens the `http_request` span; `status` and `latency_ms` are filled in
/// by [`RecordResponse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSpan;

impl<B> MakeSpan<B> for HttpSpan {
    fn make_span(&mut self, req: &Request<B>) -> Span {
        let rid = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("n/a");

        tracing::info_span!(
            "http_request",
            method = %req.method(),
            uri = %req.uri().path(),
            version = ?req.version(),
            module = "api_ingress",
            request_id = %rid,
            status = Empty,
            latency_ms = Empty,
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordResponse;

impl<B> OnResponse<B> for RecordResponse {
    fn on_response(self, res: &Response<B>, latency: Duration, span: &Span) {
        let ms = (latency.as_secs_f64() * 1000.0) as u64;
        span.record("status", res.status().as_u16());
        span.record("latency_ms", ms);
        tracing::debug!(parent: span, status = res.status().as_u16(), latency_ms = ms, "request finished");
    }
}
