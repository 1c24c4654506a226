//! HTTP host: wraps application routes in the shared middleware stack and
//! serves them until cancelled.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

mod config;
pub mod middleware;
mod web;

pub use config::ApiIngressConfig;
pub use middleware::request_id::{XRequestId, REQUEST_ID_HEADER};

pub struct ApiIngress {
    config: ApiIngressConfig,
}

impl ApiIngress {
    pub fn new(config: ApiIngressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ApiIngressConfig {
        &self.config
    }

    /// Adds `GET /health` to `app` and applies the middleware stack.
    pub fn build_router(&self, app: Router) -> Router {
        let router = Router::new()
            .route("/health", get(web::health_check))
            .merge(app);
        self.apply_middleware_stack(router)
    }

    /// Outermost first: request id (set, propagate) -> trace span ->
    /// request id into extensions -> JSON error bodies -> body limit ->
    /// timeout -> routes.
    /// CORS, when enabled, wraps everything so preflights return early.
    fn apply_middleware_stack(&self, router: Router) -> Router {
        let x_request_id = middleware::request_id::header();

        let stack = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(
                x_request_id.clone(),
                middleware::request_id::MakeReqId,
            ))
            .layer(PropagateRequestIdLayer::new(x_request_id))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(middleware::trace::HttpSpan)
                    .on_response(middleware::trace::RecordResponse),
            )
            .layer(from_fn(middleware::request_id::push_req_id_to_extensions))
            .layer(from_fn(middleware::error_body::render_bare_errors))
            .layer(RequestBodyLimitLayer::new(self.config.body_limit_bytes))
            .layer(TimeoutLayer::new(self.config.request_timeout));

        let router = router.layer(stack);
        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self
            .config
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.config.bind_addr))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
        tracing::info!("HTTP server bound on {}", addr);
        Ok(listener)
    }

    /// Binds the configured address and serves until `cancel` fires.
    pub async fn serve(&self, router: Router, cancel: CancellationToken) -> Result<()> {
        let listener = self.bind().await?;
        serve_on(listener, router, cancel).await
    }
}

/// Serves `router` on an already bound listener with graceful shutdown.
pub async fn serve_on(listener: TcpListener, router: Router, cancel: CancellationToken) -> Result<()> {
    let shutdown = async move {
        cancel.cancelled().await;
        tracing::info!("HTTP server shutting down gracefully (cancellation)");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}
