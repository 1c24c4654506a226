use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use utoipa::OpenApi;

use crate::api::rest::{dto, handlers, ApiState};

#[derive(OpenApi)]
#[openapi(
    info(title = "PVZ service", description = "Pickup point receptions"),
    paths(
        handlers::dummy_login,
        handlers::register,
        handlers::login,
        handlers::create_pvz,
        handlers::search_pvz,
        handlers::open_reception,
        handlers::add_product,
        handlers::close_last_reception,
        handlers::delete_last_product,
    ),
    components(schemas(dto::ErrorBody)),
    tags(
        (name = "auth", description = "Tokens and accounts"),
        (name = "pvz", description = "Pickup points"),
        (name = "receptions", description = "Reception lifecycle")
    )
)]
pub struct ApiDoc;

/// Mounts the pvz REST surface onto `router`.
pub fn register_routes(router: Router, state: Arc<ApiState>) -> Router {
    let routes = Router::new()
        .route("/dummyLogin", post(handlers::dummy_login))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/pvz", post(handlers::create_pvz).get(handlers::search_pvz))
        .route("/receptions", post(handlers::open_reception))
        .route("/products", post(handlers::add_product))
        .route(
            "/pvz/{pvzId}/close_last_reception",
            post(handlers::close_last_reception),
        )
        .route(
            "/pvz/{pvzId}/delete_last_product",
            post(handlers::delete_last_product),
        )
        .route("/openapi.json", get(handlers::openapi_spec))
        .layer(Extension(state));

    router.merge(routes)
}
