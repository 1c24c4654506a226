use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::rest::dto::{
    AddProductRequest, CreatePvzRequest, CreateReceptionRequest, DummyLoginRequest, ErrorBody,
    LoginRequest, ProductDto, PvzDto, PvzWithReceptionsDto, ReceptionDto, RegisterRequest,
    SearchQuery, TokenResponse, UserDto,
};
use crate::api::rest::error::ApiError;
use crate::api::rest::extract::{Authenticated, RequestId};
use crate::api::rest::routes::ApiDoc;
use crate::api::rest::ApiState;
use crate::config::PvzServiceConfig;
use crate::domain::model::{DateWindow, NewPvz, Page, PvzSearch, Role};

type ApiResult<T> = Result<T, ApiError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>, request_id: &RequestId) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text(), request_id))
}

fn path_id(path: Result<Path<Uuid>, PathRejection>, request_id: &RequestId) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::bad_request("invalid pvz id", request_id))
}

/// Issue a token for a role without an account
#[utoipa::path(
    post,
    path = "/dummyLogin",
    tag = "auth",
    request_body = DummyLoginRequest,
    responses(
        (status = 200, body = TokenResponse),
        (status = 400, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.dummy_login", skip_all, fields(request_id = %request_id))]
pub async fn dummy_login(
    request_id: RequestId,
    Extension(state): Extension<Arc<ApiState>>,
    payload: Result<Json<DummyLoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let req = body(payload, &request_id)?;
    let token = state
        .users
        .dummy_login(&state.op_context(&request_id), req.role)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok(Json(TokenResponse { token }))
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, body = UserDto),
        (status = 400, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.register", skip_all, fields(request_id = %request_id))]
pub async fn register(
    request_id: RequestId,
    Extension(state): Extension<Arc<ApiState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    let req = body(payload, &request_id)?;
    let user = state
        .users
        .register(
            &state.op_context(&request_id),
            &req.email,
            &req.password,
            req.role,
        )
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, body = TokenResponse),
        (status = 401, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.login", skip_all, fields(request_id = %request_id))]
pub async fn login(
    request_id: RequestId,
    Extension(state): Extension<Arc<ApiState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let req = body(payload, &request_id)?;
    let token = state
        .users
        .login(&state.op_context(&request_id), &req.email, &req.password)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok(Json(TokenResponse { token }))
}

/// Register a pickup point
#[utoipa::path(
    post,
    path = "/pvz",
    tag = "pvz",
    request_body = CreatePvzRequest,
    responses(
        (status = 201, body = PvzDto),
        (status = 400, body = ErrorBody),
        (status = 401, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.create_pvz", skip_all, fields(request_id = %request_id))]
pub async fn create_pvz(
    request_id: RequestId,
    auth: Authenticated,
    Extension(state): Extension<Arc<ApiState>>,
    payload: Result<Json<CreatePvzRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PvzDto>)> {
    auth.require(&[Role::Moderator])?;
    let req = body(payload, &request_id)?;
    let new = NewPvz {
        id: req.id.unwrap_or_else(Uuid::new_v4),
        registration_date: req.registration_date.unwrap_or_else(Utc::now),
        city: req.city,
    };
    let pvz = state
        .pvz
        .create_pvz(&state.op_context(&request_id), new)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok((StatusCode::CREATED, Json(pvz.into())))
}

/// Pickup points with their receptions and products
#[utoipa::path(
    get,
    path = "/pvz",
    tag = "pvz",
    params(
        ("startDate" = Option<String>, Query, description = "RFC 3339 lower bound, inclusive"),
        ("endDate" = Option<String>, Query, description = "RFC 3339 upper bound, inclusive"),
        ("page" = Option<u32>, Query, description = "1-based page number"),
        ("limit" = Option<u32>, Query, description = "Page size")
    ),
    responses(
        (status = 200, body = Vec<PvzWithReceptionsDto>),
        (status = 400, body = ErrorBody),
        (status = 401, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.search", skip_all, fields(request_id = %request_id))]
pub async fn search_pvz(
    request_id: RequestId,
    auth: Authenticated,
    Extension(state): Extension<Arc<ApiState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<PvzWithReceptionsDto>>> {
    auth.require(&[Role::Employee, Role::Moderator])?;
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text(), &request_id))?;
    let search = parse_search(&query, &state.config)
        .map_err(|msg| ApiError::bad_request(msg, &request_id))?;

    let found = state
        .receptions
        .search_receptions(&state.op_context(&request_id), &search)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok(Json(found.into_iter().map(Into::into).collect()))
}

/// Open a reception at a pickup point
#[utoipa::path(
    post,
    path = "/receptions",
    tag = "receptions",
    request_body = CreateReceptionRequest,
    responses(
        (status = 201, body = ReceptionDto),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.open_reception", skip_all, fields(request_id = %request_id))]
pub async fn open_reception(
    request_id: RequestId,
    auth: Authenticated,
    Extension(state): Extension<Arc<ApiState>>,
    payload: Result<Json<CreateReceptionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReceptionDto>)> {
    auth.require(&[Role::Employee])?;
    let req = body(payload, &request_id)?;
    let reception = state
        .receptions
        .open_reception(&state.op_context(&request_id), req.pvz_id)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok((StatusCode::CREATED, Json(reception.into())))
}

/// Add a product to the open reception
#[utoipa::path(
    post,
    path = "/products",
    tag = "receptions",
    request_body = AddProductRequest,
    responses(
        (status = 201, body = ProductDto),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.add_product", skip_all, fields(request_id = %request_id))]
pub async fn add_product(
    request_id: RequestId,
    auth: Authenticated,
    Extension(state): Extension<Arc<ApiState>>,
    payload: Result<Json<AddProductRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProductDto>)> {
    auth.require(&[Role::Employee])?;
    let req = body(payload, &request_id)?;
    let product = state
        .receptions
        .add_product_raw(&state.op_context(&request_id), req.pvz_id, &req.product_type)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// Close the open reception of a pickup point
#[utoipa::path(
    post,
    path = "/pvz/{pvzId}/close_last_reception",
    tag = "receptions",
    params(("pvzId" = Uuid, Path, description = "Pickup point id")),
    responses(
        (status = 200, body = ReceptionDto),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.close_last_reception", skip_all, fields(request_id = %request_id))]
pub async fn close_last_reception(
    request_id: RequestId,
    auth: Authenticated,
    Extension(state): Extension<Arc<ApiState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ReceptionDto>> {
    auth.require(&[Role::Employee])?;
    let pvz_id = path_id(path, &request_id)?;
    let reception = state
        .receptions
        .close_reception(&state.op_context(&request_id), pvz_id)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok(Json(reception.into()))
}

/// Remove the most recently added product of the open reception
#[utoipa::path(
    post,
    path = "/pvz/{pvzId}/delete_last_product",
    tag = "receptions",
    params(("pvzId" = Uuid, Path, description = "Pickup point id")),
    responses(
        (status = 200, description = "Product removed"),
        (status = 400, body = ErrorBody),
        (status = 403, body = ErrorBody)
    )
)]
#[tracing::instrument(name = "pvz.api.delete_last_product", skip_all, fields(request_id = %request_id))]
pub async fn delete_last_product(
    request_id: RequestId,
    auth: Authenticated,
    Extension(state): Extension<Arc<ApiState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    auth.require(&[Role::Employee])?;
    let pvz_id = path_id(path, &request_id)?;
    state
        .receptions
        .delete_last_product(&state.op_context(&request_id), pvz_id)
        .await
        .map_err(|e| ApiError::from_domain(e, &request_id))?;
    Ok(StatusCode::OK)
}

/// OpenAPI document of the routes above.
pub async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi as _;
    Json(ApiDoc::openapi())
}

/// Validates the raw search query against the configured paging bounds.
pub(crate) fn parse_search(q: &SearchQuery, cfg: &PvzServiceConfig) -> Result<PvzSearch, String> {
    let start = q
        .start_date
        .as_deref()
        .map(|raw| parse_date("start date", raw))
        .transpose()?;
    let end = q
        .end_date
        .as_deref()
        .map(|raw| parse_date("end date", raw))
        .transpose()?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err("start date is after end date".to_string());
        }
    }

    let number = parse_positive("page", q.page.as_deref(), 1)?;
    let limit = parse_positive("limit", q.limit.as_deref(), cfg.default_page_limit)?;
    if limit > cfg.max_page_limit {
        return Err(format!("limit must not exceed {}", cfg.max_page_limit));
    }
    let page = Page::new(number, limit).ok_or_else(|| "invalid page".to_string())?;

    Ok(PvzSearch {
        window: DateWindow::new(start, end),
        page,
    })
}

fn parse_date(what: &str, raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| format!("invalid {what}: {raw}"))
}

fn parse_positive(what: &str, raw: Option<&str>, default: u32) -> Result<u32, String> {
    match raw {
        None => Ok(default),
        Some(r) => r
            .parse::<u32>()
            .ok()
            .filter(|v| *v >= 1)
            .ok_or_else(|| format!("invalid {what}: {r}")),
    }
}
