use std::time::Duration;

use api_ingress::{ApiIngress, ApiIngressConfig};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use pvz_service::{AuthSettings, PvzModule, PvzServiceConfig, Storage};

fn app() -> Router {
    let module = PvzModule::new(
        Storage::in_memory(),
        &AuthSettings {
            jwt_secret: "integration-secret".into(),
            token_ttl: Duration::from_secs(3600),
        },
        PvzServiceConfig {
            max_page_limit: 30,
            ..Default::default()
        },
    )
    .unwrap();
    ApiIngress::new(ApiIngressConfig::default()).build_router(module.register_rest(Router::new()))
}

struct Call<'a> {
    method: Method,
    uri: &'a str,
    token: Option<&'a str>,
    request_id: Option<&'a str>,
    body: Option<Value>,
}

impl<'a> Call<'a> {
    fn new(method: Method, uri: &'a str) -> Self {
        Self {
            method,
            uri,
            token: None,
            request_id: None,
            body: None,
        }
    }

    fn token(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }

    fn request_id(mut self, id: &'a str) -> Self {
        self.request_id = Some(id);
        self
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    async fn send(self, app: &Router) -> (StatusCode, Value) {
        let mut req = Request::builder().method(self.method).uri(self.uri);
        if let Some(token) = self.token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        if let Some(id) = self.request_id {
            req = req.header("x-request-id", id);
        }
        let req = match self.body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, value)
    }
}

async fn token_for(app: &Router, role: &str) -> String {
    let (status, body) = Call::new(Method::POST, "/dummyLogin")
        .json(json!({ "role": role }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn create_pvz(app: &Router, moderator: &str, city: &str, date: &str) -> String {
    let (status, body) = Call::new(Method::POST, "/pvz")
        .token(moderator)
        .json(json!({ "city": city, "registrationDate": date }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn reception_lifecycle_over_http() {
    let app = app();
    let moderator = token_for(&app, "moderator").await;
    let employee = token_for(&app, "employee").await;

    let pvz_id = create_pvz(&app, &moderator, "Казань", "2025-03-01T10:00:00Z").await;

    let (status, reception) = Call::new(Method::POST, "/receptions")
        .token(&employee)
        .json(json!({ "pvzId": pvz_id }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reception["status"], "in_progress");
    assert_eq!(reception["pvzId"], pvz_id.as_str());

    let (status, err) = Call::new(Method::POST, "/receptions")
        .token(&employee)
        .request_id("dup-open")
        .json(json!({ "pvzId": pvz_id }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], 400);
    assert_eq!(err["requestId"], "dup-open");
    let message = err["message"].as_str().unwrap();
    assert!(message.contains("already in-progress"), "{message}");
    assert!(message.contains(reception["id"].as_str().unwrap()));

    for kind in ["электроника", "одежда", "обувь"] {
        let (status, product) = Call::new(Method::POST, "/products")
            .token(&employee)
            .json(json!({ "type": kind, "pvzId": pvz_id }))
            .send(&app)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(product["type"], kind);
        assert_eq!(product["receptionId"], reception["id"]);
    }

    let uri = format!("/pvz/{pvz_id}/delete_last_product");
    let (status, body) = Call::new(Method::POST, &uri).token(&employee).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let uri = format!("/pvz/{pvz_id}/close_last_reception");
    let (status, closed) = Call::new(Method::POST, &uri).token(&employee).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "finished");
    assert_eq!(closed["id"], reception["id"]);

    let (status, err) = Call::new(Method::POST, &uri).token(&employee).send(&app).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["message"], "no in-progress reception found");

    let (status, found) = Call::new(Method::GET, "/pvz").token(&employee).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["pvz"]["city"], "Казань");
    let receptions = found[0]["receptions"].as_array().unwrap();
    assert_eq!(receptions.len(), 1);
    let products = receptions[0]["products"].as_array().unwrap();
    let kinds: Vec<&str> = products.iter().map(|p| p["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, ["электроника", "одежда"]);
}

#[tokio::test]
async fn authentication_and_roles() {
    let app = app();
    let employee = token_for(&app, "employee").await;

    let (status, err) = Call::new(Method::GET, "/pvz").send(&app).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["code"], 401);

    let (status, _) = Call::new(Method::GET, "/pvz").token("not-a-jwt").send(&app).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, err) = Call::new(Method::POST, "/pvz")
        .token(&employee)
        .json(json!({ "city": "Москва" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["code"], 403);

    let moderator = token_for(&app, "moderator").await;
    let (status, _) = Call::new(Method::POST, "/receptions")
        .token(&moderator)
        .json(json!({ "pvzId": uuid::Uuid::new_v4() }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = Call::new(Method::POST, "/dummyLogin")
        .json(json!({ "role": "admin" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn client_input_errors_are_bad_requests() {
    let app = app();
    let moderator = token_for(&app, "moderator").await;
    let employee = token_for(&app, "employee").await;
    let pvz_id = create_pvz(&app, &moderator, "Москва", "2025-03-01T10:00:00Z").await;

    let (status, err) = Call::new(Method::POST, "/products")
        .token(&employee)
        .json(json!({ "type": "мебель", "pvzId": pvz_id }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["message"], "invalid product type: мебель");

    let (status, err) = Call::new(Method::POST, "/products")
        .token(&employee)
        .json(json!({ "type": "обувь", "pvzId": pvz_id }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["message"], "no in-progress reception found");

    let (status, err) = Call::new(Method::POST, "/pvz/not-a-uuid/close_last_reception")
        .token(&employee)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["message"], "invalid pvz id");

    let (status, _) = Call::new(Method::POST, "/pvz")
        .token(&moderator)
        .json(json!({ "city": "Тула" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, err) = Call::new(Method::POST, "/pvz")
        .token(&moderator)
        .json(json!({ "id": pvz_id, "city": "Москва" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].as_str().unwrap().contains("already exists"));

    let (status, err) = Call::new(Method::GET, "/pvz?limit=31")
        .token(&employee)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["message"], "limit must not exceed 30");
}

#[tokio::test]
async fn search_window_and_paging() {
    let app = app();
    let moderator = token_for(&app, "moderator").await;

    for day in 1..=5 {
        create_pvz(
            &app,
            &moderator,
            "Санкт-Петербург",
            &format!("2025-01-0{day}T12:00:00Z"),
        )
        .await;
    }

    let (status, page) = Call::new(
        Method::GET,
        "/pvz?startDate=2025-01-02T00:00:00Z&endDate=2025-01-04T23:59:59Z&page=2&limit=2",
    )
    .token(&moderator)
    .send(&app)
    .await;
    assert_eq!(status, StatusCode::OK);
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["pvz"]["registrationDate"], "2025-01-04T12:00:00Z");
    assert_eq!(page[0]["receptions"], json!([]));
}

#[tokio::test]
async fn register_and_login() {
    let app = app();

    let (status, user) = Call::new(Method::POST, "/register")
        .json(json!({ "email": "clerk@pvz.ru", "password": "hunter2", "role": "employee" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], "clerk@pvz.ru");
    assert!(user.get("password").is_none());
    assert!(user.get("passwordHash").is_none());

    let (status, _) = Call::new(Method::POST, "/register")
        .json(json!({ "email": "clerk@pvz.ru", "password": "x", "role": "moderator" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = Call::new(Method::POST, "/login")
        .json(json!({ "email": "clerk@pvz.ru", "password": "hunter2" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = Call::new(Method::GET, "/pvz").token(&token).send(&app).await;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = Call::new(Method::POST, "/login")
        .json(json!({ "email": "clerk@pvz.ru", "password": "wrong" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["message"], "invalid credentials");
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let app = app();
    let (status, body) = Call::new(Method::GET, "/health").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, doc) = Call::new(Method::GET, "/openapi.json").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/pvz/{pvzId}/close_last_reception"].is_object());
}
