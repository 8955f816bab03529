//! HTTP-level tests for routing, authentication and request validation.
//!
//! The pool connects lazily and none of these requests reach the database, so no server is needed.

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use party_registry::auth::JwtKeys;
use party_registry::{app_router, load_embedded, resolve, AppState, Settings};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

const TEST_JWT_SECRET: &str = "test-secret-for-http-tests-32-bytes!";

fn settings() -> Settings {
    Settings {
        database_url: Some("postgres://localhost:1/unused".into()),
        jwt_secret: TEST_JWT_SECRET.into(),
        body_limit_bytes: 4096,
        ..Settings::default()
    }
}

fn build_test_app() -> axum::Router {
    let settings = settings();
    let pool = PgPoolOptions::new()
        .connect_lazy(settings.database_url())
        .expect("lazy pool");
    let model = resolve(&load_embedded().unwrap()).unwrap();
    app_router(AppState::new(pool, model, settings))
}

fn token(user_id: i32, role: &str) -> String {
    JwtKeys::new(TEST_JWT_SECRET.as_bytes(), 30).issue(user_id, role).unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(
        |_| serde_json::json!({ "raw": String::from_utf8_lossy(&bytes).to_string() }),
    )
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = bearer {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, bearer: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(t) = bearer {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_and_banner_need_no_token() {
    let resp = build_test_app().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "ok");

    let resp = build_test_app().oneshot(get("/", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_json(resp).await["message"].is_string());

    let resp = build_test_app().oneshot(get("/version", None)).await.unwrap();
    assert_eq!(body_json(resp).await["name"], "party-registry");
}

#[tokio::test]
async fn missing_token_is_not_authenticated() {
    let resp = build_test_app().oneshot(get("/v1/country", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["www-authenticate"], "Bearer");
    assert_eq!(body_json(resp).await["detail"], "Not authenticated");
}

#[tokio::test]
async fn tampered_and_foreign_tokens_are_invalid() {
    let mut tampered = token(1, "user");
    tampered.pop();
    let resp = build_test_app()
        .oneshot(get("/v1/country", Some(&tampered)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["detail"], "Invalid token");

    let foreign = JwtKeys::new(b"some-other-secret-that-is-32-bytes!", 30)
        .issue(1, "admin")
        .unwrap();
    let resp = build_test_app()
        .oneshot(get("/users/1", Some(&foreign)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_administration_requires_admin_role() {
    let resp = build_test_app()
        .oneshot(get("/users", Some(&token(7, "user"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["detail"], "Admin privileges required");

    let req = Request::builder()
        .method("DELETE")
        .uri("/users/3")
        .header("authorization", format!("Bearer {}", token(7, "user")))
        .body(Body::empty())
        .unwrap();
    let resp = build_test_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_resources_and_scopes_are_not_found() {
    let t = token(1, "user");
    let resp = build_test_app()
        .oneshot(get("/v1/spaceship", Some(&t)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = build_test_app()
        .oneshot(get("/v1/partyrole/byshoesize/4", Some(&t)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ids_and_filters_are_bad_requests() {
    let t = token(1, "user");
    let resp = build_test_app()
        .oneshot(get("/v1/country/abc", Some(&t)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["detail"], "invalid id");

    let resp = build_test_app()
        .oneshot(get("/v1/person/abc", Some(&t)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = build_test_app()
        .oneshot(get("/v1/partyrole/bypartyid/xyz", Some(&t)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["detail"], "party_id must be an integer");
}

#[tokio::test]
async fn create_validates_before_touching_the_database() {
    let t = token(1, "user");
    let resp = build_test_app()
        .oneshot(post_json("/v1/country", Some(&t), serde_json::json!({"name_en": "Thailand"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["detail"], "isocode is required");

    let resp = build_test_app()
        .oneshot(post_json(
            "/v1/country",
            Some(&t),
            serde_json::json!({"isocode": "T1", "name_en": "Thailand"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = build_test_app()
        .oneshot(post_json("/v1/person", Some(&t), serde_json::json!({"birthdate": "yesterday"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_rejects_invalid_email() {
    let resp = build_test_app()
        .oneshot(post_json(
            "/auth/register",
            None,
            serde_json::json!({"name": "A", "email": "not-an-email", "password": "longenough"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["detail"], "email must be a valid email");
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let t = token(1, "user");
    let big = "x".repeat(8192);
    let resp = build_test_app()
        .oneshot(post_json("/v1/country", Some(&t), serde_json::json!({"name_en": big})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn declared_oversized_length_is_rejected_up_front() {
    let t = token(1, "user");
    let body = serde_json::json!({"name_en": "x".repeat(8192)}).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/v1/country")
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .header("authorization", format!("Bearer {t}"))
        .body(Body::from(body))
        .unwrap();
    let resp = build_test_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/v1/country")
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let resp = build_test_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "http://localhost:5173");
    assert_eq!(resp.headers()["access-control-allow-credentials"], "true");

    let req = Request::builder()
        .uri("/health")
        .header("origin", "http://evil.test")
        .body(Body::empty())
        .unwrap();
    let resp = build_test_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}
