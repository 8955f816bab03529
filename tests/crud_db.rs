//! End-to-end tests against PostgreSQL: constraints, supertype chains and the person aggregate.
//!
//! Requires a running PostgreSQL server; the catalog is applied on first use.
//! Run with: DATABASE_URL="postgres://localhost/party_test" cargo test --test crud_db -- --ignored

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use party_registry::auth::JwtKeys;
use party_registry::{
    app_router, apply_migrations, bootstrap, connect_pool, load_embedded, resolve, AppState, Settings,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tower::ServiceExt;

const TEST_JWT_SECRET: &str = "test-secret-for-database-tests-32b!";

static MIGRATED: OnceCell<()> = OnceCell::const_new();

fn settings() -> Settings {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    Settings {
        database_url: Some(database_url),
        jwt_secret: TEST_JWT_SECRET.into(),
        ..Settings::default()
    }
}

async fn build_test_app() -> (axum::Router, PgPool) {
    let settings = settings();
    MIGRATED
        .get_or_init(|| async {
            bootstrap(settings.clone()).await.expect("bootstrap test database");
        })
        .await;
    let pool = connect_pool(&settings).await.expect("connect test database");
    let model = resolve(&load_embedded().unwrap()).unwrap();
    (app_router(AppState::new(pool.clone(), model, settings)), pool)
}

fn token() -> String {
    JwtKeys::new(TEST_JWT_SECRET.as_bytes(), 30).issue(1, "user").unwrap()
}

/// Two letters that differ between runs, for unique ISO codes.
fn unique_iso() -> String {
    let n = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos()
        % 676;
    let a = (b'A' + (n / 26) as u8) as char;
    let b = (b'A' + (n % 26) as u8) as char;
    format!("{a}{b}")
}

fn unique_suffix() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{nanos}")
}

/// One connection, so every request reuses the same prepared statements.
async fn build_single_connection_app() -> axum::Router {
    build_test_app().await;
    let settings = settings();
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(settings.database_url())
        .await
        .expect("connect test database");
    let model = resolve(&load_embedded().unwrap()).unwrap();
    app_router(AppState::new(pool, model, settings))
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token()));
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn country_lifecycle() {
    let (app, _pool) = build_test_app().await;
    let iso = unique_iso();
    let body = json!({"isocode": iso, "name_en": "Testland", "name_th": "ไทย"});

    let (status, created) = send(&app, "POST", "/v1/country", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK, "{created}");
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["name_th"], "ไทย");

    let (status, err) = send(&app, "POST", "/v1/country", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["detail"], "ISO code already exists");

    let (status, updated) = send(&app, "PUT", &format!("/v1/country/{id}"), Some(json!({"name_en": null, "name_th": "ทดสอบ"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name_en"], "Testland");
    assert_eq!(updated["name_th"], "ทดสอบ");

    let (status, msg) = send(&app, "DELETE", &format!("/v1/country/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(msg["message"], "Country deleted");

    let (status, err) = send(&app, "GET", &format!("/v1/country/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["detail"], "Country not found");
    let (status, _) = send(&app, "PUT", &format!("/v1/country/{id}"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", &format!("/v1/country/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn corporation_writes_whole_chain_or_nothing() {
    let (app, pool) = build_test_app().await;
    let tax_id = format!("TAX-{}", unique_suffix());

    let (status, corp) = send(
        &app,
        "POST",
        "/v1/corporation",
        Some(json!({"name_en": "Acme", "federal_tax_id_number": tax_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{corp}");
    let id = corp["id"].as_i64().unwrap();
    assert_eq!(corp["name_en"], "Acme");
    assert_eq!(corp["federal_tax_id_number"], tax_id.as_str());

    let (status, _) = send(&app, "GET", &format!("/v1/governmentagency/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let copy_name = format!("Acme Copy {}", unique_suffix());
    let (status, err) = send(
        &app,
        "POST",
        "/v1/corporation",
        Some(json!({"name_en": copy_name, "federal_tax_id_number": tax_id})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["detail"], "Federal tax ID number already exists");
    let leaked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organization WHERE name_en = $1")
        .bind(&copy_name)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(leaked, 0);

    let (status, _) = send(&app, "DELETE", &format!("/v1/corporation/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let party: Option<i32> = sqlx::query_scalar("SELECT id FROM party WHERE id = $1")
        .bind(id as i32)
        .fetch_optional(&pool)
        .await
        .unwrap();
    assert!(party.is_none());
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn referenced_country_cannot_be_deleted() {
    let (app, _pool) = build_test_app().await;
    let (status, country) = send(
        &app,
        "POST",
        "/v1/country",
        Some(json!({"isocode": unique_iso(), "name_en": "Refland"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{country}");
    let country_id = country["id"].as_i64().unwrap();

    let (status, person) = send(&app, "POST", "/v1/person", Some(json!({"fname": "Ref", "country_id": country_id}))).await;
    assert_eq!(status, StatusCode::OK, "{person}");
    let person_id = person["id"].as_i64().unwrap();

    let (status, err) = send(&app, "DELETE", &format!("/v1/country/{country_id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["detail"], "country is referenced by citizenship");

    let (status, _) = send(&app, "DELETE", &format!("/v1/person/{person_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/v1/country/{country_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn person_aggregate_tracks_current_values() {
    let (app, _pool) = build_test_app().await;
    let (status, person) = send(
        &app,
        "POST",
        "/v1/person",
        Some(json!({"fname": "Somchai", "lname": "Jaidee", "height_val": 170.0, "birthdate": "1990-04-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{person}");
    let id = person["id"].as_i64().unwrap();
    assert_eq!(person["fname"], "Somchai");
    assert_eq!(person["height_val"], 170.0);
    assert_eq!(person["birthdate"], "1990-04-01");
    assert!(person["mname"].is_null());

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/v1/person/{id}"),
        Some(json!({"fname": "Somsak", "comment": "renamed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["fname"], "Somsak");
    assert_eq!(updated["lname"], "Jaidee");
    assert_eq!(updated["comment"], "renamed");
    assert_eq!(updated["birthdate"], "1990-04-01");

    // Same-day change corrects the current row rather than adding one.
    let (status, names) = send(&app, "GET", &format!("/v1/personname/bypersonid/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names.as_array().unwrap().len(), 2);

    let (status, listed) = send(&app, "GET", "/v1/person?limit=1000", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().iter().any(|p| p["id"] == json!(id)));

    let (status, msg) = send(&app, "DELETE", &format!("/v1/person/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(msg["message"], "Person deleted");
    let (status, _) = send(&app, "GET", &format!("/v1/person/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn register_login_and_whoami() {
    let (app, _pool) = build_test_app().await;
    let email = format!("user{}@example.com", unique_suffix());
    let register = json!({"name": "Tester", "email": email, "password": "s3cret-pass"});

    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(register.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(register.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let login = |password: &str| {
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(json!({"email": email, "password": password}).to_string()))
            .unwrap()
    };
    let resp = app.clone().oneshot(login("wrong-pass")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.clone().oneshot(login("s3cret-pass")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["token_type"], "bearer");
    let access_token = body["access_token"].as_str().unwrap();

    let req = Request::builder()
        .uri("/users/me")
        .header("authorization", format!("Bearer {access_token}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let me: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(me["email"], email.as_str());
    assert_eq!(me["role"], "user");
    assert!(me.get("password").is_none());
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn same_statement_accepts_integers_floats_and_nulls() {
    let app = build_single_connection_app().await;
    let (status, person) = send(&app, "POST", "/v1/person", Some(json!({"fname": "Measured"}))).await;
    assert_eq!(status, StatusCode::OK, "{person}");
    let person_id = person["id"].as_i64().unwrap();

    let measure = |val: Value, fromdate: &str| {
        json!({"person_id": person_id, "physicalcharacteristictype_id": 1, "val": val, "fromdate": fromdate})
    };
    let (status, first) = send(&app, "POST", "/v1/physicalcharacteristic", Some(measure(json!(170), "2020-01-01"))).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["val"], 170.0);
    let (status, second) = send(&app, "POST", "/v1/physicalcharacteristic", Some(measure(json!(172.5), "2021-01-01"))).await;
    assert_eq!(status, StatusCode::OK, "{second}");
    assert_eq!(second["val"], 172.5);

    let uri = format!("/v1/physicalcharacteristic/{}", second["id"]);
    let (status, kept) = send(&app, "PUT", &uri, Some(json!({"physicalcharacteristictype_id": null}))).await;
    assert_eq!(status, StatusCode::OK, "{kept}");
    assert_eq!(kept["physicalcharacteristictype_id"], 1);
    let (status, changed) = send(&app, "PUT", &uri, Some(json!({"physicalcharacteristictype_id": 2}))).await;
    assert_eq!(status, StatusCode::OK, "{changed}");
    assert_eq!(changed["physicalcharacteristictype_id"], 2);
    assert_eq!(changed["physicalcharacteristictype_description"], "weight");
    assert_eq!(changed["val"], 172.5);

    let (status, _) = send(&app, "DELETE", &format!("/v1/person/{person_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn migrations_rerun_cleanly_on_a_migrated_database() {
    let (_app, pool) = build_test_app().await;
    let catalog = load_embedded().unwrap();
    apply_migrations(&pool, &catalog).await.expect("second migration run");
    apply_migrations(&pool, &catalog).await.expect("third migration run");

    let fks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pg_constraint WHERE conname = $1")
        .bind("communication_event_purpose_purpose_type_id_fkey")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(fks, 1);

    bootstrap(settings()).await.expect("restart against the migrated database");
}
