//! Router tests that never reach the database: the pool connects lazily and
//! every request below is answered before a query is made.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use zzp_manager::api::error::ErrorBody;
use zzp_manager::api::{self, AppState};
use zzp_manager::config::Config;
use zzp_manager::db::Database;
use zzp_manager::invoice_gen::InvoiceGenerator;
use zzp_manager::mail::Mailer;
use zzp_manager::validation::Validator;

fn app() -> Router {
    let config = Config::with_database_url("postgres://localhost/zzp_test");
    let db = Database::connect_lazy(&config).unwrap();
    let validator = Validator::from_config(&config).unwrap();
    let mailer = Mailer::log_only("facturen@example.nl".parse().unwrap());
    let invoices = InvoiceGenerator::new(std::env::temp_dir().join("zzp-manager-api-tests")).unwrap();
    api::router(AppState::new(db, config, validator, mailer, invoices))
}

async fn error_code(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
    body.error.code
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_routes_need_a_session() {
    for path in ["/api/clients", "/api/invoices", "/api/admin/dashboard", "/api/validate/iban?value=x"] {
        let response = app()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(error_code(response).await, "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn workflow_actions_need_a_session() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/clients/1/onboarding/approve")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blank_confirmation_token_is_rejected() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/onboarding/confirm")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"token":"   "}"#))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = app()
        .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
