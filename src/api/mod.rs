//! HTTP API.
//!
//! Everything under `/api` needs a session except login, the onboarding
//! confirmation and the signing links, which are reached from mail.

pub mod auth;
pub mod clients;
pub mod dashboard;
pub mod documents;
pub mod error;
pub mod invoices;
pub mod onboarding;
pub mod pagination;
pub mod validation;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;
use crate::invoice_gen::InvoiceGenerator;
use crate::mail::Mailer;
use crate::validation::Validator;

pub use error::ApiError;

/// Shared handler state. Clones share the pool, registry caches and mailer.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub validator: Validator,
    pub mailer: Mailer,
    pub invoices: Arc<InvoiceGenerator>,
}

impl AppState {
    pub fn new(db: Database, config: Config, validator: Validator, mailer: Mailer, invoices: InvoiceGenerator) -> Self {
        Self {
            db,
            config: Arc::new(config),
            validator,
            mailer,
            invoices: Arc::new(invoices),
        }
    }
}

/// GET /health
async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /health/ready
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
        }
    }
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/api/auth/login", post(auth::login))
        .route("/api/onboarding/confirm", post(onboarding::confirm))
        .route("/api/sign/:token", get(documents::view_signing).post(documents::sign))
        .route("/api/sign/:token/decline", post(documents::decline));

    let protected = Router::new()
        .merge(auth::router())
        .merge(clients::router())
        .merge(onboarding::router())
        .merge(invoices::router())
        .merge(documents::router())
        .merge(validation::router())
        .merge(dashboard::router())
        .route_layer(from_fn_with_state(state.clone(), auth::require_session));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
