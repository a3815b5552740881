use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::auth::{self, Caller, SESSION_COOKIE};

/// Loads the session behind the request token and attaches the [`Caller`].
pub async fn require_session(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = auth::token_from_headers(req.headers()).ok_or_else(|| ApiError::unauthorized("missing session token"))?;

    let user = state
        .db
        .session_user(&auth::hash_token(&token))
        .await?
        .ok_or_else(|| ApiError::unauthorized("session expired or invalid"))?;
    let roles = state.db.roles_for_user(user.id).await?;

    req.extensions_mut().insert(Caller::new(user, roles));
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: crate::models::User,
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}

/// POST /api/auth/login
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Result<Response, ApiError> {
    let user = state.db.find_user_by_email(&body.email).await?;
    let user = match user {
        Some(user) if auth::verify_password(&body.password, &user.password_hash) => user,
        _ => {
            tracing::info!(email = %body.email, "failed login");
            return Err(ApiError::unauthorized("invalid email or password"));
        }
    };

    let token = auth::generate_token();
    let ttl = state.config.session_ttl();
    let expires_at = Utc::now() + ttl;
    state.db.create_session(user.id, &auth::hash_token(&token), expires_at).await?;
    tracing::info!(user_id = user.id, "logged in");

    let cookie = session_cookie(&token, ttl.num_seconds());
    let body = LoginResponse { token, expires_at, user };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = auth::token_from_headers(&headers) {
        state.db.delete_session(&auth::hash_token(&token)).await?;
    }
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, session_cookie("", 0))]).into_response())
}

#[derive(Debug, Serialize)]
pub struct Me {
    #[serde(flatten)]
    pub caller: Caller,
    pub permissions: Vec<&'static str>,
}

/// GET /api/auth/me
pub async fn me(Extension(caller): Extension<Caller>) -> Json<Me> {
    let permissions = caller.permission_names();
    Json(Me { caller, permissions })
}

/// Routes that need a session; login is mounted separately.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}
