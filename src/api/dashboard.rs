use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};

use super::error::ApiError;
use super::AppState;
use crate::auth::Caller;
use crate::db::DashboardStats;
use crate::permissions;

const REVIEW_QUEUE_LIMIT: i64 = 20;

/// GET /api/admin/dashboard
async fn dashboard(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<DashboardStats>, ApiError> {
    let scope = caller.profile_scope(permissions::DASHBOARD_READ)?;
    Ok(Json(state.db.dashboard_stats(scope.as_deref(), REVIEW_QUEUE_LIMIT).await?))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/admin/dashboard", get(dashboard))
}
