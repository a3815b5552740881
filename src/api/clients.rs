use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::pagination::{parse_filter, Page, Pagination};
use super::AppState;
use crate::auth::Caller;
use crate::db::ClientFilter;
use crate::models::{Client, ClientApproval, ClientValidation, NewClient};
use crate::permissions;
use crate::validation::{self, ValidationReport};

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    pub onboarding_status: Option<String>,
    pub approval_status: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClient {
    pub profile_id: i32,
    #[serde(flatten)]
    pub client: NewClient,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClient {
    pub version: i32,
    #[serde(flatten)]
    pub client: NewClient,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub validation: ClientValidation,
    pub report: ValidationReport,
}

/// Loads a client and checks `permission` on its profile.
pub(super) async fn load_client(
    state: &AppState,
    caller: &Caller,
    id: i32,
    permission: &str,
) -> Result<Client, ApiError> {
    let client = state.db.get_client(id).await?;
    caller.require(permission, Some(client.profile_id))?;
    Ok(client)
}

/// GET /api/clients
async fn list_clients(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<Page<Client>>, ApiError> {
    let filter = ClientFilter {
        onboarding_status: parse_filter("onboarding_status", query.onboarding_status.as_deref())?,
        approval_status: parse_filter("approval_status", query.approval_status.as_deref())?,
        q: query.q,
        profile_ids: caller.profile_scope(permissions::CLIENTS_READ)?,
    };
    let (clients, total) = state
        .db
        .list_clients(&filter, pagination.limit(), pagination.offset())
        .await?;
    Ok(Json(Page::new(clients, &pagination, total)))
}

/// POST /api/clients
async fn create_client(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateClient>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    caller.require(permissions::CLIENTS_WRITE, Some(body.profile_id))?;
    let profile = state.db.get_profile(body.profile_id).await?;
    let input = validation::normalise_client(body.client)?;
    let client = state.db.create_client(profile.id, &input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /api/clients/:id
async fn get_client(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<Client>, ApiError> {
    Ok(Json(load_client(&state, &caller, id, permissions::CLIENTS_READ).await?))
}

/// PUT /api/clients/:id
async fn update_client(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateClient>,
) -> Result<Json<Client>, ApiError> {
    load_client(&state, &caller, id, permissions::CLIENTS_WRITE).await?;
    let input = validation::normalise_client(body.client)?;
    let client = state.db.update_client(id, body.version, &input, Some(caller.id())).await?;
    Ok(Json(client))
}

/// DELETE /api/clients/:id
async fn delete_client(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    load_client(&state, &caller, id, permissions::CLIENTS_DELETE).await?;
    state.db.delete_client(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/clients/:id/validate
async fn validate_client(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<ValidationResponse>, ApiError> {
    let client = load_client(&state, &caller, id, permissions::VALIDATION_RUN).await?;
    let report = state.validator.validate_client(&client).await;
    let validation = state.db.record_validation(client.id, &report, Some(caller.id())).await?;
    Ok(Json(ValidationResponse { validation, report }))
}

/// GET /api/clients/:id/validations
async fn list_validations(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<ClientValidation>>, ApiError> {
    load_client(&state, &caller, id, permissions::CLIENTS_READ).await?;
    Ok(Json(state.db.list_validations(id).await?))
}

/// GET /api/clients/:id/approvals
async fn list_approvals(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<ClientApproval>>, ApiError> {
    load_client(&state, &caller, id, permissions::CLIENTS_READ).await?;
    Ok(Json(state.db.list_approvals(id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/clients", get(list_clients).post(create_client))
        .route("/api/clients/:id", get(get_client).put(update_client).delete(delete_client))
        .route("/api/clients/:id/validate", post(validate_client))
        .route("/api/clients/:id/validations", get(list_validations))
        .route("/api/clients/:id/approvals", get(list_approvals))
}
