use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::clients::load_client;
use super::error::ApiError;
use super::AppState;
use crate::auth::{self, Caller};
use crate::mail;
use crate::models::{ApprovalStatus, Client, OnboardingStatus};
use crate::onboarding::{self, OnboardingEvent, Transition};
use crate::permissions;

/// Body of every workflow action. `version` enables the stale-write check.
#[derive(Debug, Default, Deserialize)]
pub struct TransitionRequest {
    pub version: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub client: Client,
    pub transition: Transition,
    /// Set by actions that mail the client.
    #[serde(flatten)]
    pub delivery: Option<mail::Delivery>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub client_id: i32,
    pub name: String,
    pub onboarding_status: OnboardingStatus,
    pub approval_status: ApprovalStatus,
}

async fn apply(
    state: &AppState,
    caller: &Caller,
    id: i32,
    version: Option<i32>,
    event: OnboardingEvent,
) -> Result<Json<TransitionResponse>, ApiError> {
    let permission = event.required_permission().unwrap_or(permissions::CLIENTS_WRITE);
    load_client(state, caller, id, permission).await?;
    let (client, transition) = state.db.transition_client(id, version, &event, Some(caller.id())).await?;
    Ok(Json(TransitionResponse { client, transition, delivery: None }))
}

/// POST /api/clients/:id/onboarding/send-confirmation
///
/// The confirmation link is mailed after the transition commits; resending
/// replaces the previous link. A mail failure is reported in the response
/// and the client stays EMAIL_SENT, so the action can be repeated.
async fn send_confirmation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let token = auth::generate_token();
    let event = OnboardingEvent::SendConfirmation {
        token_hash: auth::hash_token(&token),
        expires_at: onboarding::confirmation_expiry(Utc::now()),
    };
    let Json(mut response) = apply(&state, &caller, id, body.version, event).await?;

    let client = &response.client;
    let profile = state.db.get_profile(client.profile_id).await?;
    let link = format!("{}/onboarding/confirm?token={token}", state.config.app_base_url.trim_end_matches('/'));
    let outcome = state.mailer.send(mail::confirmation_mail(client, &profile, &link)).await;
    if let Err(e) = &outcome {
        tracing::error!(client_id = id, error = %e, "confirmation link issued but not mailed");
    }

    response.delivery = Some(outcome.into());
    Ok(Json(response))
}

/// POST /api/clients/:id/onboarding/submit
async fn submit(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    apply(&state, &caller, id, body.version, OnboardingEvent::SubmitForReview).await
}

/// POST /api/clients/:id/onboarding/approve
async fn approve(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    apply(&state, &caller, id, body.version, OnboardingEvent::Approve).await
}

/// POST /api/clients/:id/onboarding/reject
async fn reject(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let event = OnboardingEvent::Reject { reason: body.reason.unwrap_or_default() };
    apply(&state, &caller, id, body.version, event).await
}

/// POST /api/clients/:id/onboarding/request-changes
async fn request_changes(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let event = OnboardingEvent::RequestChanges { reason: body.reason.unwrap_or_default() };
    apply(&state, &caller, id, body.version, event).await
}

/// POST /api/clients/:id/onboarding/reopen
async fn reopen(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    apply(&state, &caller, id, body.version, OnboardingEvent::Reopen).await
}

/// POST /api/onboarding/confirm (public)
pub async fn confirm(
    State(state): State<AppState>,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let token = body.token.trim();
    if token.is_empty() {
        return Err(ApiError::Validation("token is required".into()));
    }
    let client = state.db.confirm_client(&auth::hash_token(token)).await?;
    Ok(Json(ConfirmResponse {
        client_id: client.id,
        name: client.name,
        onboarding_status: client.onboarding_status,
        approval_status: client.approval_status,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/clients/:id/onboarding/send-confirmation", post(send_confirmation))
        .route("/api/clients/:id/onboarding/submit", post(submit))
        .route("/api/clients/:id/onboarding/approve", post(approve))
        .route("/api/clients/:id/onboarding/reject", post(reject))
        .route("/api/clients/:id/onboarding/request-changes", post(request_changes))
        .route("/api/clients/:id/onboarding/reopen", post(reopen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::onboarding::WorkflowState;
    use crate::validation::tests::sample_client;

    fn response(delivery: Option<mail::Delivery>) -> serde_json::Value {
        let state = WorkflowState::new(OnboardingStatus::PendingValidation, ApprovalStatus::NotRequested);
        let transition = Transition {
            event: "SEND_CONFIRMATION",
            from: state,
            to: WorkflowState::new(OnboardingStatus::EmailSent, ApprovalStatus::NotRequested),
            reason: None,
        };
        serde_json::to_value(TransitionResponse { client: sample_client(), transition, delivery }).unwrap()
    }

    #[test]
    fn unmailed_confirmation_reports_the_error() {
        let body = response(Some(Err::<(), _>(Error::Mail("smtp timeout".into())).into()));
        assert_eq!(body["mail_sent"], false);
        assert!(body["mail_error"].as_str().unwrap().contains("smtp timeout"));
        assert_eq!(body["transition"]["to"]["onboarding"], "EMAIL_SENT");
    }

    #[test]
    fn actions_without_mail_omit_delivery() {
        let body = response(None);
        assert!(body.get("mail_sent").is_none());
        assert!(body.get("client").is_some());
    }
}
