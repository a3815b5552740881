use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::ApiError;
use super::AppState;
use crate::auth::{self, Caller};
use crate::error::Error;
use crate::mail;
use crate::models::{Document, DocumentStatus};
use crate::permissions;
use crate::signing::{self, DeclineRequest, LinkState, NewDocument, SignRequest};

/// What the signer sees behind a signing link.
#[derive(Debug, Serialize)]
pub struct SigningView {
    pub title: String,
    pub content: String,
    pub content_sha256: String,
    pub status: DocumentStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Document> for SigningView {
    fn from(doc: &Document) -> Self {
        Self {
            title: doc.title.clone(),
            content: String::from_utf8_lossy(&doc.content).into_owned(),
            content_sha256: doc.content_sha256.clone(),
            status: doc.status,
            expires_at: doc.signing_expires_at,
        }
    }
}

async fn load_document(state: &AppState, caller: &Caller, id: i32, permission: &str) -> Result<Document, ApiError> {
    let document = state.db.get_document(id).await?;
    let client = state.db.get_client(document.client_id).await?;
    caller.require(permission, Some(client.profile_id))?;
    Ok(document)
}

/// Resolves a signing token to a document whose link is still open.
async fn open_link(state: &AppState, token: &str) -> Result<Document, ApiError> {
    let document = state.db.find_document_by_token(&auth::hash_token(token)).await?;
    match signing::link_state(&document, Utc::now())? {
        LinkState::Open => Ok(document),
        LinkState::Expired => {
            state.db.mark_document_expired(document.id).await?;
            Err(Error::Expired("signing link".into()).into())
        }
    }
}

/// First hop of `X-Forwarded-For`, else the peer address.
fn signer_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// POST /api/documents
async fn create_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<NewDocument>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let client = state.db.get_client(body.client_id).await?;
    caller.require(permissions::DOCUMENTS_WRITE, Some(client.profile_id))?;
    body.validate()?;
    Ok((StatusCode::CREATED, Json(state.db.create_document(&body).await?)))
}

/// GET /api/documents/:id
async fn get_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(load_document(&state, &caller, id, permissions::DOCUMENTS_READ).await?))
}

#[derive(Debug, Serialize)]
pub struct DocumentSent {
    pub document: Document,
    #[serde(flatten)]
    pub delivery: mail::Delivery,
}

/// POST /api/documents/:id/send
///
/// Sending again replaces the signing token, so only the newest link works.
/// A mail failure is reported in the response and the document stays SENT.
async fn send_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<DocumentSent>, ApiError> {
    let document = load_document(&state, &caller, id, permissions::DOCUMENTS_WRITE).await?;
    let client = state.db.get_client(document.client_id).await?;
    signing::check_sendable(&document, &client)?;

    let token = auth::generate_token();
    let document = state
        .db
        .mark_document_sent(id, &client.email, &auth::hash_token(&token), signing::signing_expiry(Utc::now()))
        .await?;

    let profile = state.db.get_profile(client.profile_id).await?;
    let link = format!("{}/sign/{token}", state.config.app_base_url.trim_end_matches('/'));
    let outcome = state.mailer.send(mail::signing_mail(&document, &client, &profile, &link)).await;
    match &outcome {
        Ok(()) => tracing::info!(document_id = id, client_id = client.id, "document sent for signature"),
        Err(e) => tracing::error!(document_id = id, error = %e, "signing link issued but not mailed"),
    }

    Ok(Json(DocumentSent { document, delivery: outcome.into() }))
}

/// GET /api/sign/:token (public)
pub async fn view_signing(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<SigningView>, ApiError> {
    let document = open_link(&state, &token).await?;
    Ok(Json(SigningView::from(&document)))
}

/// POST /api/sign/:token (public)
pub async fn sign(
    State(state): State<AppState>,
    Path(token): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<SignRequest>,
) -> Result<Json<Document>, ApiError> {
    let document = open_link(&state, &token).await?;
    let name = signing::check_signature(&document, &body)?;
    let address = signer_address(&headers, peer.map(|ConnectInfo(addr)| addr));

    let signed = state.db.sign_document(document.id, &name, address.as_deref()).await?;
    tracing::info!(document_id = signed.id, "document signed");
    Ok(Json(signed))
}

/// POST /api/sign/:token/decline (public)
pub async fn decline(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<DeclineRequest>,
) -> Result<Json<Document>, ApiError> {
    let document = open_link(&state, &token).await?;
    let reason = body.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let declined = state.db.decline_document(document.id, reason).await?;
    tracing::info!(document_id = declined.id, "document declined");
    Ok(Json(declined))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/documents", post(create_document))
        .route("/api/documents/:id", get(get_document))
        .route("/api/documents/:id/send", post(send_document))
}
