use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::pagination::{parse_filter, Page, Pagination};
use super::AppState;
use crate::auth::Caller;
use crate::db::{InvoiceFilter, InvoiceWithLines};
use crate::invoicing::{self, InvoiceDraft, LineInput, PreparedInvoice};
use crate::mail;
use crate::models::{Invoice, InvoiceStatus};
use crate::permissions;

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub status: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceLines {
    pub lines: Vec<LineInput>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: InvoiceStatus,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub invoice: Invoice,
    #[serde(flatten)]
    pub delivery: mail::Delivery,
}

async fn load_invoice(state: &AppState, caller: &Caller, id: i32, permission: &str) -> Result<Invoice, ApiError> {
    let invoice = state.db.get_invoice(id).await?;
    caller.require(permission, Some(invoice.profile_id))?;
    Ok(invoice)
}

async fn prepare_draft(
    state: &AppState,
    caller: &Caller,
    draft: &InvoiceDraft,
) -> Result<(crate::models::Profile, crate::models::Client, PreparedInvoice), ApiError> {
    let client = state.db.get_client(draft.client_id).await?;
    caller.require(permissions::INVOICES_WRITE, Some(client.profile_id))?;
    let profile = state.db.get_profile(client.profile_id).await?;
    let prepared = invoicing::prepare(draft, &client, &profile, Utc::now().date_naive())?;
    Ok((profile, client, prepared))
}

/// GET /api/invoices
async fn list_invoices(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Page<Invoice>>, ApiError> {
    let filter = InvoiceFilter {
        status: parse_filter("status", query.status.as_deref())?,
        client_id: parse_filter("client_id", query.client_id.as_deref())?,
        profile_ids: caller.profile_scope(permissions::INVOICES_READ)?,
    };
    let (invoices, total) = state
        .db
        .list_invoices(&filter, pagination.limit(), pagination.offset())
        .await?;
    Ok(Json(Page::new(invoices, &pagination, total)))
}

/// POST /api/invoices/preview
async fn preview(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<InvoiceDraft>,
) -> Result<Json<PreparedInvoice>, ApiError> {
    let (_, _, prepared) = prepare_draft(&state, &caller, &draft).await?;
    Ok(Json(prepared))
}

/// POST /api/invoices
async fn create_invoice(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<InvoiceDraft>,
) -> Result<(StatusCode, Json<InvoiceWithLines>), ApiError> {
    let (profile, client, prepared) = prepare_draft(&state, &caller, &draft).await?;
    let invoice = state.db.create_invoice(&profile, &client, &prepared).await?;
    let full = state.db.get_invoice_with_lines(invoice.id).await?;
    Ok((StatusCode::CREATED, Json(full)))
}

/// GET /api/invoices/:id
async fn get_invoice(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<InvoiceWithLines>, ApiError> {
    load_invoice(&state, &caller, id, permissions::INVOICES_READ).await?;
    Ok(Json(state.db.get_invoice_with_lines(id).await?))
}

/// PUT /api/invoices/:id/lines
async fn replace_lines(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<ReplaceLines>,
) -> Result<Json<InvoiceWithLines>, ApiError> {
    load_invoice(&state, &caller, id, permissions::INVOICES_WRITE).await?;
    state.db.replace_lines(id, &body.lines).await?;
    Ok(Json(state.db.get_invoice_with_lines(id).await?))
}

/// POST /api/invoices/:id/send
///
/// The status change commits before the invoice is mailed; a mail failure
/// is reported in the response and the invoice stays SENT.
async fn send_invoice(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<Json<SendResponse>, ApiError> {
    load_invoice(&state, &caller, id, permissions::INVOICES_SEND).await?;
    let invoice = state.db.set_invoice_status(id, InvoiceStatus::Sent).await?;

    let client = state.db.get_client(invoice.client_id).await?;
    let profile = state.db.get_profile(invoice.profile_id).await?;
    let items = state.db.get_line_items(id).await?;

    let generator = Arc::clone(&state.invoices);
    let rendered = {
        let (invoice, client, profile) = (invoice.clone(), client.clone(), profile.clone());
        tokio::task::spawn_blocking(move || generator.attachment(&invoice, &items, &profile, &client))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
    };

    let outcome = match rendered {
        Ok(file) => state.mailer.send(mail::invoice_mail(&invoice, &client, &profile, file)).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &outcome {
        tracing::error!(invoice_id = id, error = %e, "invoice sent but not mailed");
    }

    Ok(Json(SendResponse { invoice, delivery: outcome.into() }))
}

/// POST /api/invoices/:id/status
async fn change_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(body): Json<StatusChange>,
) -> Result<Json<Invoice>, ApiError> {
    if body.status == InvoiceStatus::Sent {
        return Err(ApiError::Validation(format!("use POST /api/invoices/{id}/send to send an invoice")));
    }
    load_invoice(&state, &caller, id, permissions::INVOICES_WRITE).await?;
    Ok(Json(state.db.set_invoice_status(id, body.status).await?))
}

/// DELETE /api/invoices/:id
async fn delete_invoice(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    load_invoice(&state, &caller, id, permissions::INVOICES_DELETE).await?;
    state.db.delete_draft_invoice(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/invoices", get(list_invoices).post(create_invoice))
        .route("/api/invoices/preview", post(preview))
        .route("/api/invoices/:id", get(get_invoice).delete(delete_invoice))
        .route("/api/invoices/:id/lines", put(replace_lines))
        .route("/api/invoices/:id/send", post(send_invoice))
        .route("/api/invoices/:id/status", post(change_status))
}
