use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::auth::Caller;
use crate::permissions;
use crate::validation::format::{
    validate_email, validate_iban, validate_kvk_number, validate_phone, validate_postal_code, validate_vat_id,
};
use crate::validation::{FormatError, KvkCompany, VatCheck};

#[derive(Debug, Deserialize)]
pub struct ValueQuery {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FormatResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalised: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String, FormatError>> for FormatResponse {
    fn from(result: Result<String, FormatError>) -> Self {
        match result {
            Ok(normalised) => Self { valid: true, normalised: Some(normalised), error: None },
            Err(e) => Self { valid: false, normalised: None, error: Some(e.to_string()) },
        }
    }
}

fn check_format(kind: &str, value: &str) -> Option<Result<String, FormatError>> {
    let check: fn(&str) -> Result<String, FormatError> = match kind {
        "iban" => validate_iban,
        "vat" => validate_vat_id,
        "kvk-number" => validate_kvk_number,
        "postal-code" => validate_postal_code,
        "phone" => validate_phone,
        "email" => validate_email,
        _ => return None,
    };
    Some(check(value))
}

/// GET /api/validate/:kind?value=
async fn validate_format(
    Path(kind): Path<String>,
    Query(query): Query<ValueQuery>,
) -> Result<Json<FormatResponse>, ApiError> {
    let result = check_format(&kind, &query.value)
        .ok_or_else(|| ApiError::not_found(format!("unknown validation kind '{kind}'")))?;
    Ok(Json(result.into()))
}

/// GET /api/registry/kvk/:number
async fn kvk_lookup(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(number): Path<String>,
) -> Result<Json<KvkCompany>, ApiError> {
    caller.profile_scope(permissions::VALIDATION_RUN)?;
    let number = validate_kvk_number(&number).map_err(|e| ApiError::Validation(e.to_string()))?;
    let company = state.validator.kvk.lookup(&number).await?;
    company
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("KvK number {number} is not registered")))
}

/// GET /api/registry/vat/:vat_id
async fn vat_check(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(vat_id): Path<String>,
) -> Result<Json<VatCheck>, ApiError> {
    caller.profile_scope(permissions::VALIDATION_RUN)?;
    let vat_id = validate_vat_id(&vat_id).map_err(|e| ApiError::Validation(e.to_string()))?;
    Ok(Json(state.validator.vies.check(&vat_id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/validate/:kind", get(validate_format))
        .route("/api/registry/kvk/:number", get(kvk_lookup))
        .route("/api/registry/vat/:vat_id", get(vat_check))
}
