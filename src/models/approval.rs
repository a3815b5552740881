use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ApprovalStatus, OnboardingStatus};

/// Result of one validation run against a client's identifiers.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ClientValidation {
    pub id: i32,
    pub client_id: i32,
    pub passed: bool,
    pub checks: serde_json::Value,
    pub performed_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Audit entry for an applied workflow event.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ClientApproval {
    pub id: i32,
    pub client_id: i32,
    pub event: String,
    pub from_onboarding: OnboardingStatus,
    pub to_onboarding: OnboardingStatus,
    pub from_approval: ApprovalStatus,
    pub to_approval: ApprovalStatus,
    pub reason: Option<String>,
    pub actor_id: Option<i32>,
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
