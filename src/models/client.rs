use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Progress of a client through onboarding.
#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "onboarding_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingStatus {
    PendingValidation,
    EmailSent,
    ClientConfirmed,
    AdminReview,
    Approved,
    Rejected,
}

status_labels!(OnboardingStatus {
    PendingValidation => "PENDING_VALIDATION",
    EmailSent => "EMAIL_SENT",
    ClientConfirmed => "CLIENT_CONFIRMED",
    AdminReview => "ADMIN_REVIEW",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

impl OnboardingStatus {
    pub const ALL: [OnboardingStatus; 6] = [
        Self::PendingValidation,
        Self::EmailSent,
        Self::ClientConfirmed,
        Self::AdminReview,
        Self::Approved,
        Self::Rejected,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Admin decision state, kept alongside the onboarding status.
#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "approval_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    NotRequested,
    Pending,
    ChangesRequested,
    Approved,
    Rejected,
}

status_labels!(ApprovalStatus {
    NotRequested => "NOT_REQUESTED",
    Pending => "PENDING",
    ChangesRequested => "CHANGES_REQUESTED",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 5] = [
        Self::NotRequested,
        Self::Pending,
        Self::ChangesRequested,
        Self::Approved,
        Self::Rejected,
    ];
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Client {
    pub id: i32,
    pub profile_id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country_code: String,
    pub kvk_number: Option<String>,
    pub vat_id: Option<String>,
    pub iban: Option<String>,
    pub onboarding_status: OnboardingStatus,
    pub approval_status: ApprovalStatus,
    pub total_invoiced: Decimal,
    pub version: i32,
    #[serde(skip)]
    pub confirmation_token_hash: Option<String>,
    #[serde(skip)]
    pub confirmation_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn is_dutch(&self) -> bool {
        self.country_code.eq_ignore_ascii_case("NL")
    }

    /// Snapshot stored with every approval decision.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "email": self.email,
            "country_code": self.country_code,
            "kvk_number": self.kvk_number,
            "vat_id": self.vat_id,
            "iban": self.iban,
            "onboarding_status": self.onboarding_status,
            "approval_status": self.approval_status,
            "version": self.version,
        })
    }
}

/// Editable client fields, used for both creation and updates.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country_code: Option<String>,
    pub kvk_number: Option<String>,
    pub vat_id: Option<String>,
    pub iban: Option<String>,
}

impl NewClient {
    /// Whether applying this edit changes any identifier that was validated.
    pub fn changes_identifiers(&self, current: &Client) -> bool {
        self.kvk_number != current.kvk_number
            || self.vat_id != current.vat_id
            || self.iban != current.iban
    }
}

/// Row of the admin review queue.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct ClientSummary {
    pub id: i32,
    pub profile_id: i32,
    pub name: String,
    pub kvk_number: Option<String>,
    pub vat_id: Option<String>,
    pub onboarding_status: OnboardingStatus,
    pub approval_status: ApprovalStatus,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}
