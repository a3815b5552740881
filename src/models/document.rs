use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "document_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Sent,
    Signed,
    Declined,
    Expired,
}

status_labels!(DocumentStatus {
    Draft => "DRAFT",
    Sent => "SENT",
    Signed => "SIGNED",
    Declined => "DECLINED",
    Expired => "EXPIRED",
});

/// A document offered to a client for e-signature.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Document {
    pub id: i32,
    pub client_id: i32,
    pub title: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub content_sha256: String,
    pub status: DocumentStatus,
    pub signer_email: Option<String>,
    #[serde(skip)]
    pub signing_token_hash: Option<String>,
    pub signing_expires_at: Option<DateTime<Utc>>,
    pub signer_name: Option<String>,
    pub signer_address: Option<String>,
    pub decline_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
