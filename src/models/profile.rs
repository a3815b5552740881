use serde::{Deserialize, Serialize};

use super::PaymentTerm;

/// The freelancer's own business: the sender on every invoice.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Profile {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub kvk_number: String,
    pub vat_id: String,
    pub iban: String,
    pub bic: Option<String>,
    pub default_payment_term: PaymentTerm,
    pub invoice_prefix: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NewProfile {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub kvk_number: String,
    pub vat_id: String,
    pub iban: String,
    pub bic: Option<String>,
    pub default_payment_term: Option<PaymentTerm>,
    pub invoice_prefix: Option<String>,
}
