use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Dutch BTW rates.
#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[sqlx(type_name = "vat_rate", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VatRate {
    #[default]
    Standard,
    Reduced,
    Zero,
}

status_labels!(VatRate {
    Standard => "STANDARD",
    Reduced => "REDUCED",
    Zero => "ZERO",
});

impl VatRate {
    /// Rate as a percentage.
    pub fn percentage(&self) -> Decimal {
        match self {
            Self::Standard => dec!(21),
            Self::Reduced => dec!(9),
            Self::Zero => Decimal::ZERO,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct InvoiceLineItem {
    pub id: i32,
    pub invoice_id: i32,
    pub position: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: VatRate,
}
