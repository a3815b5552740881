use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "invoice_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

status_labels!(InvoiceStatus {
    Draft => "DRAFT",
    Sent => "SENT",
    Paid => "PAID",
    Overdue => "OVERDUE",
    Cancelled => "CANCELLED",
});

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        Self::Draft,
        Self::Sent,
        Self::Paid,
        Self::Overdue,
        Self::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Draft, Cancelled)
                | (Sent, Paid) | (Sent, Overdue) | (Sent, Cancelled)
                | (Overdue, Paid) | (Overdue, Cancelled)
        )
    }

    /// Statuses whose totals count towards a client's invoiced amount.
    pub fn counts_as_invoiced(&self) -> bool {
        matches!(self, Self::Sent | Self::Overdue | Self::Paid)
    }
}

/// Payment term of an invoice. `Custom` takes its due date from the invoice.
#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "payment_term", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentTerm {
    Immediate,
    Days7,
    Days14,
    #[default]
    Days30,
    Days60,
    Custom,
}

status_labels!(PaymentTerm {
    Immediate => "IMMEDIATE",
    Days7 => "DAYS7",
    Days14 => "DAYS14",
    Days30 => "DAYS30",
    Days60 => "DAYS60",
    Custom => "CUSTOM",
});

impl PaymentTerm {
    /// Fixed offset in days, `None` for a custom due date.
    pub fn offset_days(&self) -> Option<i64> {
        match self {
            Self::Immediate => Some(0),
            Self::Days7 => Some(7),
            Self::Days14 => Some(14),
            Self::Days30 => Some(30),
            Self::Days60 => Some(60),
            Self::Custom => None,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Invoice {
    pub id: i32,
    pub profile_id: i32,
    pub client_id: i32,
    pub number: String,
    pub sequence: i32,
    pub issue_year: i32,
    pub issue_date: NaiveDate,
    pub payment_term: PaymentTerm,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub reverse_charge: bool,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_exits() {
        for from in [InvoiceStatus::Paid, InvoiceStatus::Cancelled] {
            for to in InvoiceStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn draft_cannot_be_paid_directly() {
        assert!(!InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Paid));
        assert!(InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Sent));
        assert!(InvoiceStatus::Overdue.can_transition_to(InvoiceStatus::Paid));
        assert!(!InvoiceStatus::Overdue.can_transition_to(InvoiceStatus::Sent));
    }

    #[test]
    fn only_custom_term_lacks_an_offset() {
        assert_eq!(PaymentTerm::Days14.offset_days(), Some(14));
        assert_eq!(PaymentTerm::Immediate.offset_days(), Some(0));
        assert_eq!(PaymentTerm::Custom.offset_days(), None);
    }
}
