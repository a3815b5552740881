//! Invoice arithmetic: line amounts, VAT per rate group, due dates and
//! invoice numbering.
//!
//! Amounts are EUR with two decimals, rounded half away from zero.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Client, InvoiceLineItem, PaymentTerm, Profile, VatRate};
use crate::validation;

/// A line as entered by the user, before it is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub vat_rate: VatRate,
}

impl From<&InvoiceLineItem> for LineInput {
    fn from(item: &InvoiceLineItem) -> Self {
        Self {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            vat_rate: item.vat_rate,
        }
    }
}

/// VAT owed for all lines sharing one rate.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VatGroup {
    pub rate: VatRate,
    pub base: Decimal,
    pub vat: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
    pub vat_groups: Vec<VatGroup>,
}

pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantity times unit price, rounded to cents.
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round_cents(quantity * unit_price)
}

/// Computes subtotal, VAT and total.
///
/// VAT is calculated once per rate on the group subtotal rather than per
/// line, so rounding differences do not accumulate. Reverse-charged
/// invoices carry no VAT; their groups are reported with a zero amount.
pub fn calculate_totals(lines: &[LineInput], reverse_charge: bool) -> Totals {
    let mut groups: BTreeMap<VatRate, Decimal> = BTreeMap::new();
    for line in lines {
        *groups.entry(line.vat_rate).or_default() += line_amount(line.quantity, line.unit_price);
    }

    let vat_groups: Vec<VatGroup> = groups
        .into_iter()
        .map(|(rate, base)| {
            let vat = if reverse_charge {
                Decimal::ZERO
            } else {
                round_cents(base * rate.percentage() / Decimal::ONE_HUNDRED)
            };
            VatGroup { rate, base, vat }
        })
        .collect();

    let subtotal: Decimal = vat_groups.iter().map(|g| g.base).sum();
    let vat_amount: Decimal = vat_groups.iter().map(|g| g.vat).sum();

    Totals {
        subtotal,
        vat_amount,
        total: subtotal + vat_amount,
        vat_groups,
    }
}

/// Due date for an invoice issued on `issue_date`.
///
/// A custom term requires `custom_due`, which may not lie before the issue
/// date. Fixed terms ignore `custom_due`.
pub fn due_date(issue_date: NaiveDate, term: PaymentTerm, custom_due: Option<NaiveDate>) -> Result<NaiveDate> {
    match term.offset_days() {
        Some(days) => Ok(issue_date + Duration::days(days)),
        None => {
            let due = custom_due.ok_or_else(|| Error::validation("custom payment term requires a due date"))?;
            if due < issue_date {
                return Err(Error::validation(format!(
                    "due date {due} lies before issue date {issue_date}"
                )));
            }
            Ok(due)
        }
    }
}

/// Invoice numbers look like `{prefix}2026-0042`; the sequence restarts each year.
pub fn format_invoice_number(prefix: &str, year: i32, sequence: i32) -> String {
    format!("{prefix}{year}-{sequence:04}")
}

pub const MAX_PREFIX_LEN: usize = 10;

/// A prefix may hold ASCII letters, digits, `-` and `_`.
pub fn validate_invoice_prefix(prefix: &str) -> Result<String> {
    let prefix = prefix.trim();
    if prefix.len() > MAX_PREFIX_LEN {
        return Err(Error::validation(format!("invoice prefix is longer than {MAX_PREFIX_LEN} characters")));
    }
    if let Some(bad) = prefix.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))) {
        return Err(Error::validation(format!("invoice prefix may not contain '{bad}'")));
    }
    Ok(prefix.to_string())
}

pub fn issue_year(issue_date: NaiveDate) -> i32 {
    issue_date.year()
}

/// Decimals a quantity may carry; matches the `quantity` column.
pub const QUANTITY_SCALE: u32 = 4;

/// Checks that apply when lines are saved.
pub fn validate_lines(lines: &[LineInput]) -> Result<()> {
    for (index, line) in lines.iter().enumerate() {
        if line.description.trim().is_empty() {
            return Err(Error::validation(format!("line {} has no description", index + 1)));
        }
        if line.quantity.is_zero() {
            return Err(Error::validation(format!("line {} has a zero quantity", index + 1)));
        }
        if line.quantity.normalize().scale() > QUANTITY_SCALE {
            return Err(Error::validation(format!(
                "line {} has a quantity with more than {QUANTITY_SCALE} decimals",
                index + 1
            )));
        }
        if line.unit_price.is_sign_negative() {
            return Err(Error::validation(format!(
                "line {} has a negative unit price; use a negative quantity for credit lines",
                index + 1
            )));
        }
    }
    Ok(())
}

/// Checks that apply when a draft is sent.
pub fn validate_sendable(lines: &[LineInput], totals: &Totals) -> Result<()> {
    if lines.is_empty() {
        return Err(Error::validation("an invoice needs at least one line before it can be sent"));
    }
    if totals.total.is_sign_negative() && !totals.total.is_zero() {
        return Err(Error::validation("an invoice with a negative total cannot be sent"));
    }
    Ok(())
}

/// Normalises a stored amount to two decimals.
pub fn normalise_price(amount: Decimal) -> Decimal {
    round_cents(amount)
}

/// Invoice as submitted for creation or preview.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceDraft {
    pub client_id: i32,
    pub issue_date: Option<NaiveDate>,
    pub payment_term: Option<PaymentTerm>,
    /// Required for [`PaymentTerm::Custom`].
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub reverse_charge: bool,
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineInput>,
}

/// A checked draft with dates and totals filled in, ready to be stored.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedInvoice {
    pub issue_date: NaiveDate,
    pub payment_term: PaymentTerm,
    pub due_date: NaiveDate,
    pub reverse_charge: bool,
    pub notes: Option<String>,
    pub lines: Vec<LineInput>,
    pub totals: Totals,
}

fn normalise_line(line: &LineInput) -> LineInput {
    LineInput {
        description: line.description.trim().to_string(),
        quantity: line.quantity.normalize(),
        unit_price: normalise_price(line.unit_price),
        vat_rate: line.vat_rate,
    }
}

/// Checks a draft against the client and sender and computes its totals.
pub fn prepare(draft: &InvoiceDraft, client: &Client, profile: &Profile, today: NaiveDate) -> Result<PreparedInvoice> {
    if draft.client_id != client.id || client.profile_id != profile.id {
        return Err(Error::validation("client does not belong to this profile"));
    }
    if draft.reverse_charge {
        validation::reverse_charge_vat_id(client)?;
    }

    let issue_date = draft.issue_date.unwrap_or(today);
    let payment_term = draft.payment_term.unwrap_or(profile.default_payment_term);
    let due_date = due_date(issue_date, payment_term, draft.due_date)?;

    let lines: Vec<LineInput> = draft.lines.iter().map(normalise_line).collect();
    validate_lines(&lines)?;
    let totals = calculate_totals(&lines, draft.reverse_charge);

    Ok(PreparedInvoice {
        issue_date,
        payment_term,
        due_date,
        reverse_charge: draft.reverse_charge,
        notes: draft.notes.as_ref().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        lines,
        totals,
    })
}

/// Normalises replacement lines for a draft invoice.
pub fn prepare_lines(lines: &[LineInput], reverse_charge: bool) -> Result<(Vec<LineInput>, Totals)> {
    let lines: Vec<LineInput> = lines.iter().map(normalise_line).collect();
    validate_lines(&lines)?;
    let totals = calculate_totals(&lines, reverse_charge);
    Ok((lines, totals))
}
