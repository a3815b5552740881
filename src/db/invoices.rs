use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Postgres, Transaction};

use super::clients::{lock_client, recompute_total_invoiced};
use super::Database;
use crate::error::{Error, Result};
use crate::invoicing::{self, LineInput, PreparedInvoice, Totals};
use crate::models::{ApprovalStatus, Client, Invoice, InvoiceLineItem, InvoiceStatus, Profile};

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<i32>,
    pub profile_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceWithLines {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLineItem>,
    pub totals: Totals,
}

const INVOICE_FILTER: &str = r#"
    ($1::invoice_status IS NULL OR status = $1)
    AND ($2::int4 IS NULL OR client_id = $2)
    AND ($3::int4[] IS NULL OR profile_id = ANY($3))
"#;

async fn lock_invoice(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<Invoice> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("invoice {id}")))
}

async fn insert_lines(tx: &mut Transaction<'_, Postgres>, invoice_id: i32, lines: &[LineInput]) -> Result<()> {
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_line_items (invoice_id, position, description, quantity, unit_price, vat_rate)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(invoice_id)
        .bind(position as i32)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.vat_rate)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn store_totals(tx: &mut Transaction<'_, Postgres>, invoice_id: i32, totals: &Totals) -> Result<Invoice> {
    let invoice = sqlx::query_as::<_, Invoice>(
        "UPDATE invoices SET subtotal = $1, vat_amount = $2, total = $3 WHERE id = $4 RETURNING *",
    )
    .bind(totals.subtotal)
    .bind(totals.vat_amount)
    .bind(totals.total)
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(invoice)
}

impl Database {
    // Invoice operations
    pub async fn list_invoices(&self, filter: &InvoiceFilter, limit: i64, offset: i64) -> Result<(Vec<Invoice>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM invoices WHERE {INVOICE_FILTER}"))
            .bind(filter.status)
            .bind(filter.client_id)
            .bind(filter.profile_ids.as_deref())
            .fetch_one(self.get_pool())
            .await?;

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT * FROM invoices WHERE {INVOICE_FILTER} ORDER BY issue_date DESC, id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(filter.profile_ids.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.get_pool())
        .await?;

        Ok((invoices, total))
    }

    pub async fn get_invoice(&self, id: i32) -> Result<Invoice> {
        sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?
            .ok_or_else(|| Error::not_found(format!("invoice {id}")))
    }

    pub async fn get_line_items(&self, invoice_id: i32) -> Result<Vec<InvoiceLineItem>> {
        let items = sqlx::query_as::<_, InvoiceLineItem>(
            "SELECT * FROM invoice_line_items WHERE invoice_id = $1 ORDER BY position ASC",
        )
        .bind(invoice_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(items)
    }

    pub async fn get_invoice_with_lines(&self, id: i32) -> Result<InvoiceWithLines> {
        let invoice = self.get_invoice(id).await?;
        let lines = self.get_line_items(id).await?;
        let inputs: Vec<LineInput> = lines.iter().map(LineInput::from).collect();
        let totals = invoicing::calculate_totals(&inputs, invoice.reverse_charge);
        Ok(InvoiceWithLines { invoice, lines, totals })
    }

    /// Stores a draft, allocating the next number for the profile and year.
    pub async fn create_invoice(&self, profile: &Profile, client: &Client, prepared: &PreparedInvoice) -> Result<Invoice> {
        let year = invoicing::issue_year(prepared.issue_date);
        let mut tx = self.get_pool().begin().await?;

        // serialises number allocation per profile
        sqlx::query("SELECT id FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(profile.id)
            .execute(&mut *tx)
            .await?;

        let last: Option<i32> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM invoices WHERE profile_id = $1 AND issue_year = $2")
                .bind(profile.id)
                .bind(year)
                .fetch_one(&mut *tx)
                .await?;
        let sequence = last.unwrap_or(0) + 1;
        let number = invoicing::format_invoice_number(&profile.invoice_prefix, year, sequence);

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices
                (profile_id, client_id, number, sequence, issue_year, issue_date, payment_term, due_date,
                 reverse_charge, notes, subtotal, vat_amount, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(profile.id)
        .bind(client.id)
        .bind(&number)
        .bind(sequence)
        .bind(year)
        .bind(prepared.issue_date)
        .bind(prepared.payment_term)
        .bind(prepared.due_date)
        .bind(prepared.reverse_charge)
        .bind(prepared.notes.as_deref())
        .bind(prepared.totals.subtotal)
        .bind(prepared.totals.vat_amount)
        .bind(prepared.totals.total)
        .fetch_one(&mut *tx)
        .await?;

        insert_lines(&mut tx, invoice.id, &prepared.lines).await?;
        tx.commit().await?;

        tracing::info!(invoice_id = invoice.id, number = %invoice.number, client_id = client.id, "invoice created");
        Ok(invoice)
    }

    /// Replaces the lines of a draft and refreshes its totals.
    pub async fn replace_lines(&self, invoice_id: i32, lines: &[LineInput]) -> Result<Invoice> {
        let mut tx = self.get_pool().begin().await?;
        let invoice = lock_invoice(&mut tx, invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(Error::conflict(format!(
                "invoice {} is {}; only drafts can be edited",
                invoice.number, invoice.status
            )));
        }

        let (lines, totals) = invoicing::prepare_lines(lines, invoice.reverse_charge)?;
        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?;
        insert_lines(&mut tx, invoice_id, &lines).await?;
        let invoice = store_totals(&mut tx, invoice_id, &totals).await?;

        tx.commit().await?;
        Ok(invoice)
    }

    /// Moves an invoice to `next`, keeping the client's invoiced total in step.
    pub async fn set_invoice_status(&self, invoice_id: i32, next: InvoiceStatus) -> Result<Invoice> {
        let mut tx = self.get_pool().begin().await?;
        let invoice = lock_invoice(&mut tx, invoice_id).await?;

        if !invoice.status.can_transition_to(next) {
            return Err(Error::conflict(format!(
                "invoice {} cannot move from {} to {}",
                invoice.number, invoice.status, next
            )));
        }

        let mut totals_changed = None;
        if next == InvoiceStatus::Sent {
            // locked until commit: approval cannot change under a send
            let client = lock_client(&mut tx, invoice.client_id).await?;
            if client.approval_status != ApprovalStatus::Approved {
                return Err(Error::validation(format!(
                    "invoices can only be sent to approved clients; {} is {}",
                    client.name, client.approval_status
                )));
            }
            if invoice.reverse_charge {
                crate::validation::reverse_charge_vat_id(&client)?;
            }

            let items: Vec<InvoiceLineItem> =
                sqlx::query_as("SELECT * FROM invoice_line_items WHERE invoice_id = $1 ORDER BY position ASC")
                    .bind(invoice_id)
                    .fetch_all(&mut *tx)
                    .await?;
            let lines: Vec<LineInput> = items.iter().map(LineInput::from).collect();
            let totals = invoicing::calculate_totals(&lines, invoice.reverse_charge);
            invoicing::validate_sendable(&lines, &totals)?;
            totals_changed = Some(totals);
        }
        if let Some(totals) = &totals_changed {
            store_totals(&mut tx, invoice_id, totals).await?;
        }

        let now = Utc::now();
        let updated = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = $1,
                sent_at = CASE WHEN $1 = 'SENT'::invoice_status THEN $2 ELSE sent_at END,
                paid_at = CASE WHEN $1 = 'PAID'::invoice_status THEN $2 ELSE paid_at END
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(next)
        .bind(now)
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await?;

        recompute_total_invoiced(&mut tx, invoice.client_id).await?;
        tx.commit().await?;

        tracing::info!(invoice_id, number = %updated.number, from = %invoice.status, to = %next, "invoice status changed");
        Ok(updated)
    }

    /// Only drafts can be deleted; issued numbers stay accounted for.
    pub async fn delete_draft_invoice(&self, invoice_id: i32) -> Result<()> {
        let mut tx = self.get_pool().begin().await?;
        let invoice = lock_invoice(&mut tx, invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(Error::conflict(format!(
                "invoice {} is {}; cancel it instead",
                invoice.number, invoice.status
            )));
        }
        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Marks every sent invoice due before `today` as overdue.
    pub async fn sweep_overdue(&self, today: NaiveDate) -> Result<Vec<Invoice>> {
        let mut tx = self.get_pool().begin().await?;
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices SET status = 'OVERDUE'
            WHERE status = 'SENT' AND due_date < $1
            RETURNING *
            "#,
        )
        .bind(today)
        .fetch_all(&mut *tx)
        .await?;

        let mut client_ids: Vec<i32> = invoices.iter().map(|i| i.client_id).collect();
        client_ids.sort_unstable();
        client_ids.dedup();
        for client_id in client_ids {
            recompute_total_invoiced(&mut tx, client_id).await?;
        }
        tx.commit().await?;

        tracing::info!(count = invoices.len(), %today, "overdue sweep finished");
        Ok(invoices)
    }
}
