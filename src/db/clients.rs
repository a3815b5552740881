use chrono::Utc;
use sqlx::{Postgres, Transaction};

use super::{like_pattern, Database};
use crate::error::{Error, Result};
use crate::models::{
    ApprovalStatus, Client, ClientApproval, ClientSummary, ClientValidation, NewClient, OnboardingStatus,
};
use crate::onboarding::{self, Guards, OnboardingEvent, Transition, WorkflowState};
use crate::validation::ValidationReport;

/// Filters for the client list. `profile_ids: None` means every profile.
#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub onboarding_status: Option<OnboardingStatus>,
    pub approval_status: Option<ApprovalStatus>,
    pub q: Option<String>,
    pub profile_ids: Option<Vec<i32>>,
}

const CLIENT_FILTER: &str = r#"
    ($1::onboarding_status IS NULL OR onboarding_status = $1)
    AND ($2::approval_status IS NULL OR approval_status = $2)
    AND ($3::text IS NULL OR name ILIKE $3 OR email ILIKE $3 OR kvk_number ILIKE $3 OR vat_id ILIKE $3)
    AND ($4::int4[] IS NULL OR profile_id = ANY($4))
"#;

pub(super) async fn lock_client(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<Client> {
    sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::not_found(format!("client {id}")))
}

fn check_version(client: &Client, expected: Option<i32>) -> Result<()> {
    match expected {
        Some(version) if version != client.version => Err(Error::conflict(format!(
            "client {} was modified (version {} is current, {} was expected)",
            client.id, client.version, version
        ))),
        _ => Ok(()),
    }
}

async fn insert_approval(
    tx: &mut Transaction<'_, Postgres>,
    client: &Client,
    transition: &Transition,
    actor_id: Option<i32>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_approvals
            (client_id, event, from_onboarding, to_onboarding, from_approval, to_approval, reason, actor_id, snapshot)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(client.id)
    .bind(transition.event)
    .bind(transition.from.onboarding)
    .bind(transition.to.onboarding)
    .bind(transition.from.approval)
    .bind(transition.to.approval)
    .bind(transition.reason.as_deref())
    .bind(actor_id)
    .bind(client.snapshot())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Recomputes `total_invoiced` from the client's sent, overdue and paid invoices.
pub(super) async fn recompute_total_invoiced(tx: &mut Transaction<'_, Postgres>, client_id: i32) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE clients SET total_invoiced = COALESCE((
            SELECT SUM(total) FROM invoices
            WHERE client_id = $1 AND status IN ('SENT', 'OVERDUE', 'PAID')
        ), 0)
        WHERE id = $1
        "#,
    )
    .bind(client_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

impl Database {
    // Client operations
    pub async fn list_clients(&self, filter: &ClientFilter, limit: i64, offset: i64) -> Result<(Vec<Client>, i64)> {
        let q = filter.q.as_deref().filter(|q| !q.trim().is_empty()).map(like_pattern);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM clients WHERE {CLIENT_FILTER}"))
            .bind(filter.onboarding_status)
            .bind(filter.approval_status)
            .bind(q.as_deref())
            .bind(filter.profile_ids.as_deref())
            .fetch_one(self.get_pool())
            .await?;

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT * FROM clients WHERE {CLIENT_FILTER} ORDER BY name ASC, id ASC LIMIT $5 OFFSET $6"
        ))
        .bind(filter.onboarding_status)
        .bind(filter.approval_status)
        .bind(q.as_deref())
        .bind(filter.profile_ids.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.get_pool())
        .await?;

        Ok((clients, total))
    }

    pub async fn get_client(&self, id: i32) -> Result<Client> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?
            .ok_or_else(|| Error::not_found(format!("client {id}")))?;

        Ok(client)
    }

    /// `input` must already be normalised.
    pub async fn create_client(&self, profile_id: i32, input: &NewClient) -> Result<Client> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients
                (profile_id, name, email, phone, address, postal_code, city, country_code, kvk_number, vat_id, iban)
            VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, 'NL'), $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(profile_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.phone.as_deref())
        .bind(input.address.as_deref())
        .bind(input.postal_code.as_deref())
        .bind(input.city.as_deref())
        .bind(input.country_code.as_deref())
        .bind(input.kvk_number.as_deref())
        .bind(input.vat_id.as_deref())
        .bind(input.iban.as_deref())
        .fetch_one(self.get_pool())
        .await?;

        tracing::info!(client_id = client.id, profile_id, "client created");
        Ok(client)
    }

    /// Saves an edit made against `expected_version`.
    ///
    /// Changing KvK number, VAT id or IBAN sends onboarding back to
    /// validation; the reset is recorded like any other workflow event.
    pub async fn update_client(
        &self,
        id: i32,
        expected_version: i32,
        input: &NewClient,
        actor_id: Option<i32>,
    ) -> Result<Client> {
        let mut tx = self.get_pool().begin().await?;
        let current = lock_client(&mut tx, id).await?;
        check_version(&current, Some(expected_version))?;

        let from = WorkflowState::new(current.onboarding_status, current.approval_status);
        let to = if input.changes_identifiers(&current) {
            onboarding::after_identifier_change(from)?
        } else {
            from
        };
        let reset = to != from;

        let updated = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET name = $1, email = $2, phone = $3, address = $4, postal_code = $5, city = $6,
                country_code = COALESCE($7, country_code), kvk_number = $8, vat_id = $9, iban = $10,
                onboarding_status = $11, approval_status = $12,
                confirmation_token_hash = CASE WHEN $13 THEN NULL ELSE confirmation_token_hash END,
                confirmation_expires_at = CASE WHEN $13 THEN NULL ELSE confirmation_expires_at END,
                version = version + 1, updated_at = now()
            WHERE id = $14 AND version = $15
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.phone.as_deref())
        .bind(input.address.as_deref())
        .bind(input.postal_code.as_deref())
        .bind(input.city.as_deref())
        .bind(input.country_code.as_deref())
        .bind(input.kvk_number.as_deref())
        .bind(input.vat_id.as_deref())
        .bind(input.iban.as_deref())
        .bind(to.onboarding)
        .bind(to.approval)
        .bind(reset)
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::conflict(format!("client {id} was modified concurrently")))?;

        if reset {
            let transition = Transition {
                event: "IDENTIFIERS_CHANGED",
                from,
                to,
                reason: None,
            };
            insert_approval(&mut tx, &updated, &transition, actor_id).await?;
            tracing::info!(client_id = id, from = %from.onboarding, "identifiers changed, onboarding restarted");
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Clients with invoices cannot be deleted.
    pub async fn delete_client(&self, id: i32) -> Result<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("client {id}")));
        }
        tracing::info!(client_id = id, "client deleted");
        Ok(())
    }

    // Validation records
    pub async fn record_validation(
        &self,
        client_id: i32,
        report: &ValidationReport,
        performed_by: Option<i32>,
    ) -> Result<ClientValidation> {
        let record = sqlx::query_as::<_, ClientValidation>(
            r#"
            INSERT INTO client_validations (client_id, passed, checks, performed_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(client_id)
        .bind(report.passed)
        .bind(report.to_json())
        .bind(performed_by)
        .fetch_one(self.get_pool())
        .await?;

        Ok(record)
    }

    pub async fn list_validations(&self, client_id: i32) -> Result<Vec<ClientValidation>> {
        let records = sqlx::query_as::<_, ClientValidation>(
            "SELECT * FROM client_validations WHERE client_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(client_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(records)
    }

    pub async fn list_approvals(&self, client_id: i32) -> Result<Vec<ClientApproval>> {
        let records = sqlx::query_as::<_, ClientApproval>(
            "SELECT * FROM client_approvals WHERE client_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(client_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(records)
    }

    // Workflow
    /// Applies an onboarding event under the client's version counter and
    /// records it in the approval log, all in one transaction.
    ///
    /// `expected_version: None` skips the version check; the row lock still
    /// serialises concurrent writers.
    pub async fn transition_client(
        &self,
        client_id: i32,
        expected_version: Option<i32>,
        event: &OnboardingEvent,
        actor_id: Option<i32>,
    ) -> Result<(Client, Transition)> {
        let mut tx = self.get_pool().begin().await?;
        let current = lock_client(&mut tx, client_id).await?;
        check_version(&current, expected_version)?;

        let validation_passed: bool = sqlx::query_scalar(
            "SELECT passed FROM client_validations WHERE client_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(false);

        let state = WorkflowState::new(current.onboarding_status, current.approval_status);
        let transition = onboarding::apply(state, event, Guards { validation_passed })?;

        let (token_hash, token_expires) = match event {
            OnboardingEvent::SendConfirmation { token_hash, expires_at } => {
                (Some(token_hash.as_str()), Some(*expires_at))
            }
            _ => (None, None),
        };

        let updated = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET onboarding_status = $1, approval_status = $2,
                confirmation_token_hash = $3, confirmation_expires_at = $4,
                version = version + 1, updated_at = now()
            WHERE id = $5 AND version = $6
            RETURNING *
            "#,
        )
        .bind(transition.to.onboarding)
        .bind(transition.to.approval)
        .bind(token_hash)
        .bind(token_expires)
        .bind(client_id)
        .bind(current.version)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::conflict(format!("client {client_id} was modified concurrently")))?;

        insert_approval(&mut tx, &updated, &transition, actor_id).await?;
        tx.commit().await?;

        tracing::info!(
            client_id,
            event = transition.event,
            from = %transition.from.onboarding,
            to = %transition.to.onboarding,
            approval = %transition.to.approval,
            "onboarding transition"
        );
        Ok((updated, transition))
    }

    pub async fn find_client_by_confirmation(&self, token_hash: &str) -> Result<Client> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE confirmation_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(self.get_pool())
            .await?
            .ok_or_else(|| Error::not_found("confirmation link"))
    }

    /// Confirms a client through its emailed link.
    pub async fn confirm_client(&self, token_hash: &str) -> Result<Client> {
        let client = self.find_client_by_confirmation(token_hash).await?;
        match client.confirmation_expires_at {
            Some(expires) if expires > Utc::now() => {}
            _ => return Err(Error::Expired("confirmation link".into())),
        }
        let (client, _) = self
            .transition_client(client.id, Some(client.version), &OnboardingEvent::ClientConfirm, None)
            .await?;
        Ok(client)
    }

    /// Clients waiting for an admin decision, oldest first.
    pub async fn review_queue(&self, profile_ids: Option<&[i32]>, limit: i64) -> Result<Vec<ClientSummary>> {
        let rows = sqlx::query_as::<_, ClientSummary>(
            r#"
            SELECT id, profile_id, name, kvk_number, vat_id, onboarding_status, approval_status, version, updated_at
            FROM clients
            WHERE onboarding_status = 'ADMIN_REVIEW' AND ($1::int4[] IS NULL OR profile_id = ANY($1))
            ORDER BY updated_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(profile_ids)
        .bind(limit)
        .fetch_all(self.get_pool())
        .await?;

        Ok(rows)
    }
}
