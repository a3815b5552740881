use rust_decimal::Decimal;
use serde::Serialize;

use super::Database;
use crate::error::Result;
use crate::models::{ApprovalStatus, ClientSummary, InvoiceStatus, OnboardingStatus};

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct CountByStatus {
    pub status: String,
    pub count: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct AmountByStatus {
    pub status: String,
    pub count: i64,
    pub amount: Decimal,
}

/// Aggregates behind the admin dashboard.
#[derive(Serialize, Debug, Clone)]
pub struct DashboardStats {
    pub clients_by_onboarding: Vec<CountByStatus>,
    pub clients_by_approval: Vec<CountByStatus>,
    pub review_queue: Vec<ClientSummary>,
    pub invoices_by_status: Vec<AmountByStatus>,
    /// Sum of sent and overdue invoice totals.
    pub outstanding: Decimal,
}

/// Lists every label in order, with zero for those without rows.
fn with_zero_counts(labels: &[&str], rows: Vec<CountByStatus>) -> Vec<CountByStatus> {
    labels
        .iter()
        .map(|label| CountByStatus {
            status: label.to_string(),
            count: rows.iter().find(|r| r.status == *label).map_or(0, |r| r.count),
        })
        .collect()
}

fn with_zero_amounts(labels: &[&str], rows: Vec<AmountByStatus>) -> Vec<AmountByStatus> {
    labels
        .iter()
        .map(|label| match rows.iter().find(|r| r.status == *label) {
            Some(row) => row.clone(),
            None => AmountByStatus {
                status: label.to_string(),
                count: 0,
                amount: Decimal::ZERO,
            },
        })
        .collect()
}

impl Database {
    pub async fn dashboard_stats(&self, profile_ids: Option<&[i32]>, queue_limit: i64) -> Result<DashboardStats> {
        let onboarding = sqlx::query_as::<_, CountByStatus>(
            r#"
            SELECT onboarding_status::text AS status, COUNT(*) AS count FROM clients
            WHERE $1::int4[] IS NULL OR profile_id = ANY($1)
            GROUP BY onboarding_status
            "#,
        )
        .bind(profile_ids)
        .fetch_all(self.get_pool())
        .await?;

        let approval = sqlx::query_as::<_, CountByStatus>(
            r#"
            SELECT approval_status::text AS status, COUNT(*) AS count FROM clients
            WHERE $1::int4[] IS NULL OR profile_id = ANY($1)
            GROUP BY approval_status
            "#,
        )
        .bind(profile_ids)
        .fetch_all(self.get_pool())
        .await?;

        let invoices = sqlx::query_as::<_, AmountByStatus>(
            r#"
            SELECT status::text AS status, COUNT(*) AS count, COALESCE(SUM(total), 0) AS amount FROM invoices
            WHERE $1::int4[] IS NULL OR profile_id = ANY($1)
            GROUP BY status
            "#,
        )
        .bind(profile_ids)
        .fetch_all(self.get_pool())
        .await?;

        let review_queue = self.review_queue(profile_ids, queue_limit).await?;

        let onboarding_labels: Vec<&str> = OnboardingStatus::ALL.iter().map(|s| s.as_str()).collect();
        let approval_labels: Vec<&str> = ApprovalStatus::ALL.iter().map(|s| s.as_str()).collect();
        let invoice_labels: Vec<&str> = InvoiceStatus::ALL.iter().map(|s| s.as_str()).collect();

        let outstanding = invoices
            .iter()
            .filter(|row| row.status == InvoiceStatus::Sent.as_str() || row.status == InvoiceStatus::Overdue.as_str())
            .map(|row| row.amount)
            .sum();

        Ok(DashboardStats {
            clients_by_onboarding: with_zero_counts(&onboarding_labels, onboarding),
            clients_by_approval: with_zero_counts(&approval_labels, approval),
            review_queue,
            invoices_by_status: with_zero_amounts(&invoice_labels, invoices),
            outstanding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_statuses_count_as_zero() {
        let rows = vec![CountByStatus { status: "EMAIL_SENT".into(), count: 3 }];
        let labels: Vec<&str> = OnboardingStatus::ALL.iter().map(|s| s.as_str()).collect();
        let filled = with_zero_counts(&labels, rows);
        assert_eq!(filled.len(), 6);
        assert_eq!(filled[0], CountByStatus { status: "PENDING_VALIDATION".into(), count: 0 });
        assert_eq!(filled[1].count, 3);
    }
}
