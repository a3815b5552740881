use chrono::{DateTime, Utc};

use super::Database;
use crate::error::{Error, Result};
use crate::invoicing;
use crate::models::{NewProfile, Profile, Role, Session, User, UserRole};
use crate::validation::format;

impl Database {
    /// Identifiers are validated; a sender's invoices must carry valid ones.
    pub async fn create_profile(&self, input: &NewProfile) -> Result<Profile> {
        let field = |name: &str, e: format::FormatError| Error::validation(format!("{name}: {e}"));
        let kvk = format::validate_kvk_number(&input.kvk_number).map_err(|e| field("kvk_number", e))?;
        let vat = format::validate_vat_id(&input.vat_id).map_err(|e| field("vat_id", e))?;
        let iban = format::validate_iban(&input.iban).map_err(|e| field("iban", e))?;
        let email = format::validate_email(&input.email).map_err(|e| field("email", e))?;
        let prefix = input.invoice_prefix.as_deref().map(invoicing::validate_invoice_prefix).transpose()?;

        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles
                (name, email, phone, address, postal_code, city, kvk_number, vat_id, iban, bic,
                 default_payment_term, invoice_prefix)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, 'DAYS30'), COALESCE($12, ''))
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(email)
        .bind(input.phone.as_deref())
        .bind(input.address.as_deref())
        .bind(input.postal_code.as_deref())
        .bind(input.city.as_deref())
        .bind(kvk)
        .bind(vat)
        .bind(iban)
        .bind(input.bic.as_deref())
        .bind(input.default_payment_term)
        .bind(prefix)
        .fetch_one(self.get_pool())
        .await?;

        tracing::info!(profile_id = profile.id, "profile created");
        Ok(profile)
    }

    // User operations
    pub async fn create_user(&self, email: &str, display_name: &str, password_hash: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, display_name, password_hash) VALUES (lower($1), $2, $3) RETURNING *",
        )
        .bind(email.trim())
        .bind(display_name.trim())
        .bind(password_hash)
        .fetch_one(self.get_pool())
        .await?;

        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = lower($1)")
            .bind(email.trim())
            .fetch_optional(self.get_pool())
            .await?;

        Ok(user)
    }

    pub async fn assign_role(
        &self,
        user_id: i32,
        role: Role,
        profile_id: Option<i32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<UserRole> {
        let assignment = sqlx::query_as::<_, UserRole>(
            "INSERT INTO user_roles (user_id, role, profile_id, expires_at) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(user_id)
        .bind(role)
        .bind(profile_id)
        .bind(expires_at)
        .fetch_one(self.get_pool())
        .await?;

        Ok(assignment)
    }

    pub async fn roles_for_user(&self, user_id: i32) -> Result<Vec<UserRole>> {
        let roles = sqlx::query_as::<_, UserRole>("SELECT * FROM user_roles WHERE user_id = $1 ORDER BY id")
            .bind(user_id)
            .fetch_all(self.get_pool())
            .await?;

        Ok(roles)
    }

    // Sessions
    pub async fn create_session(&self, user_id: i32, token_hash: &str, expires_at: DateTime<Utc>) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(self.get_pool())
        .await?;

        Ok(session)
    }

    /// The user owning an unexpired session.
    pub async fn session_user(&self, token_hash: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM sessions s JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1 AND s.expires_at > now()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(user)
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected())
    }
}
