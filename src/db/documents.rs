use chrono::{DateTime, Utc};

use super::Database;
use crate::error::{Error, Result};
use crate::models::Document;
use crate::signing::{self, NewDocument};

impl Database {
    // Document operations
    pub async fn create_document(&self, input: &NewDocument) -> Result<Document> {
        let content = input.content.as_bytes();
        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (client_id, title, content, content_sha256)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(input.client_id)
        .bind(input.title.trim())
        .bind(content)
        .bind(signing::content_hash(content))
        .fetch_one(self.get_pool())
        .await?;

        tracing::info!(document_id = document.id, client_id = document.client_id, "document created");
        Ok(document)
    }

    pub async fn get_document(&self, id: i32) -> Result<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?
            .ok_or_else(|| Error::not_found(format!("document {id}")))
    }

    pub async fn find_document_by_token(&self, token_hash: &str) -> Result<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE signing_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(self.get_pool())
            .await?
            .ok_or_else(|| Error::not_found("signing link"))
    }

    /// Moves a draft or unanswered document to SENT with a fresh signing token.
    pub async fn mark_document_sent(
        &self,
        id: i32,
        signer_email: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Document> {
        sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET status = 'SENT', signer_email = $1, signing_token_hash = $2, signing_expires_at = $3, sent_at = now()
            WHERE id = $4 AND status IN ('DRAFT', 'SENT')
            RETURNING *
            "#,
        )
        .bind(signer_email)
        .bind(token_hash)
        .bind(expires_at)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?
        .ok_or_else(|| Error::conflict(format!("document {id} was answered or expired")))
    }

    pub async fn mark_document_expired(&self, id: i32) -> Result<()> {
        sqlx::query("UPDATE documents SET status = 'EXPIRED' WHERE id = $1 AND status = 'SENT'")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        tracing::info!(document_id = id, "signing link expired");
        Ok(())
    }

    pub async fn sign_document(&self, id: i32, signer_name: &str, signer_address: Option<&str>) -> Result<Document> {
        sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET status = 'SIGNED', signer_name = $1, signer_address = $2, signed_at = now()
            WHERE id = $3 AND status = 'SENT'
            RETURNING *
            "#,
        )
        .bind(signer_name)
        .bind(signer_address)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?
        .ok_or_else(|| Error::conflict(format!("document {id} is no longer awaiting a signature")))
    }

    pub async fn decline_document(&self, id: i32, reason: Option<&str>) -> Result<Document> {
        sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET status = 'DECLINED', decline_reason = $1, declined_at = now()
            WHERE id = $2 AND status = 'SENT'
            RETURNING *
            "#,
        )
        .bind(reason)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?
        .ok_or_else(|| Error::conflict(format!("document {id} is no longer awaiting a signature")))
    }
}
