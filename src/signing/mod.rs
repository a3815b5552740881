//! Rules for documents sent to clients for e-signature.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{ApprovalStatus, Client, Document, DocumentStatus};

pub const SIGNING_TTL_DAYS: i64 = 14;

pub fn signing_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(SIGNING_TTL_DAYS)
}

pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub client_id: i32,
    pub title: String,
    pub content: String,
}

impl NewDocument {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("document title is required"));
        }
        if self.content.trim().is_empty() {
            return Err(Error::validation("document content is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignRequest {
    pub signer_name: String,
    /// Hash of the content the signer was shown.
    pub content_sha256: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeclineRequest {
    pub reason: Option<String>,
}

/// A draft may be sent to an approved client. A sent document that has not
/// been answered may be sent again with a fresh link.
pub fn check_sendable(document: &Document, client: &Client) -> Result<()> {
    if document.client_id != client.id {
        return Err(Error::validation("document belongs to another client"));
    }
    if !matches!(document.status, DocumentStatus::Draft | DocumentStatus::Sent) {
        return Err(Error::conflict(format!("document is already {}", document.status)));
    }
    if client.approval_status != ApprovalStatus::Approved {
        return Err(Error::validation(format!(
            "documents can only be sent to approved clients; {} is {}",
            client.name, client.approval_status
        )));
    }
    if client.email.trim().is_empty() {
        return Err(Error::validation("client has no email address"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Open,
    Expired,
}

/// Whether a signing link can still be used.
///
/// Links of documents that were already answered are refused outright;
/// an expired link on a sent document reports [`LinkState::Expired`] so the
/// caller can record the expiry.
pub fn link_state(document: &Document, now: DateTime<Utc>) -> Result<LinkState> {
    match document.status {
        DocumentStatus::Sent => {}
        DocumentStatus::Expired => return Err(Error::Expired("signing link".into())),
        other => return Err(Error::conflict(format!("document is {other}"))),
    }
    match document.signing_expires_at {
        Some(expires) if expires > now => Ok(LinkState::Open),
        _ => Ok(LinkState::Expired),
    }
}

/// Checks a signature against the stored document and returns the signer's name.
pub fn check_signature(document: &Document, request: &SignRequest) -> Result<String> {
    let name = request.signer_name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return Err(Error::validation("signer name is required"));
    }
    if !request.content_sha256.trim().eq_ignore_ascii_case(&document.content_sha256) {
        return Err(Error::conflict("document content changed since it was shown"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::OnboardingStatus;
    use crate::validation::tests::sample_client;

    fn document(status: DocumentStatus, expires_in: Option<Duration>) -> Document {
        let content = b"Opdrachtbevestiging: 40 uur webontwikkeling".to_vec();
        Document {
            id: 3,
            client_id: 7,
            title: "Opdrachtbevestiging".into(),
            content_sha256: content_hash(&content),
            content,
            status,
            signer_email: Some("info@bakkerijdevries.nl".into()),
            signing_token_hash: Some("hash".into()),
            signing_expires_at: expires_in.map(|d| Utc::now() + d),
            signer_name: None,
            signer_address: None,
            decline_reason: None,
            sent_at: None,
            signed_at: None,
            declined_at: None,
            created_at: Utc::now(),
        }
    }

    fn approved_client() -> Client {
        let mut client = sample_client();
        client.onboarding_status = OnboardingStatus::Approved;
        client.approval_status = ApprovalStatus::Approved;
        client
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn only_approved_clients_receive_documents() {
        let doc = document(DocumentStatus::Draft, None);
        assert!(check_sendable(&doc, &approved_client()).is_ok());
        assert!(matches!(check_sendable(&doc, &sample_client()), Err(Error::Validation(_))));
    }

    #[test]
    fn unanswered_documents_can_be_sent_again() {
        let sent = document(DocumentStatus::Sent, Some(Duration::days(1)));
        assert!(check_sendable(&sent, &approved_client()).is_ok());
        let lapsed = document(DocumentStatus::Sent, Some(Duration::days(-1)));
        assert!(check_sendable(&lapsed, &approved_client()).is_ok());

        for status in [DocumentStatus::Signed, DocumentStatus::Declined, DocumentStatus::Expired] {
            let answered = document(status, Some(Duration::days(1)));
            assert!(matches!(check_sendable(&answered, &approved_client()), Err(Error::Conflict(_))), "{status}");
        }
    }

    #[test]
    fn links_expire() {
        let open = document(DocumentStatus::Sent, Some(Duration::days(3)));
        assert_eq!(link_state(&open, Utc::now()).unwrap(), LinkState::Open);
        let stale = document(DocumentStatus::Sent, Some(Duration::seconds(-1)));
        assert_eq!(link_state(&stale, Utc::now()).unwrap(), LinkState::Expired);
        let expired = document(DocumentStatus::Expired, None);
        assert!(matches!(link_state(&expired, Utc::now()), Err(Error::Expired(_))));
        let signed = document(DocumentStatus::Signed, Some(Duration::days(3)));
        assert!(matches!(link_state(&signed, Utc::now()), Err(Error::Conflict(_))));
    }

    #[test]
    fn signature_must_match_the_shown_content() {
        let doc = document(DocumentStatus::Sent, Some(Duration::days(3)));
        let ok = SignRequest {
            signer_name: "  Piet   de Vries ".into(),
            content_sha256: doc.content_sha256.to_uppercase(),
        };
        assert_eq!(check_signature(&doc, &ok).unwrap(), "Piet de Vries");

        let tampered = SignRequest {
            signer_name: "Piet".into(),
            content_sha256: content_hash(b"something else"),
        };
        assert!(matches!(check_signature(&doc, &tampered), Err(Error::Conflict(_))));

        let anonymous = SignRequest {
            signer_name: " ".into(),
            content_sha256: doc.content_sha256.clone(),
        };
        assert!(check_signature(&doc, &anonymous).is_err());
    }

    #[test]
    fn new_documents_need_title_and_content() {
        let doc = NewDocument { client_id: 1, title: " ".into(), content: "x".into() };
        assert!(doc.validate().is_err());
        let doc = NewDocument { client_id: 1, title: "NDA".into(), content: "text".into() };
        assert!(doc.validate().is_ok());
    }
}
