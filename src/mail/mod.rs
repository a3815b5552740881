//! Outgoing mail: confirmation links, signing requests and invoices.
//!
//! Without an SMTP host the mailer only logs what it would have sent.

use lettre::message::{header, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Client, Document, Invoice, Profile};

/// Whether a mail that follows a committed change went out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub mail_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_error: Option<String>,
}

impl From<Result<()>> for Delivery {
    fn from(outcome: Result<()>) -> Self {
        match outcome {
            Ok(()) => Self { mail_sent: true, mail_error: None },
            Err(e) => Self { mail_sent: false, mail_error: Some(e.to_string()) },
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub mime: mime::Mime,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<OutgoingAttachment>,
}

impl OutgoingMail {
    fn build(&self, from: &Mailbox) -> Result<Message> {
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|e| Error::Mail(format!("invalid recipient {}: {e}", self.to)))?;
        let builder = Message::builder().from(from.clone()).to(to).subject(&self.subject);

        let message = match &self.attachment {
            None => builder
                .header(header::ContentType::TEXT_PLAIN)
                .body(self.body.clone()),
            Some(attachment) => {
                let content_type = header::ContentType::parse(attachment.mime.as_ref())
                    .map_err(|e| Error::Mail(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(self.body.clone()))
                        .singlepart(
                            Attachment::new(attachment.filename.clone()).body(attachment.content.clone(), content_type),
                        ),
                )
            }
        };
        message.map_err(|e| Error::Mail(e.to_string()))
    }
}

pub fn confirmation_mail(client: &Client, profile: &Profile, link: &str) -> OutgoingMail {
    OutgoingMail {
        to: client.email.clone(),
        subject: format!("Bevestig uw gegevens voor {}", profile.name),
        body: format!(
            "Beste {},\n\n\
             {} wil u als opdrachtgever registreren. Controleer uw bedrijfsgegevens en bevestig ze via:\n\n\
             {link}\n\n\
             De link is 7 dagen geldig.\n\n\
             Met vriendelijke groet,\n{}",
            client.name, profile.name, profile.name
        ),
        attachment: None,
    }
}

pub fn signing_mail(document: &Document, client: &Client, profile: &Profile, link: &str) -> OutgoingMail {
    OutgoingMail {
        to: client.email.clone(),
        subject: format!("Ter ondertekening: {}", document.title),
        body: format!(
            "Beste {},\n\n\
             {} vraagt u het document \"{}\" te ondertekenen:\n\n\
             {link}\n\n\
             Controlecode van het document: {}\n\
             De link is 14 dagen geldig.\n\n\
             Met vriendelijke groet,\n{}",
            client.name, profile.name, document.title, document.content_sha256, profile.name
        ),
        attachment: None,
    }
}

pub fn invoice_mail(invoice: &Invoice, client: &Client, profile: &Profile, file: OutgoingAttachment) -> OutgoingMail {
    OutgoingMail {
        to: client.email.clone(),
        subject: format!("Factuur {} van {}", invoice.number, profile.name),
        body: format!(
            "Beste {},\n\n\
             Bijgaand ontvangt u factuur {} ter hoogte van EUR {:.2}.\n\
             Wij verzoeken u het bedrag voor {} over te maken op {} t.n.v. {}, onder vermelding van het factuurnummer.\n\n\
             Met vriendelijke groet,\n{}",
            client.name,
            invoice.number,
            invoice.total,
            invoice.due_date.format("%d-%m-%Y"),
            crate::validation::format::format_iban(&profile.iban),
            profile.name,
            profile.name
        ),
        attachment: Some(file),
    }
}

#[derive(Clone)]
pub struct Mailer {
    from: Mailbox,
    transport: Option<SmtpTransport>,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Result<Self> {
        let from: Mailbox = config
            .mail_from
            .parse()
            .map_err(|e| Error::Mail(format!("invalid MAIL_FROM: {e}")))?;

        let transport = match config.smtp_host.as_deref().filter(|h| !h.is_empty()) {
            None => {
                tracing::warn!("SMTP_HOST not set, mail will only be logged");
                None
            }
            Some(host) => {
                let mut builder = SmtpTransport::relay(host).map_err(|e| Error::Mail(e.to_string()))?;
                if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                Some(builder.build())
            }
        };

        Ok(Self { from, transport })
    }

    /// A mailer that never connects anywhere.
    pub fn log_only(from: Mailbox) -> Self {
        Self { from, transport: None }
    }

    pub fn is_log_only(&self) -> bool {
        self.transport.is_none()
    }

    pub async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let message = mail.build(&self.from)?;

        let Some(transport) = self.transport.clone() else {
            tracing::info!(to = %mail.to, subject = %mail.subject, "mail not sent (log only)");
            tracing::debug!(body = %mail.body, "mail body");
            return Ok(());
        };

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| Error::Mail(e.to_string()))?
            .map_err(|e| Error::Mail(e.to_string()))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::validation::tests::sample_client;

    fn profile() -> Profile {
        Profile {
            id: 1,
            name: "Jansen Webdesign".into(),
            email: "jan@jansen.nl".into(),
            phone: None,
            address: None,
            postal_code: None,
            city: None,
            kvk_number: "69241327".into(),
            vat_id: "NL004495445B01".into(),
            iban: "NL91ABNA0417164300".into(),
            bic: None,
            default_payment_term: Default::default(),
            invoice_prefix: String::new(),
            created_at: chrono::Utc::now(),
        }
    }

    fn from() -> Mailbox {
        "Facturen <facturen@example.nl>".parse().unwrap()
    }

    #[test]
    fn failed_delivery_keeps_the_error() {
        let sent = Delivery::from(Ok::<_, Error>(()));
        assert!(sent.mail_sent);
        assert_eq!(serde_json::to_value(&sent).unwrap(), serde_json::json!({ "mail_sent": true }));

        let failed = Delivery::from(Err::<(), _>(Error::Mail("connection refused".into())));
        assert!(!failed.mail_sent);
        assert!(failed.mail_error.as_deref().unwrap().contains("connection refused"));
    }

    #[test]
    fn confirmation_mail_carries_the_link() {
        let mail = confirmation_mail(&sample_client(), &profile(), "https://zzp.example/confirm/abc");
        assert_eq!(mail.to, "info@bakkerijdevries.nl");
        assert!(mail.body.contains("https://zzp.example/confirm/abc"));
        let message = mail.build(&from()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: info@bakkerijdevries.nl"));
    }

    #[test]
    fn attachments_become_multipart() {
        let mut mail = confirmation_mail(&sample_client(), &profile(), "x");
        mail.attachment = Some(OutgoingAttachment {
            filename: "factuur_2026-0001.pdf".into(),
            content: b"%PDF-1.4".to_vec(),
            mime: mime::APPLICATION_PDF,
        });
        let raw = String::from_utf8(mail.build(&from()).unwrap().formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("factuur_2026-0001.pdf"));
    }

    #[test]
    fn bad_recipients_are_reported() {
        let mut mail = confirmation_mail(&sample_client(), &profile(), "x");
        mail.to = "not an address".into();
        assert!(matches!(mail.build(&from()), Err(Error::Mail(_))));
    }

    #[tokio::test]
    async fn log_only_mailer_accepts_mail() {
        let mailer = Mailer::log_only(from());
        assert!(mailer.is_log_only());
        let mail = confirmation_mail(&sample_client(), &profile(), "x");
        mailer.send(mail).await.unwrap();
    }
}
