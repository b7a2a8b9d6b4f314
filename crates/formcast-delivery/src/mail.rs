// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mail delivery — sends the filled PDFs of a request as one message.

use std::path::Path;

use async_trait::async_trait;
use formcast_core::config::SmtpConfig;
use formcast_core::error::FormcastError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

/// One PDF to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A message ready for delivery.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub recipient: String,
    pub attachments: Vec<MailAttachment>,
    /// Extra link offered in the body (e.g. the CAD drawing for the sheets).
    pub secondary_link: Option<String>,
}

/// Something that can deliver an `OutgoingMail`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), FormcastError>;
}

/// Reject recipients that are not a plain `local@domain` address.
pub fn validate_recipient(recipient: &str) -> Result<(), FormcastError> {
    recipient
        .trim()
        .parse::<Address>()
        .map(|_| ())
        .map_err(|e| FormcastError::InvalidRequest(format!("recipientEmail '{recipient}': {e}")))
}

/// Read every `.pdf` file directly inside `dir`, sorted by name.
///
/// Fails when the folder does not exist or holds no PDFs.
pub async fn collect_attachments(dir: &Path) -> Result<Vec<MailAttachment>, FormcastError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        FormcastError::Delivery(format!("PDF folder {} is not readable: {e}", dir.display()))
    })?;

    let mut attachments = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf || !entry.file_type().await?.is_file() {
            continue;
        }
        attachments.push(MailAttachment {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            bytes: tokio::fs::read(&path).await?,
        });
    }

    if attachments.is_empty() {
        return Err(FormcastError::Delivery(format!(
            "no PDF files to send in {}",
            dir.display()
        )));
    }
    attachments.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(attachments)
}

/// SMTP delivery over STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Option<Mailbox>,
    subject: String,
}

impl SmtpMailer {
    /// Prepare the transport. No connection is made until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, FormcastError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| FormcastError::Config(format!("SMTP relay {}: {e}", config.host)))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        let from_address = config.from.as_deref().unwrap_or(&config.username);
        let from = if from_address.is_empty() {
            None
        } else {
            Some(from_address.parse::<Mailbox>().map_err(|e| {
                FormcastError::Config(format!("sender address '{from_address}': {e}"))
            })?)
        };

        Ok(Self {
            transport: builder.build(),
            from,
            subject: config.subject.clone(),
        })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, FormcastError> {
        let from = self
            .from
            .clone()
            .ok_or_else(|| FormcastError::Delivery("no sender address configured".into()))?;
        let to = mail
            .recipient
            .trim()
            .parse::<Mailbox>()
            .map_err(|e| FormcastError::Delivery(format!("recipient '{}': {e}", mail.recipient)))?;
        let pdf = ContentType::parse("application/pdf")
            .map_err(|e| FormcastError::Delivery(format!("content type: {e}")))?;

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(html_body(
            mail.secondary_link.as_deref(),
        )));
        for attachment in &mail.attachments {
            body = body.singlepart(
                Attachment::new(attachment.file_name.clone())
                    .body(attachment.bytes.clone(), pdf.clone()),
            );
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .multipart(body)
            .map_err(|e| FormcastError::Delivery(format!("cannot build message: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip_all, fields(recipient = %mail.recipient, attachments = mail.attachments.len()))]
    async fn send(&self, mail: &OutgoingMail) -> Result<(), FormcastError> {
        let message = self.build_message(mail)?;
        self.transport.send(message).await.map_err(|e| {
            FormcastError::Delivery(format!("failed to send to {}: {e}", mail.recipient))
        })?;
        info!("Mail sent");
        Ok(())
    }
}

fn html_body(secondary_link: Option<&str>) -> String {
    let mut body = String::from("<p>Attached are your processed PDFs.</p>");
    if let Some(link) = secondary_link.filter(|l| !l.trim().is_empty()) {
        body.push_str(&format!(
            "\n<p>You can also\n<a href=\"{}\">\ndownload the drawing file here</a>.</p>",
            escape_html(link.trim())
        ));
    }
    body
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            username: "sheets@example.com".into(),
            password: "app-password".into(),
            ..SmtpConfig::default()
        }
    }

    #[tokio::test]
    async fn missing_folder_is_a_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_attachments(&dir.path().join("gone")).await.unwrap_err();
        assert!(matches!(err, FormcastError::Delivery(_)));
    }

    #[tokio::test]
    async fn folder_without_pdfs_is_a_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        let err = collect_attachments(dir.path()).await.unwrap_err();
        assert!(matches!(err, FormcastError::Delivery(msg) if msg.contains("no PDF")));
    }

    #[tokio::test]
    async fn pdfs_are_collected_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF b").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"%PDF a").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"skip").unwrap();

        let attachments = collect_attachments(dir.path()).await.unwrap();
        let names: Vec<&str> = attachments.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
        assert_eq!(attachments[1].bytes, b"%PDF b");
    }

    #[test]
    fn recipient_validation() {
        assert!(validate_recipient("client@example.com").is_ok());
        assert!(matches!(
            validate_recipient("not-an-address"),
            Err(FormcastError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn message_carries_attachments_and_link() {
        let mailer = SmtpMailer::new(&smtp_config()).unwrap();
        let mail = OutgoingMail {
            recipient: "client@example.com".into(),
            attachments: vec![MailAttachment {
                file_name: "site-plan.pdf".into(),
                bytes: b"%PDF-1.7".to_vec(),
            }],
            secondary_link: Some("https://files.example.com/plan.dwg".into()),
        };

        let formatted = String::from_utf8(mailer.build_message(&mail).unwrap().formatted()).unwrap();
        assert!(formatted.contains("Subject: Your PDFs from FormCast"));
        assert!(formatted.contains("application/pdf"));
        assert!(formatted.contains("site-plan.pdf"));
        assert!(formatted.contains("https://files.example.com/plan.dwg"));
    }

    #[tokio::test]
    async fn missing_sender_fails_at_send_time() {
        let config = SmtpConfig {
            username: String::new(),
            ..smtp_config()
        };
        let mailer = SmtpMailer::new(&config).unwrap();
        let mail = OutgoingMail {
            recipient: "client@example.com".into(),
            attachments: Vec::new(),
            secondary_link: None,
        };
        assert!(matches!(
            mailer.build_message(&mail),
            Err(FormcastError::Delivery(msg)) if msg.contains("sender")
        ));
    }

    #[test]
    fn link_is_escaped() {
        let body = html_body(Some("https://x.example/a?b=1&c=\"2\""));
        assert!(body.contains("a?b=1&amp;c=&quot;2&quot;"));
        assert!(!html_body(Some("  ")).contains("href"));
    }
}
