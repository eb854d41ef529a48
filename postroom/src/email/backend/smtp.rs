//! SMTP backend
//!
//! Uses the `lettre` crate to submit mail through a plain SMTP relay.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header, Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpSettings;
use crate::email::{EmailError, EmailTransport, OutboundEmail};

/// SMTP email backend.
///
/// A plain value constructed per send from [`SmtpSettings`]; the underlying
/// transport is built inside [`send`](EmailTransport::send) so no connection
/// state is shared across concurrent callers.
pub struct SmtpBackend {
    settings: SmtpSettings,
    timeout: Duration,
}

impl SmtpBackend {
    /// Create a new SMTP backend.
    #[must_use]
    pub const fn new(settings: SmtpSettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }

    /// Translate the uniform message into a lettre [`Message`].
    fn build_message(email: &OutboundEmail) -> Result<Message, EmailError> {
        email.validate()?;

        let from_addr = email.from.as_ref().ok_or(EmailError::NoSender)?;
        let from: Mailbox = from_addr
            .parse()
            .map_err(|_| EmailError::InvalidAddress(from_addr.clone()))?;

        let mut builder = Message::builder().from(from);

        for to_addr in &email.to {
            let to: Mailbox = to_addr
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to_addr.clone()))?;
            builder = builder.to(to);
        }

        if let Some(reply_to_addr) = &email.reply_to {
            let reply_to: Mailbox = reply_to_addr
                .parse()
                .map_err(|_| EmailError::InvalidAddress(reply_to_addr.clone()))?;
            builder = builder.reply_to(reply_to);
        }

        let subject = email.subject.as_ref().ok_or(EmailError::NoSubject)?;
        builder = builder.subject(subject);

        let body = Self::build_body(email)?;

        if email.attachments.is_empty() {
            builder
                .multipart(body)
                .map_err(|e| EmailError::smtp(e.to_string()))
        } else {
            let mut mixed = MultiPart::mixed().multipart(body);
            for attachment in &email.attachments {
                let content_type = attachment
                    .content_type
                    .parse::<header::ContentType>()
                    .map_err(|_| {
                        EmailError::config(format!(
                            "invalid attachment content type: {}",
                            attachment.content_type
                        ))
                    })?;
                mixed = mixed.singlepart(
                    LettreAttachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            builder
                .multipart(mixed)
                .map_err(|e| EmailError::smtp(e.to_string()))
        }
    }

    fn build_body(email: &OutboundEmail) -> Result<MultiPart, EmailError> {
        match (&email.html, &email.text) {
            (Some(html), Some(text)) => Ok(MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_PLAIN)
                        .body(text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(header::ContentType::TEXT_HTML)
                        .body(html.clone()),
                )),
            (Some(html), None) => Ok(MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(header::ContentType::TEXT_HTML)
                    .body(html.clone()),
            )),
            (None, Some(text)) => Ok(MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(header::ContentType::TEXT_PLAIN)
                    .body(text.clone()),
            )),
            (None, None) => Err(EmailError::NoContent),
        }
    }

    /// Create the SMTP transport for this send.
    fn create_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let credentials = Credentials::new(
            self.settings.username.clone(),
            self.settings.password.clone(),
        );

        let mut transport = if self.settings.use_tls {
            let tls_parameters = TlsParameters::new(self.settings.host.clone())
                .map_err(|e| EmailError::smtp(format!("TLS parameters error: {e}")))?;

            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.host)
                .map_err(|e| EmailError::smtp(e.to_string()))?
                .credentials(credentials)
                .tls(Tls::Required(tls_parameters))
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.settings.host)
                .credentials(credentials)
        };

        transport = transport.port(self.settings.port).timeout(Some(self.timeout));

        Ok(transport.build())
    }
}

#[async_trait]
impl EmailTransport for SmtpBackend {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let message = Self::build_message(&email)?;
        let transport = self.create_transport()?;

        transport
            .send(message)
            .await
            .map_err(|e| EmailError::smtp(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::Attachment;

    fn sample_email() -> OutboundEmail {
        OutboundEmail::new()
            .to("reviewer@example.com")
            .from("noreply@example.com")
            .subject("Test")
            .text("plain body")
    }

    #[test]
    fn builds_simple_message() {
        assert!(SmtpBackend::build_message(&sample_email()).is_ok());
    }

    #[test]
    fn builds_multipart_with_html_and_text() {
        let email = sample_email().html("<p>html body</p>");
        assert!(SmtpBackend::build_message(&email).is_ok());
    }

    #[test]
    fn builds_message_with_reply_to_and_attachment() {
        let email = sample_email()
            .reply_to("req-42-0011223344556677@reply.example.com")
            .attach(Attachment {
                filename: "report.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: vec![0x25, 0x50, 0x44, 0x46],
            });
        assert!(SmtpBackend::build_message(&email).is_ok());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let email = OutboundEmail::new()
            .to("not an address")
            .from("noreply@example.com")
            .subject("Test")
            .text("body");
        assert!(matches!(
            SmtpBackend::build_message(&email),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejects_invalid_attachment_content_type() {
        let email = sample_email().attach(Attachment {
            filename: "x".to_string(),
            content_type: "not a mime type".to_string(),
            data: vec![],
        });
        assert!(matches!(
            SmtpBackend::build_message(&email),
            Err(EmailError::Config(_))
        ));
    }
}
