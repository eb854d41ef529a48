//! Mailgun REST backend
//!
//! Submits mail as a multipart form POST to
//! `/v3/{domain}/messages`, authenticated with HTTP Basic auth
//! (username `api`, password = API key). The reply-to header travels as the
//! `h:Reply-To` form field and each attachment as an `attachment` part.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::email::{EmailError, EmailTransport, OutboundEmail};

const DEFAULT_BASE_URL: &str = "https://api.mailgun.net";

/// Mailgun email backend.
pub struct MailgunBackend {
    api_key: String,
    domain: String,
    timeout: Duration,
    base_url: String,
}

impl MailgunBackend {
    /// Create a new Mailgun backend for the given sending domain.
    #[must_use]
    pub fn new(api_key: String, domain: String, timeout: Duration) -> Self {
        Self {
            api_key,
            domain,
            timeout,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL. Used by tests to point at a local server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Translate the uniform message into the multipart form Mailgun expects.
    fn build_form(email: &OutboundEmail) -> Result<Form, EmailError> {
        email.validate()?;

        let from = email.from.clone().ok_or(EmailError::NoSender)?;
        let subject = email.subject.clone().ok_or(EmailError::NoSubject)?;

        let mut form = Form::new().text("from", from).text("subject", subject);

        for to in &email.to {
            form = form.text("to", to.clone());
        }

        if let Some(html) = &email.html {
            form = form.text("html", html.clone());
        }

        if let Some(text) = &email.text {
            form = form.text("text", text.clone());
        }

        if let Some(reply_to) = &email.reply_to {
            form = form.text("h:Reply-To", reply_to.clone());
        }

        for attachment in &email.attachments {
            let part = Part::bytes(attachment.data.clone())
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.content_type)
                .map_err(|_| {
                    EmailError::config(format!(
                        "invalid attachment content type: {}",
                        attachment.content_type
                    ))
                })?;
            form = form.part("attachment", part);
        }

        Ok(form)
    }
}

#[async_trait]
impl EmailTransport for MailgunBackend {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let form = Self::build_form(&email)?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let response = client
            .post(format!("{}/v3/{}/messages", self.base_url, self.domain))
            .basic_auth("api", Some(&self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::api("mailgun", status, body));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::Attachment;

    #[test]
    fn builds_form_for_complete_email() {
        let email = OutboundEmail::new()
            .to("reviewer@example.com")
            .from("noreply@example.com")
            .reply_to("req-42-0011223344556677@reply.example.com")
            .subject("Test")
            .text("plain")
            .html("<p>html</p>")
            .attach(Attachment {
                filename: "report.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: vec![0x25, 0x50],
            });

        assert!(MailgunBackend::build_form(&email).is_ok());
    }

    #[test]
    fn rejects_incomplete_email() {
        let email = OutboundEmail::new().to("reviewer@example.com");
        assert!(MailgunBackend::build_form(&email).is_err());
    }

    #[test]
    fn rejects_bad_attachment_mime() {
        let email = OutboundEmail::new()
            .to("reviewer@example.com")
            .from("noreply@example.com")
            .subject("Test")
            .text("plain")
            .attach(Attachment {
                filename: "x".to_string(),
                content_type: "???".to_string(),
                data: vec![],
            });
        assert!(matches!(
            MailgunBackend::build_form(&email),
            Err(EmailError::Config(_))
        ));
    }
}
