//! Brevo REST backend
//!
//! Submits mail as a JSON POST to `/v3/smtp/email`, authenticated with the
//! `api-key` header. Recipients travel as `to: [{email}]`, bodies as
//! `htmlContent`/`textContent`, and the reply address as `replyTo: {email}`.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use crate::email::{EmailError, EmailTransport, OutboundEmail};

const DEFAULT_BASE_URL: &str = "https://api.brevo.com";

#[derive(Debug, Serialize)]
struct AddressPayload {
    email: String,
}

#[derive(Debug, Serialize)]
struct AttachmentPayload {
    name: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct SendPayload {
    sender: AddressPayload,
    to: Vec<AddressPayload>,
    subject: String,
    #[serde(rename = "htmlContent", skip_serializing_if = "Option::is_none")]
    html_content: Option<String>,
    #[serde(rename = "textContent", skip_serializing_if = "Option::is_none")]
    text_content: Option<String>,
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    reply_to: Option<AddressPayload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachment: Vec<AttachmentPayload>,
}

/// Brevo email backend.
pub struct BrevoBackend {
    api_key: String,
    timeout: Duration,
    base_url: String,
}

impl BrevoBackend {
    /// Create a new Brevo backend.
    #[must_use]
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            api_key,
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

    /// Translate the uniform message into Brevo's JSON shape.
    fn build_payload(email: &OutboundEmail) -> Result<SendPayload, EmailError> {
        email.validate()?;

        let sender = email.from.clone().ok_or(EmailError::NoSender)?;
        let subject = email.subject.clone().ok_or(EmailError::NoSubject)?;

        Ok(SendPayload {
            sender: AddressPayload { email: sender },
            to: email
                .to
                .iter()
                .map(|address| AddressPayload {
                    email: address.clone(),
                })
                .collect(),
            subject,
            html_content: email.html.clone(),
            text_content: email.text.clone(),
            reply_to: email.reply_to.clone().map(|email| AddressPayload { email }),
            attachment: email
                .attachments
                .iter()
                .map(|attachment| AttachmentPayload {
                    name: attachment.filename.clone(),
                    content: BASE64.encode(&attachment.data),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl EmailTransport for BrevoBackend {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let payload = Self::build_payload(&email)?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let response = client
            .post(format!("{}/v3/smtp/email", self.base_url))
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::api("brevo", status, body));
        }

        Ok(())
    }
}
