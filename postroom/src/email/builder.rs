//! Email builder with fluent API

use serde::{Deserialize, Serialize};

use super::EmailError;

/// A file attached to an outbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,

    /// MIME type of the content.
    pub content_type: String,

    /// Raw file bytes.
    pub data: Vec<u8>,
}

/// A uniform outbound email message.
///
/// Every transport receives this shape and translates it into its own wire
/// format. Use the builder pattern to construct messages:
///
/// ```rust
/// use postroom::email::OutboundEmail;
///
/// let email = OutboundEmail::new()
///     .to("reviewer@example.com")
///     .from("noreply@example.com")
///     .subject("New request")
///     .text("A new request is waiting for you.")
///     .html("<p>A new request is waiting for you.</p>");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundEmail {
    /// Recipients (To).
    pub to: Vec<String>,

    /// Sender (From).
    pub from: Option<String>,

    /// Reply-To address; carries the signed reply token when set by the
    /// dispatcher.
    pub reply_to: Option<String>,

    /// Subject line.
    pub subject: Option<String>,

    /// Plain text body.
    pub text: Option<String>,

    /// HTML body.
    pub html: Option<String>,

    /// File attachments.
    pub attachments: Vec<Attachment>,
}

impl OutboundEmail {
    /// Create a new empty email.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipient.
    #[must_use]
    pub fn to(mut self, address: &str) -> Self {
        self.to.push(address.to_string());
        self
    }

    /// Add multiple recipients.
    #[must_use]
    pub fn to_all<S: AsRef<str>>(mut self, addresses: &[S]) -> Self {
        for address in addresses {
            self.to.push(address.as_ref().to_string());
        }
        self
    }

    /// Set the sender.
    #[must_use]
    pub fn from(mut self, address: &str) -> Self {
        self.from = Some(address.to_string());
        self
    }

    /// Set the reply-to address.
    #[must_use]
    pub fn reply_to(mut self, address: &str) -> Self {
        self.reply_to = Some(address.to_string());
        self
    }

    /// Set the subject.
    #[must_use]
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Set the plain text body.
    #[must_use]
    pub fn text(mut self, body: &str) -> Self {
        self.text = Some(body.to_string());
        self
    }

    /// Set the HTML body.
    #[must_use]
    pub fn html(mut self, body: &str) -> Self {
        self.html = Some(body.to_string());
        self
    }

    /// Attach a file.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Validate that all required fields are present.
    ///
    /// # Errors
    ///
    /// Returns an error if the email has no recipients, no sender, no
    /// subject, or no body content.
    pub fn validate(&self) -> Result<(), EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }

        if self.from.is_none() {
            return Err(EmailError::NoSender);
        }

        if self.subject.is_none() {
            return Err(EmailError::NoSubject);
        }

        if self.text.is_none() && self.html.is_none() {
            return Err(EmailError::NoContent);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let email = OutboundEmail::new()
            .to("reviewer@example.com")
            .from("noreply@example.com")
            .reply_to("req-42-abc@reply.example.com")
            .subject("Test")
            .text("Hello");

        assert_eq!(email.to, vec!["reviewer@example.com"]);
        assert_eq!(email.from, Some("noreply@example.com".to_string()));
        assert_eq!(
            email.reply_to,
            Some("req-42-abc@reply.example.com".to_string())
        );
        assert_eq!(email.subject, Some("Test".to_string()));
        assert_eq!(email.text, Some("Hello".to_string()));
    }

    #[test]
    fn validation_requires_recipients() {
        let email = OutboundEmail::new()
            .from("noreply@example.com")
            .subject("Test")
            .text("Hello");

        assert!(matches!(email.validate(), Err(EmailError::NoRecipients)));
    }

    #[test]
    fn validation_requires_sender() {
        let email = OutboundEmail::new()
            .to("reviewer@example.com")
            .subject("Test")
            .text("Hello");

        assert!(matches!(email.validate(), Err(EmailError::NoSender)));
    }

    #[test]
    fn validation_requires_subject() {
        let email = OutboundEmail::new()
            .to("reviewer@example.com")
            .from("noreply@example.com")
            .text("Hello");

        assert!(matches!(email.validate(), Err(EmailError::NoSubject)));
    }

    #[test]
    fn validation_requires_content() {
        let email = OutboundEmail::new()
            .to("reviewer@example.com")
            .from("noreply@example.com")
            .subject("Test");

        assert!(matches!(email.validate(), Err(EmailError::NoContent)));
    }

    #[test]
    fn validation_accepts_complete_email() {
        let email = OutboundEmail::new()
            .to("reviewer@example.com")
            .from("noreply@example.com")
            .subject("Test")
            .html("<p>Hello</p>");

        assert!(email.validate().is_ok());
    }

    #[test]
    fn to_all_appends_every_address() {
        let email = OutboundEmail::new().to_all(&["a@example.com", "b@example.com"]);
        assert_eq!(email.to.len(), 2);
    }

    #[test]
    fn attachments_accumulate() {
        let email = OutboundEmail::new().attach(Attachment {
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: vec![1, 2, 3],
        });
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "report.pdf");
    }
}
