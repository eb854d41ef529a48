//! Transactional notification composition
//!
//! Builds the two alert emails this subsystem exists for (a new-request
//! notification and a response notification) and submits them through the
//! [`Dispatcher`]. The dispatcher attaches the signed reply-to header, so
//! recipients can answer either alert by ordinary email reply.

use crate::dispatch::{DispatchError, Dispatcher, SendOutcome};
use crate::email::OutboundEmail;
use crate::inbound::RequestSummary;
use crate::queue::Priority;

/// Composes and sends request lifecycle notifications.
#[derive(Debug, Clone)]
pub struct Notifier {
    dispatcher: Dispatcher,
}

impl Notifier {
    /// Create a notifier sending through `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Alert a request's recipients that it was created and awaits them.
    ///
    /// New-request alerts are time-sensitive and queue at high priority when
    /// deferred.
    ///
    /// # Errors
    ///
    /// Propagates [`DispatchError`] from the dispatcher; quota exhaustion is
    /// reported as [`SendOutcome::Deferred`], not an error.
    pub async fn notify_new_request(
        &self,
        request: &RequestSummary,
    ) -> Result<SendOutcome, DispatchError> {
        let subject = format!("New request: {}", request.title);
        let title = escape_html(&request.title);

        let email = OutboundEmail::new()
            .to_all(&request.recipients)
            .subject(&subject)
            .text(&format!(
                "A new request \"{}\" is waiting for you.\n\n\
                 Reply to this email to respond.",
                request.title
            ))
            .html(&format!(
                "<p>A new request <strong>{title}</strong> is waiting for you.</p>\
                 <p>Reply to this email to respond.</p>"
            ));

        self.dispatcher.send(&request.id, email, Priority::High).await
    }

    /// Alert a request's recipients that someone responded.
    ///
    /// # Errors
    ///
    /// Propagates [`DispatchError`] from the dispatcher.
    pub async fn notify_response(
        &self,
        request: &RequestSummary,
        responder: &str,
    ) -> Result<SendOutcome, DispatchError> {
        let subject = format!("New response on: {}", request.title);
        let title = escape_html(&request.title);
        let responder_html = escape_html(responder);

        let email = OutboundEmail::new()
            .to_all(&request.recipients)
            .subject(&subject)
            .text(&format!(
                "{responder} responded to \"{}\".\n\n\
                 Reply to this email to continue the conversation.",
                request.title
            ))
            .html(&format!(
                "<p><strong>{responder_html}</strong> responded to {title}.</p>\
                 <p>Reply to this email to continue the conversation.</p>"
            ));

        self.dispatcher
            .send(&request.id, email, Priority::Normal)
            .await
    }
}

/// Minimal HTML escaping for interpolated user text.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<b>"Q&A"</b>"#),
            "&lt;b&gt;&quot;Q&amp;A&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain title"), "plain title");
    }
}
