//! Email error types

use thiserror::Error;

/// Errors that can occur while building or sending an email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// Email has no recipients.
    #[error("email must have at least one recipient")]
    NoRecipients,

    /// Email has no sender.
    #[error("email must have a from address")]
    NoSender,

    /// Email has no subject.
    #[error("email must have a subject")]
    NoSubject,

    /// Email has no body content.
    #[error("email must have either text or HTML content")]
    NoContent,

    /// Invalid email address format.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// REST provider rejected the send.
    #[error("{provider} API error (status {status}): {message}")]
    Api {
        /// Provider name.
        provider: &'static str,
        /// HTTP status returned by the provider.
        status: u16,
        /// Response body or error description.
        message: String,
    },

    /// HTTP client error talking to a REST provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The send did not complete within the per-send timeout.
    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Provider configuration is incomplete for this transport.
    #[error("email configuration error: {0}")]
    Config(String),
}

impl EmailError {
    /// Create an SMTP error from a string message.
    #[must_use]
    pub fn smtp<T: Into<String>>(msg: T) -> Self {
        Self::Smtp(msg.into())
    }

    /// Create a configuration error from a string message.
    #[must_use]
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    /// Create a REST provider error.
    #[must_use]
    pub fn api<T: Into<String>>(provider: &'static str, status: u16, message: T) -> Self {
        Self::Api {
            provider,
            status,
            message: message.into(),
        }
    }
}
