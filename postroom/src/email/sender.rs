//! Transport trait abstraction
//!
//! This module defines the [`EmailTransport`] trait that all outbound
//! backends implement.

use async_trait::async_trait;

use super::{EmailError, OutboundEmail};

/// Trait for delivering a single email through a provider.
///
/// Implemented by all backends (SMTP, Mailgun, Brevo) and by test doubles.
/// Implementations perform exactly one network submission; they do not retry
/// and they do not mutate the message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Deliver an email.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] if the message is invalid or the provider
    /// rejects the submission.
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError>;
}
