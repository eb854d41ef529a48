//! Outbound email messages and interchangeable transports
//!
//! This module provides:
//! - A uniform [`OutboundEmail`] message built with a fluent API
//! - The [`EmailTransport`] trait implemented by all backends
//! - Three backends: generic SMTP ([`SmtpBackend`]), Mailgun-style multipart
//!   REST ([`MailgunBackend`]), and Brevo-style JSON REST ([`BrevoBackend`])
//!
//! Backends are plain values constructed per call from a
//! [`ProviderConfig`](crate::config::ProviderConfig); nothing here holds
//! shared mutable client state.
//!
//! # Examples
//!
//! ```rust,no_run
//! use postroom::email::{EmailTransport, OutboundEmail, SmtpBackend};
//! use postroom::config::SmtpSettings;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SmtpBackend::new(
//!     SmtpSettings {
//!         host: "smtp.example.com".to_string(),
//!         port: 587,
//!         username: "mailer".to_string(),
//!         password: "hunter2".to_string(),
//!         use_tls: true,
//!     },
//!     Duration::from_secs(30),
//! );
//!
//! let email = OutboundEmail::new()
//!     .to("reviewer@example.com")
//!     .from("noreply@example.com")
//!     .subject("New request")
//!     .text("A new request is waiting for you.");
//!
//! backend.send(email).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod builder;
mod error;
mod sender;

pub use backend::{transport_for, BrevoBackend, MailgunBackend, SmtpBackend};
pub use builder::{Attachment, OutboundEmail};
pub use error::EmailError;
pub use sender::EmailTransport;
