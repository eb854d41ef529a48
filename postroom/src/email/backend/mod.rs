//! Outbound transport backends
//!
//! One submodule per provider. [`transport_for`] builds the backend value
//! matching a [`ProviderConfig`]; backends are constructed fresh per call and
//! hold no shared mutable state.

pub mod brevo;
pub mod mailgun;
pub mod smtp;

use std::time::Duration;

pub use brevo::BrevoBackend;
pub use mailgun::MailgunBackend;
pub use smtp::SmtpBackend;

use super::{EmailError, EmailTransport};
use crate::config::{ProviderConfig, ProviderKind};

/// Build the transport for the given provider configuration.
///
/// # Errors
///
/// Returns [`EmailError::Config`] if the configuration is missing the
/// credentials its kind requires.
pub fn transport_for(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Box<dyn EmailTransport>, EmailError> {
    match config.kind {
        ProviderKind::Smtp => {
            let settings = config
                .smtp
                .clone()
                .ok_or_else(|| EmailError::config("smtp provider requires [providers.smtp] settings"))?;
            Ok(Box::new(SmtpBackend::new(settings, timeout)))
        }
        ProviderKind::Mailgun => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| EmailError::config("mailgun provider requires an api_key"))?;
            Ok(Box::new(MailgunBackend::new(
                api_key,
                config.sending_domain.clone(),
                timeout,
            )))
        }
        ProviderKind::Brevo => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| EmailError::config("brevo provider requires an api_key"))?;
            Ok(Box::new(BrevoBackend::new(api_key, timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn base_config(kind: ProviderKind) -> ProviderConfig {
        ProviderConfig {
            kind,
            enabled: true,
            from_address: "noreply@example.com".to_string(),
            sending_domain: "mg.example.com".to_string(),
            reply_domain: "reply.example.com".to_string(),
            signing_secret: "secret".to_string(),
            daily_limit: None,
            api_key: None,
            smtp: None,
        }
    }

    #[test]
    fn rest_backends_require_api_key() {
        let timeout = Duration::from_secs(5);
        assert!(matches!(
            transport_for(&base_config(ProviderKind::Mailgun), timeout),
            Err(EmailError::Config(_))
        ));
        assert!(matches!(
            transport_for(&base_config(ProviderKind::Brevo), timeout),
            Err(EmailError::Config(_))
        ));
    }

    #[test]
    fn smtp_backend_requires_relay_settings() {
        assert!(matches!(
            transport_for(&base_config(ProviderKind::Smtp), Duration::from_secs(5)),
            Err(EmailError::Config(_))
        ));
    }

    #[test]
    fn configured_backends_are_constructed() {
        let timeout = Duration::from_secs(5);

        let mut mailgun = base_config(ProviderKind::Mailgun);
        mailgun.api_key = Some("key-test".to_string());
        assert!(transport_for(&mailgun, timeout).is_ok());

        let mut brevo = base_config(ProviderKind::Brevo);
        brevo.api_key = Some("xkeysib-test".to_string());
        assert!(transport_for(&brevo, timeout).is_ok());

        let mut smtp = base_config(ProviderKind::Smtp);
        smtp.smtp = Some(crate::config::SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "hunter2".to_string(),
            use_tls: true,
        });
        assert!(transport_for(&smtp, timeout).is_ok());
    }
}
