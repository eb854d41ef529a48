//! Inbound webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the `timestamp`/`token`/`signature` triple providers attach to
/// inbound webhook calls.
///
/// The expected signature is `HMAC_SHA256(secret, timestamp || token)`,
/// hex-encoded. Comparison is constant-time; timing-attack resistance is a
/// requirement here, not an optimization.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    /// Create a verifier for the given signing secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check a supplied signature.
    ///
    /// Returns `false` (never panics or errors) for a missing secret,
    /// malformed hex, or a mismatch, so misconfiguration rejects webhooks
    /// instead of crashing ingestion.
    #[must_use]
    pub fn verify(&self, timestamp: &str, token: &str, signature: &str) -> bool {
        if self.secret.is_empty() {
            return false;
        }

        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(token.as_bytes());
        let computed = mac.finalize().into_bytes();

        let Ok(supplied) = hex::decode(signature) else {
            return false;
        };
        if supplied.len() != computed.len() {
            return false;
        }

        bool::from(computed.as_slice().ct_eq(supplied.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::webhook_signature;

    #[test]
    fn accepts_signature_from_matching_secret() {
        let verifier = WebhookVerifier::new("whsec_test");
        let signature = webhook_signature("whsec_test", "1700000000", "nonce-1");
        assert!(verifier.verify("1700000000", "nonce-1", &signature));
    }

    #[test]
    fn rejects_signature_from_wrong_secret() {
        let verifier = WebhookVerifier::new("whsec_test");
        let signature = webhook_signature("other-secret", "1700000000", "nonce-1");
        assert!(!verifier.verify("1700000000", "nonce-1", &signature));
    }

    #[test]
    fn rejects_replayed_signature_with_altered_material() {
        let verifier = WebhookVerifier::new("whsec_test");
        let signature = webhook_signature("whsec_test", "1700000000", "nonce-1");
        assert!(!verifier.verify("1700000001", "nonce-1", &signature));
        assert!(!verifier.verify("1700000000", "nonce-2", &signature));
    }

    #[test]
    fn rejects_when_secret_is_missing() {
        let verifier = WebhookVerifier::new("");
        let signature = webhook_signature("", "1700000000", "nonce-1");
        assert!(!verifier.verify("1700000000", "nonce-1", &signature));
    }

    #[test]
    fn rejects_malformed_signatures() {
        let verifier = WebhookVerifier::new("whsec_test");
        assert!(!verifier.verify("1700000000", "nonce-1", "not hex"));
        assert!(!verifier.verify("1700000000", "nonce-1", "abcd"));
        assert!(!verifier.verify("1700000000", "nonce-1", ""));
    }
}
