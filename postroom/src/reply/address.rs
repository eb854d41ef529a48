//! Signed reply address generation and validation

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Width of a token time bucket in seconds.
///
/// Tokens are derived from the floor-to-minute of the generation time, so a
/// verifier only needs to know the address was generated "recently", not the
/// exact timestamp.
pub const TOKEN_BUCKET_SECS: i64 = 60;

/// How many immediately preceding buckets a verifier accepts in addition to
/// the current one. Bounds how stale a reply address may be while still
/// validating; replies arriving after the window are expected to fail.
pub const TOKEN_BACKWARD_TOLERANCE: i64 = 5;

/// Length of the hex-encoded token embedded in the address.
const TOKEN_HEX_LEN: usize = 16;

/// Errors raised while generating a reply address.
#[derive(Debug, Error)]
pub enum ReplyAddressError {
    /// The signing secret was rejected by the MAC implementation.
    #[error("invalid reply signing secret")]
    InvalidSecret,
}

/// A successfully validated reply address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// The request identifier the reply belongs to.
    pub request_id: String,
}

/// Generates and validates signed reply-to addresses.
///
/// Addresses have the shape `req-<request-id>-<16 hex chars>@<reply-domain>`.
/// The token makes the mailbox unguessable without storing per-message state:
/// validation re-derives candidate tokens for the current time bucket and
/// [`TOKEN_BACKWARD_TOLERANCE`] preceding ones and accepts the address iff
/// one matches.
#[derive(Debug, Clone)]
pub struct ReplyAddressCodec {
    secret: String,
    reply_domain: String,
}

impl ReplyAddressCodec {
    /// Create a codec for the given provider secret and reply domain.
    #[must_use]
    pub fn new(secret: impl Into<String>, reply_domain: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            reply_domain: reply_domain.into(),
        }
    }

    /// Generate a reply address for `request_id` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyAddressError::InvalidSecret`] if the MAC cannot be
    /// keyed with the configured secret.
    pub fn generate(&self, request_id: &str) -> Result<String, ReplyAddressError> {
        self.generate_at(request_id, Utc::now())
    }

    /// Generate a reply address as of a specific instant.
    ///
    /// Deterministic variant of [`generate`](Self::generate); the token is
    /// derived from the minute bucket containing `at`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyAddressError::InvalidSecret`] if the MAC cannot be
    /// keyed with the configured secret.
    pub fn generate_at(
        &self,
        request_id: &str,
        at: DateTime<Utc>,
    ) -> Result<String, ReplyAddressError> {
        let token = self.token_for(request_id, bucket_of(at))?;
        Ok(format!(
            "req-{request_id}-{token}@{}",
            self.reply_domain
        ))
    }

    /// Validate a reply address and extract the request identifier.
    ///
    /// Returns `None` for malformed, tampered, or expired addresses. Stale
    /// and forwarded mail routinely produces all three, so rejection is a
    /// normal outcome rather than an error.
    #[must_use]
    pub fn parse(&self, address: &str) -> Option<ParsedReply> {
        self.parse_at(address, Utc::now())
    }

    /// Validate a reply address as of a specific instant.
    #[must_use]
    pub fn parse_at(&self, address: &str, now: DateTime<Utc>) -> Option<ParsedReply> {
        let (local, _domain) = address.split_once('@')?;
        let rest = local.strip_prefix("req-")?;
        // The request id may itself contain hyphens; the token never does.
        let (request_id, token) = rest.rsplit_once('-')?;

        if request_id.is_empty()
            || token.len() != TOKEN_HEX_LEN
            || !token.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return None;
        }

        let token = token.to_ascii_lowercase();
        let current = bucket_of(now);

        for offset in 0..=TOKEN_BACKWARD_TOLERANCE {
            let candidate = self.token_for(request_id, current - offset).ok()?;
            if bool::from(token.as_bytes().ct_eq(candidate.as_bytes())) {
                return Some(ParsedReply {
                    request_id: request_id.to_string(),
                });
            }
        }

        None
    }

    fn token_for(&self, request_id: &str, bucket: i64) -> Result<String, ReplyAddressError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| ReplyAddressError::InvalidSecret)?;
        mac.update(request_id.as_bytes());
        mac.update(b".");
        mac.update(bucket.to_string().as_bytes());

        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(digest[..TOKEN_HEX_LEN].to_string())
    }
}

fn bucket_of(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(TOKEN_BUCKET_SECS)
}
