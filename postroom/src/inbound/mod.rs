//! Inbound reply processing
//!
//! Webhook payloads from the REST providers flow through
//! [`InboundProcessor::process`]: signature verification, reply address
//! validation, content cleanup, then hand-off to the external
//! [`RequestStore`] collaborator as a new response record.
//!
//! Business records are reached only through the [`RequestStore`] trait and
//! its small read-only projection [`RequestSummary`]; this subsystem never
//! owns or mutates them beyond appending responses.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ConfigCache;
use crate::reply::{self, ReplyAddressCodec};
use crate::webhook::WebhookVerifier;

/// Read-only projection of a business request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    /// Opaque request identifier.
    pub id: String,
    /// Human-readable title used in notification subjects.
    pub title: String,
    /// Notification recipients.
    pub recipients: Vec<String>,
}

/// A response extracted from an inbound reply, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResponse {
    /// The request the reply belongs to.
    pub request_id: String,
    /// Reply author's address.
    pub sender: String,
    /// Sanitized reply text.
    pub body: String,
}

/// External owner of the business records this subsystem notifies about.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Look up a request by its opaque identifier.
    async fn request(&self, id: &str) -> anyhow::Result<Option<RequestSummary>>;

    /// Append a response to a request.
    async fn record_response(&self, response: NewResponse) -> anyhow::Result<()>;
}

/// A provider-neutral view of an inbound webhook delivery.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Reply author's address.
    pub sender: String,
    /// The address the reply was sent to (the generated reply address).
    pub recipient: String,
    /// Plaintext reply body.
    pub body: String,
    /// Signature timestamp supplied by the provider.
    pub timestamp: String,
    /// Signature nonce supplied by the provider.
    pub token: String,
    /// Hex-encoded HMAC signature supplied by the provider.
    pub signature: String,
}

/// How an accepted inbound delivery was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// The response was recorded on the request.
    Recorded {
        /// Request the response was attached to.
        request_id: String,
    },
    /// The address validated but no such request exists; dropped.
    Dropped {
        /// Request id extracted from the address.
        request_id: String,
    },
}

/// Why an inbound delivery was rejected.
#[derive(Debug, Error)]
pub enum WebhookRejection {
    /// Signature verification failed (or no secret is configured).
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// The "to" address is not a valid, current reply address.
    #[error("unparseable reply address: {0}")]
    UnparseableAddress(String),

    /// The payload is missing required fields.
    #[error("malformed webhook payload: {0}")]
    Malformed(String),

    /// The request store failed while recording the response.
    #[error("response store error: {0}")]
    Store(String),
}

/// The inbound reply pipeline.
#[derive(Clone)]
pub struct InboundProcessor {
    config: Arc<ConfigCache>,
    requests: Arc<dyn RequestStore>,
}

impl InboundProcessor {
    /// Create a processor reading provider secrets through `config` and
    /// recording responses into `requests`.
    #[must_use]
    pub fn new(config: Arc<ConfigCache>, requests: Arc<dyn RequestStore>) -> Self {
        Self { config, requests }
    }

    /// Run one inbound delivery through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookRejection::InvalidSignature`] when verification
    /// fails or no provider is configured, and
    /// [`WebhookRejection::UnparseableAddress`] for stale or malformed reply
    /// addresses; both are routine for old and forwarded mail. A reply for
    /// an unknown request is not an error; it is logged and dropped.
    pub async fn process(&self, inbound: InboundEmail) -> Result<InboundOutcome, WebhookRejection> {
        let config = match self.config.active().await {
            Ok(config) => config,
            Err(error) => {
                warn!(error = %error, "provider config unavailable for webhook verification");
                None
            }
        };
        // No configuration means no signing secret: reject rather than crash.
        let Some(config) = config else {
            return Err(WebhookRejection::InvalidSignature);
        };

        let verifier = WebhookVerifier::new(config.signing_secret.clone());
        if !verifier.verify(&inbound.timestamp, &inbound.token, &inbound.signature) {
            warn!(sender = %inbound.sender, "rejected inbound webhook: invalid signature");
            return Err(WebhookRejection::InvalidSignature);
        }

        let codec = ReplyAddressCodec::new(&config.signing_secret, &config.reply_domain);
        let Some(parsed) = codec.parse(&inbound.recipient) else {
            // Expected for stale or forwarded mail: the token window has
            // moved on. Warn and reject without touching any state.
            warn!(
                recipient = %inbound.recipient,
                "inbound reply address did not validate"
            );
            return Err(WebhookRejection::UnparseableAddress(inbound.recipient));
        };

        let body = reply::clean(&inbound.body);

        match self.requests.request(&parsed.request_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(request = %parsed.request_id, "reply for unknown request dropped");
                return Ok(InboundOutcome::Dropped {
                    request_id: parsed.request_id,
                });
            }
            Err(error) => return Err(WebhookRejection::Store(error.to_string())),
        }

        self.requests
            .record_response(NewResponse {
                request_id: parsed.request_id.clone(),
                sender: inbound.sender,
                body,
            })
            .await
            .map_err(|error| WebhookRejection::Store(error.to_string()))?;

        info!(request = %parsed.request_id, "inbound reply recorded");
        Ok(InboundOutcome::Recorded {
            request_id: parsed.request_id,
        })
    }
}

impl std::fmt::Debug for InboundProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundProcessor").finish_non_exhaustive()
    }
}
