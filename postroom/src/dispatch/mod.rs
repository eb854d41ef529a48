//! Provider dispatcher: one send interface over interchangeable backends
//!
//! The dispatcher resolves the active provider configuration, enforces the
//! daily quota, derives the signed reply-to header, and submits the message
//! through the backend matching the configuration. When the quota is
//! exhausted the message is parked in the deferred queue and the call
//! returns [`SendOutcome::Deferred`]. Deferral is a normal outcome, not an
//! error.
//!
//! Transport failures surface as [`DispatchError::Provider`] and are never
//! retried synchronously; recovery happens through the queue on later ticks.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ConfigCache, ConfigError, DeliverySettings, ProviderConfig, ProviderKind};
use crate::email::{transport_for, EmailError, EmailTransport, OutboundEmail};
use crate::queue::{DeferredQueue, Priority, QueueError, QueuedMessage};
use crate::quota::QuotaTracker;
use crate::reply::ReplyAddressCodec;

/// Errors from a dispatch attempt.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No enabled provider configuration exists.
    #[error("no outbound provider is configured")]
    NoProviderConfigured,

    /// Provider configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport rejected the send.
    #[error("provider send failed: {0}")]
    Provider(#[from] EmailError),

    /// The deferred queue rejected the message.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// How a send request was resolved.
#[derive(Debug)]
pub enum SendOutcome {
    /// The message left through the given provider.
    Sent {
        /// Provider that accepted the message.
        provider: ProviderKind,
    },
    /// Quota was exhausted; the message is parked in the deferred queue.
    Deferred {
        /// Queue entry id.
        id: Uuid,
    },
}

/// Builds the transport for a provider configuration.
///
/// The production implementation constructs a fresh backend value per call;
/// tests substitute factories that capture or fail sends.
pub trait TransportFactory: Send + Sync {
    /// Build a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::Config`] when the configuration is incomplete.
    fn transport(
        &self,
        config: &ProviderConfig,
        timeout: Duration,
    ) -> Result<Box<dyn EmailTransport>, EmailError>;
}

/// Default factory mapping each [`ProviderKind`] to its real backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderTransports;

impl TransportFactory for ProviderTransports {
    fn transport(
        &self,
        config: &ProviderConfig,
        timeout: Duration,
    ) -> Result<Box<dyn EmailTransport>, EmailError> {
        transport_for(config, timeout)
    }
}

/// The uniform send interface.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<ConfigCache>,
    quota: QuotaTracker,
    queue: DeferredQueue,
    transports: Arc<dyn TransportFactory>,
    settings: DeliverySettings,
}

impl Dispatcher {
    /// Create a dispatcher using the real provider backends.
    #[must_use]
    pub fn new(
        config: Arc<ConfigCache>,
        quota: QuotaTracker,
        queue: DeferredQueue,
        settings: DeliverySettings,
    ) -> Self {
        Self::with_transports(config, quota, queue, settings, Arc::new(ProviderTransports))
    }

    /// Create a dispatcher with a custom transport factory.
    #[must_use]
    pub fn with_transports(
        config: Arc<ConfigCache>,
        quota: QuotaTracker,
        queue: DeferredQueue,
        settings: DeliverySettings,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            config,
            quota,
            queue,
            transports,
            settings,
        }
    }

    /// Send a notification for `request_id`, deferring if quota is gone.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoProviderConfigured`] when no provider is
    /// enabled, and [`DispatchError::Provider`] when the transport rejects
    /// the message. Quota exhaustion is not an error; the message is parked
    /// and [`SendOutcome::Deferred`] returned.
    pub async fn send(
        &self,
        request_id: &str,
        email: OutboundEmail,
        priority: Priority,
    ) -> Result<SendOutcome, DispatchError> {
        let config = self
            .config
            .active()
            .await?
            .ok_or(DispatchError::NoProviderConfigured)?;

        if !self
            .quota
            .can_send(config.kind, config.effective_daily_limit())
            .await
        {
            let id = self.queue.enqueue(request_id, &email, priority).await?;
            debug!(
                request = request_id,
                provider = %config.kind,
                entry = %id,
                "daily quota exhausted; send deferred"
            );
            return Ok(SendOutcome::Deferred { id });
        }

        self.deliver(&config, request_id, email).await?;
        Ok(SendOutcome::Sent {
            provider: config.kind,
        })
    }

    /// Deliver a queued message immediately, without re-queueing on failure.
    ///
    /// Used by the queue's drain tick; the queue itself owns the retry
    /// bookkeeping.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), minus the deferral path.
    pub async fn send_queued(&self, message: &QueuedMessage) -> Result<(), DispatchError> {
        let config = self
            .config
            .active()
            .await?
            .ok_or(DispatchError::NoProviderConfigured)?;

        self.deliver(&config, &message.request_id, message.to_email())
            .await
    }

    /// Whether the active provider has quota headroom right now.
    ///
    /// Used by the drain tick to stop early instead of burning attempts.
    pub async fn capacity_available(&self) -> bool {
        match self.config.active().await {
            Ok(Some(config)) => {
                self.quota
                    .can_send(config.kind, config.effective_daily_limit())
                    .await
            }
            Ok(None) => false,
            Err(error) => {
                warn!(error = %error, "could not resolve provider config; skipping drain");
                false
            }
        }
    }

    /// Translate, submit with a bounded timeout, and record usage.
    async fn deliver(
        &self,
        config: &ProviderConfig,
        request_id: &str,
        mut email: OutboundEmail,
    ) -> Result<(), DispatchError> {
        let codec = ReplyAddressCodec::new(&config.signing_secret, &config.reply_domain);
        let reply_to = codec
            .generate(request_id)
            .map_err(|e| EmailError::config(e.to_string()))?;
        email.reply_to = Some(reply_to);

        if email.from.is_none() {
            email.from = Some(config.from_address.clone());
        }

        let timeout = self.settings.send_timeout();
        let transport = self.transports.transport(config, timeout)?;

        match tokio::time::timeout(timeout, transport.send(email)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(DispatchError::Provider(error)),
            // A hung provider must not stall the drain; a timeout is a
            // transport failure like any other.
            Err(_) => return Err(DispatchError::Provider(EmailError::Timeout(timeout))),
        }

        if let Err(error) = self
            .quota
            .record_sent(config.kind, config.effective_daily_limit())
            .await
        {
            warn!(
                provider = %config.kind,
                error = %error,
                "send succeeded but usage increment failed"
            );
        }

        debug!(request = request_id, provider = %config.kind, "email dispatched");
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
