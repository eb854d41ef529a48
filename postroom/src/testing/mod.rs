//! Test support utilities
//!
//! Provides an in-memory database pool, a transport factory that captures
//! sends instead of performing them, an in-memory request store, and a
//! webhook signature helper. Used by this crate's own tests and available
//! to downstream integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::ProviderConfig;
use crate::dispatch::TransportFactory;
use crate::email::{EmailError, EmailTransport, OutboundEmail};
use crate::inbound::{NewResponse, RequestStore, RequestSummary};

/// Create an in-memory `SQLite` pool with migrations applied.
///
/// The pool is capped at one connection so every statement sees the same
/// in-memory database.
///
/// # Errors
///
/// Returns an error if the pool cannot be opened or migrations fail.
pub async fn memory_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Compute the webhook signature a provider would attach for the given
/// secret and timestamp/token pair.
///
/// # Panics
///
/// Never in practice; HMAC accepts keys of any length.
#[must_use]
pub fn webhook_signature(secret: &str, timestamp: &str, token: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Transport factory that records every send in memory.
///
/// # Examples
///
/// ```rust,ignore
/// let transports = Arc::new(CapturingTransports::new());
/// let state = PostroomState::with_transports(pool, store, requests, settings, transports.clone());
///
/// state.dispatcher().send("42", email, Priority::Normal).await?;
/// assert_eq!(transports.sent_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CapturingTransports {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl CapturingTransports {
    /// Create a new capturing factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with the given message.
    pub fn fail_sends(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Let subsequent sends succeed again.
    pub fn restore_sends(&self) {
        *self.failure.lock() = None;
    }

    /// Number of emails captured.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// All captured emails.
    #[must_use]
    pub fn sent_emails(&self) -> Vec<OutboundEmail> {
        self.sent.lock().clone()
    }

    /// The most recently captured email.
    #[must_use]
    pub fn last_sent(&self) -> Option<OutboundEmail> {
        self.sent.lock().last().cloned()
    }

    /// Whether any captured email was addressed to `address`.
    #[must_use]
    pub fn was_sent_to(&self, address: &str) -> bool {
        self.sent
            .lock()
            .iter()
            .any(|email| email.to.iter().any(|to| to == address))
    }

    /// Drop all captured emails.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl TransportFactory for CapturingTransports {
    fn transport(
        &self,
        _config: &ProviderConfig,
        _timeout: Duration,
    ) -> Result<Box<dyn EmailTransport>, EmailError> {
        Ok(Box::new(CapturingTransport {
            sent: self.sent.clone(),
            failure: self.failure.clone(),
        }))
    }
}

struct CapturingTransport {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    failure: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl EmailTransport for CapturingTransport {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        email.validate()?;

        if let Some(message) = self.failure.lock().clone() {
            return Err(EmailError::api("test", 503, message));
        }

        self.sent.lock().push(email);
        Ok(())
    }
}

/// In-memory [`RequestStore`] for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRequestStore {
    requests: Arc<Mutex<HashMap<String, RequestSummary>>>,
    responses: Arc<Mutex<Vec<NewResponse>>>,
}

impl InMemoryRequestStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known request.
    #[must_use]
    pub fn with_request(self, request: RequestSummary) -> Self {
        self.requests.lock().insert(request.id.clone(), request);
        self
    }

    /// All recorded responses.
    #[must_use]
    pub fn responses(&self) -> Vec<NewResponse> {
        self.responses.lock().clone()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn request(&self, id: &str) -> anyhow::Result<Option<RequestSummary>> {
        Ok(self.requests.lock().get(id).cloned())
    }

    async fn record_response(&self, response: NewResponse) -> anyhow::Result<()> {
        self.responses.lock().push(response);
        Ok(())
    }
}
