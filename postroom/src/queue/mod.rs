//! Deferred queue: a durable, bounded-retry outbox
//!
//! Emails that cannot be sent immediately (quota exhausted, provider down)
//! land here and are replayed on each processing tick in priority order.
//! Entries are retried at most [`DeliverySettings::max_attempts`] times with
//! a linear per-attempt backoff, then become terminal and are removed by
//! [`DeferredQueue::sweep_exhausted`]; the failure is visible only through
//! [`DeferredQueue::status`].
//!
//! Two overlapping drain ticks must never double-send. Each entry is claimed
//! with a conditional update on its `lease_until` column before delivery is
//! attempted; a claim that affects zero rows means another tick owns the
//! entry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DeliverySettings;
use crate::dispatch::Dispatcher;
use crate::email::{Attachment, OutboundEmail};

/// Errors from deferred queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Database operation failed.
    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored message payload could not be (de)serialized.
    #[error("queued message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivery priority of a queued message.
///
/// Higher priorities drain first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Routine notification.
    #[default]
    Normal,
    /// Time-sensitive notification.
    High,
    /// Must go out on the next tick with capacity.
    Urgent,
}

impl Priority {
    /// Database representation; ordering follows the numeric value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::High => 1,
            Self::Urgent => 2,
        }
    }

    const fn from_i64(value: i64) -> Self {
        match value {
            2 => Self::Urgent,
            1 => Self::High,
            _ => Self::Normal,
        }
    }
}

/// A message parked in the deferred queue.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Queue entry id.
    pub id: Uuid,
    /// The request this notification belongs to.
    pub request_id: String,
    /// Recipient addresses.
    pub recipients: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// HTML body, if any.
    pub html_body: Option<String>,
    /// Plain text body, if any.
    pub text_body: Option<String>,
    /// Attachments, if any.
    pub attachments: Vec<Attachment>,
    /// Delivery priority.
    pub priority: Priority,
    /// Earliest time this entry is due.
    pub scheduled_for: DateTime<Utc>,
    /// Delivery attempts so far.
    pub attempts: i64,
    /// When the last attempt ran.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error from the last attempt.
    pub last_error: Option<String>,
}

impl QueuedMessage {
    /// Rebuild the outbound message. Sender and reply-to are intentionally
    /// absent; the dispatcher derives both from the provider configuration
    /// active at actual send time.
    #[must_use]
    pub fn to_email(&self) -> OutboundEmail {
        let mut email = OutboundEmail::new()
            .to_all(&self.recipients)
            .subject(&self.subject);
        if let Some(html) = &self.html_body {
            email = email.html(html);
        }
        if let Some(text) = &self.text_body {
            email = email.text(text);
        }
        for attachment in &self.attachments {
            email = email.attach(attachment.clone());
        }
        email
    }
}

#[derive(sqlx::FromRow)]
struct QueuedMessageRow {
    id: String,
    request_id: String,
    recipients: String,
    subject: String,
    html_body: Option<String>,
    text_body: Option<String>,
    attachments: Option<String>,
    priority: i64,
    scheduled_for: DateTime<Utc>,
    attempts: i64,
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl TryFrom<QueuedMessageRow> for QueuedMessage {
    type Error = QueueError;

    fn try_from(row: QueuedMessageRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| QueueError::Serialization(serde::de::Error::custom(e)))?;
        let recipients: Vec<String> = serde_json::from_str(&row.recipients)?;
        let attachments: Vec<Attachment> = match row.attachments {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        Ok(Self {
            id,
            request_id: row.request_id,
            recipients,
            subject: row.subject,
            html_body: row.html_body,
            text_body: row.text_body,
            attachments,
            priority: Priority::from_i64(row.priority),
            scheduled_for: row.scheduled_for,
            attempts: row.attempts,
            last_attempt: row.last_attempt,
            last_error: row.last_error,
        })
    }
}

/// Operational snapshot of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Entries still awaiting delivery.
    pub pending: i64,
    /// Entries that reached the attempt cap and await cleanup.
    pub exhausted: i64,
}

/// Result of one drain tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries delivered and removed.
    pub processed: u32,
    /// Entries whose attempt failed and was recorded.
    pub errors: u32,
}

/// The durable deferred-email queue.
#[derive(Debug, Clone)]
pub struct DeferredQueue {
    pool: SqlitePool,
    max_attempts: i64,
    lease: Duration,
    backoff: Duration,
}

impl DeferredQueue {
    /// Create a queue over the given pool with the configured retry policy.
    #[must_use]
    pub fn new(pool: SqlitePool, settings: &DeliverySettings) -> Self {
        Self {
            pool,
            max_attempts: settings.max_attempts,
            lease: Duration::seconds(settings.lease_secs),
            backoff: Duration::seconds(settings.retry_backoff_secs),
        }
    }

    /// Park a message for later delivery. Returns the queue entry id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the entry cannot be serialized or stored.
    pub async fn enqueue(
        &self,
        request_id: &str,
        email: &OutboundEmail,
        priority: Priority,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let recipients = serde_json::to_string(&email.to)?;
        let attachments = if email.attachments.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&email.attachments)?)
        };

        sqlx::query(
            "INSERT INTO deferred_emails \
             (id, request_id, recipients, subject, html_body, text_body, attachments, \
              priority, scheduled_for, attempts, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
        )
        .bind(id.to_string())
        .bind(request_id)
        .bind(recipients)
        .bind(email.subject.clone().unwrap_or_default())
        .bind(email.html.clone())
        .bind(email.text.clone())
        .bind(attachments)
        .bind(priority.as_i64())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(entry = %id, request = request_id, ?priority, "deferred email enqueued");
        Ok(id)
    }

    /// Replay due entries through the dispatcher, highest priority first.
    ///
    /// At most `limit` entries are attempted per invocation. Draining stops
    /// early as soon as provider capacity is gone; the remaining entries
    /// simply wait for the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on storage failures. Per-entry delivery
    /// failures are recorded on the entry and reported in the
    /// [`DrainReport`], not returned.
    pub async fn drain_due(
        &self,
        dispatcher: &Dispatcher,
        limit: i64,
    ) -> Result<DrainReport, QueueError> {
        let now = Utc::now();
        let candidates = self.due(limit, now).await?;
        let mut report = DrainReport::default();

        for message in candidates {
            if !dispatcher.capacity_available().await {
                debug!("provider capacity exhausted; leaving remaining entries for next tick");
                break;
            }

            if !self.claim(message.id, now).await? {
                // Another tick owns this entry.
                continue;
            }

            match dispatcher.send_queued(&message).await {
                Ok(()) => {
                    self.complete(message.id).await?;
                    report.processed += 1;
                }
                Err(error) => {
                    warn!(
                        entry = %message.id,
                        request = %message.request_id,
                        attempt = message.attempts + 1,
                        error = %error,
                        "deferred delivery attempt failed"
                    );
                    self.record_failure(&message, &error.to_string()).await?;
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Delete entries that have reached the attempt cap.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the delete fails.
    pub async fn sweep_exhausted(&self) -> Result<u64, QueueError> {
        let swept = sqlx::query("DELETE FROM deferred_emails WHERE attempts >= ?1")
            .bind(self.max_attempts)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if swept > 0 {
            info!(swept, "removed exhausted queue entries");
        }
        Ok(swept)
    }

    /// Operational counts for status reads.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the counts cannot be read.
    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let (pending,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM deferred_emails WHERE attempts < ?1")
                .bind(self.max_attempts)
                .fetch_one(&self.pool)
                .await?;
        let (exhausted,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM deferred_emails WHERE attempts >= ?1")
                .bind(self.max_attempts)
                .fetch_one(&self.pool)
                .await?;

        Ok(QueueStatus { pending, exhausted })
    }

    /// Due, not-yet-exhausted entries in drain order.
    async fn due(&self, limit: i64, now: DateTime<Utc>) -> Result<Vec<QueuedMessage>, QueueError> {
        let rows: Vec<QueuedMessageRow> = sqlx::query_as(
            "SELECT id, request_id, recipients, subject, html_body, text_body, attachments, \
                    priority, scheduled_for, attempts, last_attempt, last_error \
             FROM deferred_emails \
             WHERE scheduled_for <= ?1 AND attempts < ?2 \
             ORDER BY priority DESC, scheduled_for ASC \
             LIMIT ?3",
        )
        .bind(now)
        .bind(self.max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueuedMessage::try_from).collect()
    }

    /// Atomically claim an entry for this tick.
    ///
    /// The conditional update succeeds for exactly one caller; a stale lease
    /// (older than the lease window) is treated as abandoned and re-claimed.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, QueueError> {
        let claimed = sqlx::query(
            "UPDATE deferred_emails SET lease_until = ?1 \
             WHERE id = ?2 AND attempts < ?3 \
               AND (lease_until IS NULL OR lease_until <= ?4)",
        )
        .bind(now + self.lease)
        .bind(id.to_string())
        .bind(self.max_attempts)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(claimed == 1)
    }

    /// Remove a successfully delivered entry.
    async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM deferred_emails WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt and release the lease.
    ///
    /// The next attempt is pushed back by `backoff * attempts`; an entry at
    /// the cap keeps its row until [`sweep_exhausted`](Self::sweep_exhausted)
    /// removes it.
    async fn record_failure(&self, message: &QueuedMessage, error: &str) -> Result<(), QueueError> {
        let now = Utc::now();
        let attempts = message.attempts + 1;
        let next_due = now + self.backoff * i32::try_from(attempts).unwrap_or(i32::MAX);

        sqlx::query(
            "UPDATE deferred_emails \
             SET attempts = ?1, last_attempt = ?2, last_error = ?3, \
                 scheduled_for = ?4, lease_until = NULL \
             WHERE id = ?5",
        )
        .bind(attempts)
        .bind(now)
        .bind(error)
        .bind(next_due)
        .bind(message.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
