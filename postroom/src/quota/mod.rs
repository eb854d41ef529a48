//! Per-provider daily send quota tracking
//!
//! One `daily_usage` row exists per (day, provider), created lazily by the
//! first send of the day. [`QuotaTracker::record_sent`] is a single atomic
//! upsert-increment so concurrent senders never lose updates, and
//! [`QuotaTracker::can_send`] keeps a configurable safety buffer below the
//! hard limit to absorb the bounded overshoot of in-flight sends.
//!
//! If the usage store is unreachable, `can_send` **fails open** and allows
//! the send: losing an accurate count for a day is preferable to silently
//! blocking all outbound mail. This is a deliberate trade-off, not a bug.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::ProviderKind;

/// A day's usage against the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Messages sent so far.
    pub sent: i64,
    /// Daily limit recorded with the counter.
    pub daily_limit: i64,
}

/// Tracks and enforces daily send counts per provider.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    pool: SqlitePool,
    buffer: i64,
}

impl QuotaTracker {
    /// Create a tracker with the given safety buffer.
    #[must_use]
    pub const fn new(pool: SqlitePool, buffer: i64) -> Self {
        Self { pool, buffer }
    }

    /// Whether another message may be sent today without breaching
    /// `daily_limit - buffer`.
    ///
    /// Fails open when the store is unreachable (see module docs).
    pub async fn can_send(&self, provider: ProviderKind, daily_limit: i64) -> bool {
        match self.sent_today(provider).await {
            Ok(sent) => sent < daily_limit.saturating_sub(self.buffer),
            Err(error) => {
                warn!(
                    provider = %provider,
                    error = %error,
                    "usage store unreachable; failing open and allowing send"
                );
                true
            }
        }
    }

    /// Record one successful send for today.
    ///
    /// A single `INSERT .. ON CONFLICT .. DO UPDATE` increment, safe under
    /// concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns the database error if the upsert fails.
    pub async fn record_sent(
        &self,
        provider: ProviderKind,
        daily_limit: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO daily_usage (day, provider, sent, daily_limit) \
             VALUES (?1, ?2, 1, ?3) \
             ON CONFLICT (day, provider) DO UPDATE SET sent = sent + 1",
        )
        .bind(today().to_string())
        .bind(provider.as_str())
        .bind(daily_limit)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Usage for a provider on a given day, if any sends were recorded.
    ///
    /// # Errors
    ///
    /// Returns the database error if the read fails.
    pub async fn usage(
        &self,
        provider: ProviderKind,
        day: NaiveDate,
    ) -> Result<Option<Usage>, sqlx::Error> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT sent, daily_limit FROM daily_usage WHERE day = ?1 AND provider = ?2",
        )
        .bind(day.to_string())
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(sent, daily_limit)| Usage { sent, daily_limit }))
    }

    /// Admin reset: delete the counter for a provider and day.
    ///
    /// The only path that ever deletes a usage row.
    ///
    /// # Errors
    ///
    /// Returns the database error if the delete fails.
    pub async fn reset(&self, provider: ProviderKind, day: NaiveDate) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM daily_usage WHERE day = ?1 AND provider = ?2")
            .bind(day.to_string())
            .bind(provider.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn sent_today(&self, provider: ProviderKind) -> Result<i64, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT sent FROM daily_usage WHERE day = ?1 AND provider = ?2")
                .bind(today().to_string())
                .bind(provider.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map_or(0, |(sent,)| sent))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pool;

    #[tokio::test]
    async fn can_send_with_no_usage_yet() {
        let pool = memory_pool().await.unwrap();
        let tracker = QuotaTracker::new(pool, 10);
        assert!(tracker.can_send(ProviderKind::Mailgun, 300).await);
    }

    #[tokio::test]
    async fn can_send_flips_at_limit_minus_buffer() {
        let pool = memory_pool().await.unwrap();
        let tracker = QuotaTracker::new(pool, 2);

        // limit 5, buffer 2: sends allowed while sent < 3
        for _ in 0..2 {
            assert!(tracker.can_send(ProviderKind::Brevo, 5).await);
            tracker.record_sent(ProviderKind::Brevo, 5).await.unwrap();
        }
        assert!(tracker.can_send(ProviderKind::Brevo, 5).await);
        tracker.record_sent(ProviderKind::Brevo, 5).await.unwrap();

        assert!(!tracker.can_send(ProviderKind::Brevo, 5).await);
    }

    #[tokio::test]
    async fn concurrent_record_sent_loses_no_updates() {
        let pool = memory_pool().await.unwrap();
        let tracker = QuotaTracker::new(pool, 10);

        let mut handles = Vec::new();
        for _ in 0..25 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.record_sent(ProviderKind::Mailgun, 300).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let usage = tracker
            .usage(ProviderKind::Mailgun, today())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(usage.sent, 25);
        assert_eq!(usage.daily_limit, 300);
    }

    #[tokio::test]
    async fn usage_is_tracked_per_provider() {
        let pool = memory_pool().await.unwrap();
        let tracker = QuotaTracker::new(pool, 10);

        tracker.record_sent(ProviderKind::Mailgun, 300).await.unwrap();
        tracker.record_sent(ProviderKind::Smtp, i64::MAX).await.unwrap();
        tracker.record_sent(ProviderKind::Smtp, i64::MAX).await.unwrap();

        let mailgun = tracker.usage(ProviderKind::Mailgun, today()).await.unwrap().unwrap();
        let smtp = tracker.usage(ProviderKind::Smtp, today()).await.unwrap().unwrap();
        assert_eq!(mailgun.sent, 1);
        assert_eq!(smtp.sent, 2);
    }

    #[tokio::test]
    async fn reset_deletes_the_counter() {
        let pool = memory_pool().await.unwrap();
        let tracker = QuotaTracker::new(pool, 10);

        tracker.record_sent(ProviderKind::Brevo, 300).await.unwrap();
        tracker.reset(ProviderKind::Brevo, today()).await.unwrap();

        assert!(tracker.usage(ProviderKind::Brevo, today()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fails_open_when_store_is_gone() {
        let pool = memory_pool().await.unwrap();
        let tracker = QuotaTracker::new(pool.clone(), 10);
        pool.close().await;

        assert!(tracker.can_send(ProviderKind::Mailgun, 300).await);
    }
}
