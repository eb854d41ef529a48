//! Shared delivery state and the processing tick
//!
//! [`PostroomState`] wires the subsystem together: the config cache, quota
//! tracker, deferred queue, dispatcher, and inbound pipeline all share one
//! pool and one cached provider configuration. It doubles as the axum state
//! for the webhook router.
//!
//! The subsystem has three concurrent entry points: synchronous sends,
//! inbound webhooks, and the periodic [`process_due`](PostroomState::process_due)
//! tick an external scheduler invokes. All shared mutation goes through
//! atomic SQL statements, and overlapping ticks are additionally serialized
//! by an in-process single-flight guard.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{ConfigCache, ConfigStore, DeliverySettings};
use crate::dispatch::{Dispatcher, TransportFactory};
use crate::inbound::{InboundProcessor, RequestStore};
use crate::notify::Notifier;
use crate::queue::{DeferredQueue, QueueError, QueueStatus};
use crate::quota::{QuotaTracker, Usage};

/// Result of one processing tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Deferred entries delivered this tick.
    pub processed: u32,
    /// Deferred entries whose attempt failed this tick.
    pub errors: u32,
    /// Exhausted entries removed this tick.
    pub swept: u64,
}

/// Operator-facing delivery status.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeliveryStatus {
    /// Queue counts; `exhausted` is the only trace of terminal failures.
    pub queue: QueueStatus,
    /// Today's usage for the active provider, when known.
    pub usage: Option<Usage>,
}

/// Everything the delivery subsystem shares across its entry points.
#[derive(Clone)]
pub struct PostroomState {
    config: Arc<ConfigCache>,
    quota: QuotaTracker,
    queue: DeferredQueue,
    dispatcher: Dispatcher,
    inbound: InboundProcessor,
    settings: DeliverySettings,
    drain_guard: Arc<Mutex<()>>,
}

impl PostroomState {
    /// Wire up the subsystem over a pool, a configuration store, and the
    /// external request collaborator.
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        store: Arc<dyn ConfigStore>,
        requests: Arc<dyn RequestStore>,
        settings: DeliverySettings,
    ) -> Self {
        let config = Arc::new(ConfigCache::new(
            store,
            Duration::from_secs(settings.config_ttl_secs),
        ));
        let quota = QuotaTracker::new(pool.clone(), settings.quota_buffer);
        let queue = DeferredQueue::new(pool, &settings);
        let dispatcher = Dispatcher::new(
            config.clone(),
            quota.clone(),
            queue.clone(),
            settings.clone(),
        );
        let inbound = InboundProcessor::new(config.clone(), requests);

        Self {
            config,
            quota,
            queue,
            dispatcher,
            inbound,
            settings,
            drain_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Like [`new`](Self::new), but with a custom transport factory.
    /// Primarily used by tests to capture sends.
    #[must_use]
    pub fn with_transports(
        pool: SqlitePool,
        store: Arc<dyn ConfigStore>,
        requests: Arc<dyn RequestStore>,
        settings: DeliverySettings,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let mut state = Self::new(pool, store, requests, settings.clone());
        state.dispatcher = Dispatcher::with_transports(
            state.config.clone(),
            state.quota.clone(),
            state.queue.clone(),
            settings,
            transports,
        );
        state
    }

    /// The uniform send interface.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Notification composer over this state's dispatcher.
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.dispatcher.clone())
    }

    /// The inbound reply pipeline.
    #[must_use]
    pub const fn inbound(&self) -> &InboundProcessor {
        &self.inbound
    }

    /// The deferred queue.
    #[must_use]
    pub const fn queue(&self) -> &DeferredQueue {
        &self.queue
    }

    /// The quota tracker.
    #[must_use]
    pub const fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// The provider configuration cache. Call
    /// [`invalidate`](ConfigCache::invalidate) on it after configuration
    /// writes.
    #[must_use]
    pub fn config(&self) -> &ConfigCache {
        &self.config
    }

    /// Drain due deferred entries and sweep exhausted ones.
    ///
    /// This is the "process due work" entry point an external periodic
    /// ticker invokes. When a previous tick is still running the call
    /// returns an empty report instead of racing it; the database-level
    /// claims make overlap safe regardless, the guard just keeps ticks
    /// cheap.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on storage failures. Per-entry delivery
    /// failures are recorded on the entries, not returned.
    pub async fn process_due(&self) -> Result<TickReport, QueueError> {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            debug!("previous tick still draining; skipping this one");
            return Ok(TickReport::default());
        };

        let drained = self
            .queue
            .drain_due(&self.dispatcher, self.settings.drain_limit)
            .await?;
        let swept = self.queue.sweep_exhausted().await?;

        Ok(TickReport {
            processed: drained.processed,
            errors: drained.errors,
            swept,
        })
    }

    /// Operator-facing status read: queue counts plus today's usage for the
    /// active provider.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the queue counts cannot be read; missing
    /// usage data degrades to `None` rather than failing the read.
    pub async fn status(&self) -> Result<DeliveryStatus, QueueError> {
        let queue = self.queue.status().await?;

        let usage = match self.config.active().await {
            Ok(Some(provider)) => self
                .quota
                .usage(provider.kind, Utc::now().date_naive())
                .await
                .ok()
                .flatten()
                .or(Some(Usage {
                    sent: 0,
                    daily_limit: provider.effective_daily_limit(),
                })),
            _ => None,
        };

        Ok(DeliveryStatus { queue, usage })
    }
}

impl std::fmt::Debug for PostroomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostroomState")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
