//! Provider configuration and the read-through configuration cache
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `POSTROOM_` prefix)
//! 2. `./postroom.toml`
//! 3. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! # postroom.toml
//! [delivery]
//! quota_buffer = 10
//! drain_limit = 10
//! send_timeout_secs = 30
//!
//! [[providers]]
//! kind = "mailgun"
//! enabled = true
//! api_key = "key-xxxx"
//! sending_domain = "mg.example.com"
//! reply_domain = "reply.example.com"
//! from_address = "noreply@example.com"
//! signing_secret = "whsec_xxxx"
//! daily_limit = 300
//! ```
//!
//! The active [`ProviderConfig`] is owned by an external configuration store
//! and read through [`ConfigCache`], which caches the value for a fixed TTL
//! and exposes an explicit [`ConfigCache::invalidate`] to be called after
//! configuration writes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default daily send limit for the free-tier REST providers.
pub const DEFAULT_REST_DAILY_LIMIT: i64 = 300;

/// Errors raised while loading or fetching configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file or environment could not be parsed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    /// The external configuration store could not be reached.
    #[error("configuration store error: {0}")]
    Store(String),
}

/// An outbound email provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Generic SMTP relay.
    Smtp,
    /// Mailgun REST API (multipart form, HTTP Basic auth).
    Mailgun,
    /// Brevo REST API (JSON body, API-key header).
    Brevo,
}

impl ProviderKind {
    /// Stable lowercase name, used as the database key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Mailgun => "mailgun",
            Self::Brevo => "brevo",
        }
    }

    /// Default daily send limit when the configuration does not set one.
    ///
    /// The REST providers default to the free-tier allowance; a plain SMTP
    /// relay is treated as effectively unlimited.
    #[must_use]
    pub const fn default_daily_limit(self) -> i64 {
        match self {
            Self::Smtp => i64::MAX,
            Self::Mailgun | Self::Brevo => DEFAULT_REST_DAILY_LIMIT,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smtp" => Ok(Self::Smtp),
            "mailgun" => Ok(Self::Mailgun),
            "brevo" => Ok(Self::Brevo),
            other => Err(ConfigError::Store(format!("unknown provider: {other}"))),
        }
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// SMTP server hostname.
    pub host: String,

    /// SMTP server port (usually 587 for STARTTLS, 465 for TLS).
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// SMTP username.
    pub username: String,

    /// SMTP password.
    pub password: String,

    /// Use STARTTLS (default: true).
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_true() -> bool {
    true
}

/// Configuration for a single outbound provider.
///
/// One provider is active at a time; the `enabled` flag selects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which transport this configures.
    pub kind: ProviderKind,

    /// Whether this provider is the active one.
    #[serde(default)]
    pub enabled: bool,

    /// Sender address placed in the From header.
    pub from_address: String,

    /// Domain outbound mail is sent from.
    pub sending_domain: String,

    /// Domain reply-to addresses are generated under.
    pub reply_domain: String,

    /// Shared secret for reply tokens and inbound webhook signatures.
    pub signing_secret: String,

    /// Daily send limit; falls back to the provider kind's default.
    #[serde(default)]
    pub daily_limit: Option<i64>,

    /// API key for the REST providers.
    #[serde(default)]
    pub api_key: Option<String>,

    /// SMTP relay settings, required when `kind` is [`ProviderKind::Smtp`].
    #[serde(default)]
    pub smtp: Option<SmtpSettings>,
}

impl ProviderConfig {
    /// The daily limit to enforce for this provider.
    #[must_use]
    pub fn effective_daily_limit(&self) -> i64 {
        self.daily_limit
            .unwrap_or_else(|| self.kind.default_daily_limit())
    }
}

/// Tunables for dispatch, quota enforcement, and queue draining.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Safety margin subtracted from the daily limit before refusing sends.
    pub quota_buffer: i64,

    /// Maximum queue entries processed per drain tick.
    pub drain_limit: i64,

    /// Hard cap on delivery attempts per queued message.
    pub max_attempts: i64,

    /// Per-send network timeout in seconds.
    pub send_timeout_secs: u64,

    /// Base delay between retry attempts, scaled linearly per attempt.
    pub retry_backoff_secs: i64,

    /// How long a drain tick's claim on a queue entry remains valid.
    pub lease_secs: i64,

    /// TTL of the cached provider configuration.
    pub config_ttl_secs: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            quota_buffer: 10,
            drain_limit: 10,
            max_attempts: 3,
            send_timeout_secs: 30,
            retry_backoff_secs: 300,
            lease_secs: 60,
            config_ttl_secs: 60,
        }
    }
}

impl DeliverySettings {
    /// Per-send timeout as a [`Duration`].
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Complete postroom configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostroomConfig {
    /// Delivery tunables.
    #[serde(default)]
    pub delivery: DeliverySettings,

    /// Configured providers; at most one should be enabled.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl PostroomConfig {
    /// Load configuration from `./postroom.toml` with `POSTROOM_` environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source fails to parse.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("postroom.toml"))
                .merge(Env::prefixed("POSTROOM_").split("__")),
        )
    }

    /// Load configuration from a specific TOML file, still honoring
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source fails to parse.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("POSTROOM_").split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// The first enabled provider, if any.
    #[must_use]
    pub fn active_provider(&self) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.enabled)
    }
}

/// External owner of provider configuration.
///
/// The rest of the subsystem never talks to configuration storage directly;
/// it reads through [`ConfigCache`].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the currently active provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Store`] if the store is unreachable.
    async fn active_provider(&self) -> Result<Option<ProviderConfig>, ConfigError>;
}

/// [`ConfigStore`] backed by an in-process [`PostroomConfig`].
#[derive(Debug, Clone)]
pub struct StaticConfigStore {
    config: PostroomConfig,
}

impl StaticConfigStore {
    /// Wrap a loaded configuration.
    #[must_use]
    pub const fn new(config: PostroomConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigStore for StaticConfigStore {
    async fn active_provider(&self) -> Result<Option<ProviderConfig>, ConfigError> {
        Ok(self.config.active_provider().cloned())
    }
}

struct CachedEntry {
    fetched_at: Instant,
    value: Option<ProviderConfig>,
}

/// Read-through cache over a [`ConfigStore`].
///
/// The cache owns its TTL and exposes [`invalidate`](Self::invalidate) to be
/// called after configuration writes, so lifetime and invalidation order are
/// explicit rather than hidden in module-level state.
pub struct ConfigCache {
    store: Arc<dyn ConfigStore>,
    ttl: Duration,
    slot: Mutex<Option<CachedEntry>>,
}

impl ConfigCache {
    /// Create a cache over `store` with the given TTL.
    pub fn new(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// The currently active provider configuration, served from cache while
    /// fresh.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from the underlying store on a cache miss.
    pub async fn active(&self) -> Result<Option<ProviderConfig>, ConfigError> {
        if let Some(entry) = self.slot.lock().as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }

        let value = self.store.active_provider().await?;
        *self.slot.lock() = Some(CachedEntry {
            fetched_at: Instant::now(),
            value: value.clone(),
        });

        Ok(value)
    }

    /// Drop the cached value so the next read hits the store.
    ///
    /// Call this after every configuration write.
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

impl fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mailgun_config(enabled: bool) -> ProviderConfig {
        ProviderConfig {
            kind: ProviderKind::Mailgun,
            enabled,
            from_address: "noreply@example.com".to_string(),
            sending_domain: "mg.example.com".to_string(),
            reply_domain: "reply.example.com".to_string(),
            signing_secret: "secret".to_string(),
            daily_limit: None,
            api_key: Some("key-test".to_string()),
            smtp: None,
        }
    }

    struct CountingStore {
        fetches: AtomicUsize,
        value: Option<ProviderConfig>,
    }

    #[async_trait]
    impl ConfigStore for CountingStore {
        async fn active_provider(&self) -> Result<Option<ProviderConfig>, ConfigError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    #[test]
    fn provider_kind_round_trips_through_str() {
        for kind in [ProviderKind::Smtp, ProviderKind::Mailgun, ProviderKind::Brevo] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn rest_providers_default_to_free_tier_limit() {
        let config = mailgun_config(true);
        assert_eq!(config.effective_daily_limit(), DEFAULT_REST_DAILY_LIMIT);
    }

    #[test]
    fn smtp_defaults_to_unlimited() {
        let config = ProviderConfig {
            kind: ProviderKind::Smtp,
            ..mailgun_config(true)
        };
        assert_eq!(config.effective_daily_limit(), i64::MAX);
    }

    #[test]
    fn explicit_limit_wins_over_default() {
        let config = ProviderConfig {
            daily_limit: Some(50),
            ..mailgun_config(true)
        };
        assert_eq!(config.effective_daily_limit(), 50);
    }

    #[test]
    fn active_provider_picks_first_enabled() {
        let config = PostroomConfig {
            delivery: DeliverySettings::default(),
            providers: vec![mailgun_config(false), mailgun_config(true)],
        };
        assert!(config.active_provider().is_some());

        let none_enabled = PostroomConfig {
            delivery: DeliverySettings::default(),
            providers: vec![mailgun_config(false)],
        };
        assert!(none_enabled.active_provider().is_none());
    }

    #[tokio::test]
    async fn cache_serves_from_store_once_while_fresh() {
        let store = Arc::new(CountingStore {
            fetches: AtomicUsize::new(0),
            value: Some(mailgun_config(true)),
        });
        let cache = ConfigCache::new(store.clone(), Duration::from_secs(60));

        assert!(cache.active().await.unwrap().is_some());
        assert!(cache.active().await.unwrap().is_some());
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let store = Arc::new(CountingStore {
            fetches: AtomicUsize::new(0),
            value: Some(mailgun_config(true)),
        });
        let cache = ConfigCache::new(store.clone(), Duration::from_secs(60));

        cache.active().await.unwrap();
        cache.invalidate();
        cache.active().await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_refetches() {
        let store = Arc::new(CountingStore {
            fetches: AtomicUsize::new(0),
            value: None,
        });
        let cache = ConfigCache::new(store.clone(), Duration::ZERO);

        cache.active().await.unwrap();
        cache.active().await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delivery_settings_defaults() {
        let settings = DeliverySettings::default();
        assert_eq!(settings.quota_buffer, 10);
        assert_eq!(settings.drain_limit, 10);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.send_timeout(), Duration::from_secs(30));
    }
}
