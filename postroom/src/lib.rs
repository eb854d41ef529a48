//! postroom: transactional notification delivery with reply-by-email
//!
//! This crate is the delivery subsystem for applications that send
//! new-request and response alerts and let recipients answer by ordinary
//! email reply. It provides:
//!
//! - **Provider dispatch**: one send interface over interchangeable
//!   backends (generic SMTP, Mailgun-style multipart REST, Brevo-style JSON
//!   REST), selected by configuration
//! - **Reply-by-email**: cryptographically signed reply-to addresses that
//!   attribute inbound replies to a request without a lookup table
//! - **Quota enforcement**: per-provider daily send counters with a safety
//!   buffer, incremented atomically under concurrent senders
//! - **A deferred outbox**: messages that cannot be sent immediately are
//!   parked durably, replayed in priority order on each processing tick,
//!   and dropped after a bounded number of attempts
//! - **Inbound webhooks**: axum endpoints that verify provider signatures,
//!   validate reply addresses, sanitize reply bodies, and hand the result to
//!   your request store
//!
//! Business records (the request being notified about) stay outside this
//! crate: implement [`RequestStore`](inbound::RequestStore) and
//! [`ConfigStore`](config::ConfigStore) to connect your own storage.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use postroom::config::{PostroomConfig, StaticConfigStore};
//! use postroom::inbound::RequestSummary;
//! use postroom::state::PostroomState;
//! use postroom::testing::InMemoryRequestStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PostroomConfig::load()?;
//! let settings = config.delivery.clone();
//! let pool = sqlx::SqlitePool::connect("sqlite://postroom.db").await?;
//!
//! let requests = Arc::new(InMemoryRequestStore::new().with_request(RequestSummary {
//!     id: "42".to_string(),
//!     title: "Budget approval".to_string(),
//!     recipients: vec!["reviewer@example.com".to_string()],
//! }));
//!
//! let state = PostroomState::new(
//!     pool,
//!     Arc::new(StaticConfigStore::new(config)),
//!     requests.clone(),
//!     settings,
//! );
//!
//! // Outbound: notify recipients; quota exhaustion defers instead of failing.
//! let request = requests.request("42").await?.unwrap();
//! state.notifier().notify_new_request(&request).await?;
//!
//! // Periodic: an external ticker drains the deferred queue.
//! let report = state.process_due().await?;
//! println!("processed {} deferred emails", report.processed);
//!
//! // Inbound: serve the webhook endpoints.
//! let app = postroom::webhook::router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! # use postroom::inbound::RequestStore as _;
//! ```

pub mod config;
pub mod dispatch;
pub mod email;
pub mod inbound;
pub mod notify;
pub mod queue;
pub mod quota;
pub mod reply;
pub mod state;
pub mod testing;
pub mod webhook;

pub use config::{PostroomConfig, ProviderConfig, ProviderKind};
pub use dispatch::{DispatchError, Dispatcher, SendOutcome};
pub use email::OutboundEmail;
pub use inbound::{NewResponse, RequestStore, RequestSummary};
pub use notify::Notifier;
pub use queue::{Priority, QueueStatus};
pub use reply::ReplyAddressCodec;
pub use state::{PostroomState, TickReport};
pub use webhook::WebhookVerifier;
