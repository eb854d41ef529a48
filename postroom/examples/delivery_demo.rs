//! Offline walkthrough of the delivery subsystem.
//!
//! Uses the capturing transport so nothing leaves the machine:
//!
//! ```bash
//! cargo run --example delivery_demo
//! ```

use std::sync::Arc;

use postroom::config::{
    DeliverySettings, PostroomConfig, ProviderConfig, ProviderKind, StaticConfigStore,
};
use postroom::inbound::RequestSummary;
use postroom::state::PostroomState;
use postroom::testing::{memory_pool, CapturingTransports, InMemoryRequestStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("postroom=debug").init();

    let config = PostroomConfig {
        delivery: DeliverySettings::default(),
        providers: vec![ProviderConfig {
            kind: ProviderKind::Mailgun,
            enabled: true,
            from_address: "noreply@example.com".to_string(),
            sending_domain: "mg.example.com".to_string(),
            reply_domain: "reply.example.com".to_string(),
            signing_secret: "whsec_demo".to_string(),
            // Tiny limit so the second alert lands in the deferred queue.
            daily_limit: Some(11),
            api_key: Some("key-demo".to_string()),
            smtp: None,
        }],
    };
    let settings = config.delivery.clone();

    let transports = Arc::new(CapturingTransports::new());
    let state = PostroomState::with_transports(
        memory_pool().await?,
        Arc::new(StaticConfigStore::new(config)),
        Arc::new(InMemoryRequestStore::new()),
        settings,
        transports.clone(),
    );

    let request = RequestSummary {
        id: "42".to_string(),
        title: "Budget approval".to_string(),
        recipients: vec!["reviewer@example.com".to_string()],
    };

    let first = state.notifier().notify_new_request(&request).await?;
    println!("first alert:  {first:?}");

    let second = state.notifier().notify_new_request(&request).await?;
    println!("second alert: {second:?} (quota headroom is gone)");

    let status = state.status().await?;
    println!("queue: {} pending, {} exhausted", status.queue.pending, status.queue.exhausted);

    // What an external ticker would do every few minutes.
    let report = state.process_due().await?;
    println!("tick: {report:?}");

    for email in transports.sent_emails() {
        println!(
            "captured -> to={:?} subject={:?} reply_to={:?}",
            email.to, email.subject, email.reply_to
        );
    }

    Ok(())
}
