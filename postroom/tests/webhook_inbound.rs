//! Inbound webhook endpoints: signature enforcement, reply address
//! validation, and response recording, exercised over real HTTP payloads.

use std::sync::Arc;

use axum_test::multipart::MultipartForm;
use axum_test::TestServer;
use http::StatusCode;
use postroom::config::{DeliverySettings, PostroomConfig, ProviderConfig, ProviderKind, StaticConfigStore};
use postroom::inbound::RequestSummary;
use postroom::state::PostroomState;
use postroom::testing::{memory_pool, webhook_signature, CapturingTransports, InMemoryRequestStore};
use postroom::webhook;
use postroom::ReplyAddressCodec;

const SECRET: &str = "whsec_test";
const REPLY_DOMAIN: &str = "reply.example.com";

fn provider() -> ProviderConfig {
    ProviderConfig {
        kind: ProviderKind::Mailgun,
        enabled: true,
        from_address: "noreply@example.com".to_string(),
        sending_domain: "mg.example.com".to_string(),
        reply_domain: REPLY_DOMAIN.to_string(),
        signing_secret: SECRET.to_string(),
        daily_limit: Some(300),
        api_key: Some("key-test".to_string()),
        smtp: None,
    }
}

async fn setup() -> (TestServer, Arc<InMemoryRequestStore>) {
    let requests = Arc::new(InMemoryRequestStore::new().with_request(RequestSummary {
        id: "42".to_string(),
        title: "Budget approval".to_string(),
        recipients: vec!["reviewer@example.com".to_string()],
    }));

    let pool = memory_pool().await.expect("in-memory pool");
    let config = PostroomConfig {
        delivery: DeliverySettings::default(),
        providers: vec![provider()],
    };
    let state = PostroomState::with_transports(
        pool,
        Arc::new(StaticConfigStore::new(config)),
        requests.clone(),
        DeliverySettings::default(),
        Arc::new(CapturingTransports::new()),
    );

    let server = TestServer::new(webhook::router(state)).expect("test server");
    (server, requests)
}

fn reply_address(request_id: &str) -> String {
    ReplyAddressCodec::new(SECRET, REPLY_DOMAIN)
        .generate(request_id)
        .expect("reply address")
}

fn mailgun_form(recipient: &str, signature: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("sender", "alice@example.com")
        .add_text("recipient", recipient.to_string())
        .add_text(
            "body-plain",
            "Looks good\n> quoted line\nOn Jan 1, 2024, X wrote:\nBody\n--\nSignature",
        )
        .add_text("timestamp", "1700000000")
        .add_text("token", "nonce-1")
        .add_text("signature", signature.to_string())
}

#[tokio::test]
async fn mailgun_webhook_records_a_sanitized_response() {
    let (server, requests) = setup().await;
    let signature = webhook_signature(SECRET, "1700000000", "nonce-1");

    let response = server
        .post("/webhooks/mailgun")
        .multipart(mailgun_form(&reply_address("42"), &signature))
        .await;

    response.assert_status(StatusCode::OK);

    let recorded = requests.responses();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].request_id, "42");
    assert_eq!(recorded[0].sender, "alice@example.com");
    assert_eq!(recorded[0].body, "Looks good");
}

#[tokio::test]
async fn invalid_signature_is_rejected_with_401() {
    let (server, requests) = setup().await;
    let forged = webhook_signature("wrong-secret", "1700000000", "nonce-1");

    let response = server
        .post("/webhooks/mailgun")
        .multipart(mailgun_form(&reply_address("42"), &forged))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(requests.responses().is_empty());
}

#[tokio::test]
async fn unparseable_reply_address_is_rejected_with_400() {
    let (server, requests) = setup().await;
    let signature = webhook_signature(SECRET, "1700000000", "nonce-1");

    let response = server
        .post("/webhooks/mailgun")
        .multipart(mailgun_form("someone@reply.example.com", &signature))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(requests.responses().is_empty());
}

#[tokio::test]
async fn missing_signature_fields_are_rejected_with_400() {
    let (server, requests) = setup().await;

    let form = MultipartForm::new()
        .add_text("sender", "alice@example.com")
        .add_text("recipient", reply_address("42"))
        .add_text("body-plain", "Looks good");

    let response = server.post("/webhooks/mailgun").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(requests.responses().is_empty());
}

#[tokio::test]
async fn reply_for_unknown_request_is_dropped_with_200() {
    let (server, requests) = setup().await;
    let signature = webhook_signature(SECRET, "1700000000", "nonce-1");

    // Valid, current address for a request the store has never heard of.
    let response = server
        .post("/webhooks/mailgun")
        .multipart(mailgun_form(&reply_address("99"), &signature))
        .await;

    response.assert_status(StatusCode::OK);
    assert!(requests.responses().is_empty());
}

#[tokio::test]
async fn brevo_webhook_records_a_response() {
    let (server, requests) = setup().await;
    let signature = webhook_signature(SECRET, "1700000000", "nonce-2");

    let payload = serde_json::json!({
        "items": [{
            "From": { "Name": "Bob", "Address": "bob@example.com" },
            "To": [{ "Address": reply_address("42") }],
            "RawTextBody": "Approved.\n\n> earlier message"
        }]
    });

    let response = server
        .post("/webhooks/brevo")
        .add_header(webhook::SIGNATURE_TIMESTAMP_HEADER, "1700000000")
        .add_header(webhook::SIGNATURE_TOKEN_HEADER, "nonce-2")
        .add_header(webhook::SIGNATURE_HEADER, signature)
        .json(&payload)
        .await;

    response.assert_status(StatusCode::OK);

    let recorded = requests.responses();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].sender, "bob@example.com");
    assert_eq!(recorded[0].body, "Approved.");
}

#[tokio::test]
async fn brevo_webhook_without_signature_headers_is_rejected() {
    let (server, requests) = setup().await;

    let payload = serde_json::json!({
        "items": [{
            "From": { "Address": "bob@example.com" },
            "To": [{ "Address": reply_address("42") }],
            "RawTextBody": "Approved."
        }]
    });

    let response = server.post("/webhooks/brevo").json(&payload).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert!(requests.responses().is_empty());
}
