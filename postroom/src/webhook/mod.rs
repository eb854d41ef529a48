//! Inbound webhook endpoints
//!
//! One endpoint per REST provider, each translating its provider-specific
//! inbound-parse payload into the neutral
//! [`InboundEmail`](crate::inbound::InboundEmail) shape and handing it to
//! the [`InboundProcessor`](crate::inbound::InboundProcessor).
//!
//! Responses are status-only: `200` accepted (including replies dropped for
//! an unknown request), `401` signature failure, `400` unparseable payload
//! or reply address.

mod verify;

pub use verify::WebhookVerifier;

use std::collections::HashMap;

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::inbound::{InboundEmail, WebhookRejection};
use crate::state::PostroomState;

/// Header carrying the signature timestamp on JSON webhooks.
pub const SIGNATURE_TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
/// Header carrying the signature nonce on JSON webhooks.
pub const SIGNATURE_TOKEN_HEADER: &str = "x-webhook-token";
/// Header carrying the hex HMAC signature on JSON webhooks.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Build the webhook router.
pub fn router(state: PostroomState) -> Router {
    Router::new()
        .route("/webhooks/mailgun", post(mailgun_inbound))
        .route("/webhooks/brevo", post(brevo_inbound))
        .with_state(state)
}

/// Mailgun-style inbound parse: multipart form with `sender`, `recipient`,
/// `body-plain`, and the `timestamp`/`token`/`signature` triple as fields.
async fn mailgun_inbound(
    State(state): State<PostroomState>,
    mut multipart: Multipart,
) -> StatusCode {
    let mut fields: HashMap<String, String> = HashMap::new();

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let Some(name) = field.name().map(ToString::to_string) else {
                    continue;
                };
                match field.text().await {
                    Ok(value) => {
                        fields.insert(name, value);
                    }
                    Err(_) => return StatusCode::BAD_REQUEST,
                }
            }
            Ok(None) => break,
            Err(_) => return StatusCode::BAD_REQUEST,
        }
    }

    let inbound = match mailgun_payload(fields) {
        Ok(inbound) => inbound,
        Err(rejection) => return rejection_status(&rejection),
    };

    match state.inbound().process(inbound).await {
        Ok(_) => StatusCode::OK,
        Err(rejection) => rejection_status(&rejection),
    }
}

fn mailgun_payload(mut fields: HashMap<String, String>) -> Result<InboundEmail, WebhookRejection> {
    let body = fields.remove("body-plain").unwrap_or_default();
    Ok(InboundEmail {
        sender: required(&mut fields, "sender")?,
        recipient: required(&mut fields, "recipient")?,
        body,
        timestamp: required(&mut fields, "timestamp")?,
        token: required(&mut fields, "token")?,
        signature: required(&mut fields, "signature")?,
    })
}

fn required(
    fields: &mut HashMap<String, String>,
    key: &str,
) -> Result<String, WebhookRejection> {
    fields
        .remove(key)
        .ok_or_else(|| WebhookRejection::Malformed(format!("missing field: {key}")))
}

/// One address in a Brevo inbound payload.
#[derive(Debug, Deserialize)]
struct BrevoAddress {
    #[serde(rename = "Address")]
    address: String,
}

/// One delivered message in a Brevo inbound payload.
#[derive(Debug, Deserialize)]
struct BrevoInboundItem {
    #[serde(rename = "From")]
    from: BrevoAddress,
    #[serde(rename = "To", default)]
    to: Vec<BrevoAddress>,
    #[serde(rename = "RawTextBody", default)]
    raw_text_body: Option<String>,
}

/// Brevo-style inbound parse payload.
#[derive(Debug, Deserialize)]
pub struct BrevoInboundPayload {
    #[serde(rename = "items", default)]
    items: Vec<BrevoInboundItem>,
}

/// Brevo-style inbound parse: JSON `items` with the signature triple in the
/// `x-webhook-*` headers.
async fn brevo_inbound(
    State(state): State<PostroomState>,
    headers: HeaderMap,
    Json(payload): Json<BrevoInboundPayload>,
) -> StatusCode {
    let Some((timestamp, token, signature)) = signature_headers(&headers) else {
        return StatusCode::UNAUTHORIZED;
    };

    for item in payload.items {
        let recipient = item
            .to
            .first()
            .map_or_else(String::new, |address| address.address.clone());

        let inbound = InboundEmail {
            sender: item.from.address,
            recipient,
            body: item.raw_text_body.unwrap_or_default(),
            timestamp: timestamp.clone(),
            token: token.clone(),
            signature: signature.clone(),
        };

        if let Err(rejection) = state.inbound().process(inbound).await {
            return rejection_status(&rejection);
        }
    }

    StatusCode::OK
}

fn signature_headers(headers: &HeaderMap) -> Option<(String, String, String)> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    };
    Some((
        get(SIGNATURE_TIMESTAMP_HEADER)?,
        get(SIGNATURE_TOKEN_HEADER)?,
        get(SIGNATURE_HEADER)?,
    ))
}

fn rejection_status(rejection: &WebhookRejection) -> StatusCode {
    match rejection {
        WebhookRejection::InvalidSignature => StatusCode::UNAUTHORIZED,
        WebhookRejection::UnparseableAddress(_) | WebhookRejection::Malformed(_) => {
            StatusCode::BAD_REQUEST
        }
        WebhookRejection::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
