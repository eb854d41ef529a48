//! Reply-by-email: signed reply addresses and inbound content cleanup
//!
//! Outbound notifications carry a generated reply-to address of the form
//! `req-<request-id>-<token>@<reply-domain>`, where the token is an HMAC over
//! the request identifier and the current one-minute time bucket. Inbound
//! replies are attributed by re-deriving candidate tokens for a bounded
//! window of recent buckets, so no per-message state is ever persisted.

mod address;
mod sanitize;

pub use address::{
    ParsedReply, ReplyAddressCodec, ReplyAddressError, TOKEN_BACKWARD_TOLERANCE, TOKEN_BUCKET_SECS,
};
pub use sanitize::clean;
