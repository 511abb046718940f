//! Response policy: which terminal response each pipeline outcome maps to.
//!
//! ```text
//! NoTransform      -> 200, request headers echoed
//! CacheHit         -> 301 to the derived key
//! PassThroughType  -> 200, original body and content type
//! Transformed      -> len <= limit: 200, base64 body   (InlineOk)
//!                     len >  limit: store, then 301    (StoredRedirect)
//! ```
use base64::{engine::general_purpose::STANDARD, Engine};
use http::{header, StatusCode};

use crate::{
    derived_key::DerivedKey,
    envelope::{BodyEncoding, EdgeResponse, Headers},
};

/// Largest encoded derivative returned inline, in decimal bytes. The edge
/// rejects response bodies of about a megabyte.
pub const DEFAULT_INLINE_LIMIT: usize = 1_000_000;

/// What to do with a freshly encoded derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return the bytes in the response body.
    Inline,
    /// Write the bytes to the store and redirect to them.
    Store,
}

/// Chooses the disposition of an encoded derivative of `len` bytes.
pub fn disposition(len: usize, inline_limit: usize) -> Disposition {
    if len > inline_limit {
        Disposition::Store
    } else {
        Disposition::Inline
    }
}

/// 400 for an event without a request record.
pub fn malformed_envelope() -> EdgeResponse {
    EdgeResponse::new(StatusCode::BAD_REQUEST)
        .with_header(header::CONTENT_TYPE, "text/plain")
        .with_body(
            "Invalid event structure: 'Records' key is missing",
            BodyEncoding::Text,
        )
}

/// 200 letting the original through, with the request's headers.
pub fn no_transform(request_headers: Headers) -> EdgeResponse {
    EdgeResponse::new(StatusCode::OK).with_headers(request_headers)
}

/// 301 to a derivative held by the store.
pub fn redirect(key: &DerivedKey) -> EdgeResponse {
    EdgeResponse::new(StatusCode::MOVED_PERMANENTLY).with_header(header::LOCATION, key.location())
}

/// 200 carrying an object that is not eligible for derivation.
///
/// UTF-8 bodies are sent as text, anything else as base64.
pub fn pass_through(request_headers: Headers, body: &[u8], content_type: &str) -> EdgeResponse {
    let response = EdgeResponse::new(StatusCode::OK)
        .with_headers(request_headers)
        .with_header(header::CONTENT_TYPE, content_type);

    match std::str::from_utf8(body) {
        Ok(text) => response.with_body(text, BodyEncoding::Text),
        Err(_) => response.with_body(STANDARD.encode(body), BodyEncoding::Base64),
    }
}

/// 200 carrying the encoded derivative as base64.
pub fn inline(bytes: &[u8], content_type: &str) -> EdgeResponse {
    EdgeResponse::new(StatusCode::OK)
        .with_header(header::CONTENT_TYPE, content_type)
        .with_body(STANDARD.encode(bytes), BodyEncoding::Base64)
}
