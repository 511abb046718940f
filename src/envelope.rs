//! Request and response records exchanged with the edge.
//!
//! The shapes follow the CDN's function event format: the request arrives
//! wrapped as `{"Records": [{"cf": {"request": {...}}}]}` and headers are
//! keyed by lowercase name, each holding a list of `{key, value}` entries.
use std::collections::BTreeMap;

use http::{header::HeaderName, StatusCode};
use serde::{Deserialize, Serialize};

/// Header map: lowercase name to the entries carrying that header.
pub type Headers = BTreeMap<String, Vec<HeaderEntry>>;

/// One header as carried by the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Header name in its display casing.
    #[serde(default)]
    pub key: String,
    /// Header value.
    pub value: String,
}

/// Inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEvent {
    /// Records of the event; only the first is handled.
    #[serde(rename = "Records", default)]
    pub records: Vec<EdgeRecord>,
}

/// A single event record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// CDN payload of the record.
    #[serde(default)]
    pub cf: Option<EdgePayload>,
}

/// CDN payload of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePayload {
    /// Viewer request.
    #[serde(default)]
    pub request: Option<EdgeRequest>,
}

/// The request to derive an image for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRequest {
    /// Request path, starting with `/`.
    pub uri: String,
    /// Raw query string without the leading `?`.
    #[serde(default)]
    pub querystring: String,
    /// Request headers.
    #[serde(default)]
    pub headers: Headers,
}

impl EdgeEvent {
    /// Wraps a single request into an event.
    pub fn from_request(request: EdgeRequest) -> Self {
        Self {
            records: vec![EdgeRecord {
                cf: Some(EdgePayload {
                    request: Some(request),
                }),
            }],
        }
    }

    /// Parses an event from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The request of the first record, if the event is well-formed.
    pub fn into_request(self) -> Option<EdgeRequest> {
        self.records.into_iter().next()?.cf?.request
    }
}

impl EdgeRequest {
    /// Create a request for `uri` with `querystring` and no headers.
    pub fn new(uri: impl Into<String>, querystring: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            querystring: querystring.into(),
            headers: Headers::new(),
        }
    }

    /// Object key addressed by the request: the path without its leading `/`.
    pub fn object_key(&self) -> &str {
        self.uri.strip_prefix('/').unwrap_or(&self.uri)
    }
}

/// How [`EdgeResponse::body`] is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// Body is sent as-is.
    Text,
    /// Body is base64 and decoded by the edge.
    Base64,
}

/// Response handed back to the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResponse {
    /// Status code.
    #[serde(with = "status_code")]
    pub status: StatusCode,
    /// Reason phrase for `status`.
    pub status_description: String,
    /// Response headers.
    #[serde(default)]
    pub headers: Headers,
    /// Replacement body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Encoding of `body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
}

impl EdgeResponse {
    /// Create a response with `status`, its canonical reason and no headers.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_description: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: Headers::new(),
            body: None,
            body_encoding: None,
        }
    }

    /// Replace all headers.
    pub fn with_headers(self, headers: Headers) -> Self {
        Self { headers, ..self }
    }

    /// Set a single header, replacing any previous entries for `name`.
    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.insert(
            name.as_str().to_owned(),
            vec![HeaderEntry {
                key: display_name(&name),
                value: value.into(),
            }],
        );
        self
    }

    /// Set the body and its encoding.
    pub fn with_body(self, body: impl Into<String>, encoding: BodyEncoding) -> Self {
        Self {
            body: Some(body.into()),
            body_encoding: Some(encoding),
            ..self
        }
    }

    /// First value of header `name`.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .get(name.as_str())
            .and_then(|entries| entries.first())
            .map(|entry| entry.value.as_str())
    }
}

/// Title-cases a lowercase header name: `content-type` becomes `Content-Type`.
fn display_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

mod status_code {
    use http::StatusCode;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(status.as_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StatusCode, D::Error> {
        let code = u16::deserialize(deserializer)?;
        StatusCode::from_u16(code).map_err(D::Error::custom)
    }
}
