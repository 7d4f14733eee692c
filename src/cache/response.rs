//! The storable shape of a response.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::action::{ActionResult, ContentResult, result::content_type_value};
use crate::http::{Headers, Response, StatusCode};

/// A response captured for the output cache.
///
/// A `CachedResponse` is immutable once built. The store hands out clones,
/// and the body is a shared, read-only [`Bytes`] buffer, so replaying an
/// entry never touches what the store holds.
///
/// # Examples
///
/// ```
/// use outcache::cache::CachedResponse;
/// use outcache::StatusCode;
///
/// let cached = CachedResponse::new(StatusCode::Ok, "Hello")
///     .with_header("Content-Type", "text/plain")
///     .with_encoding("utf-8");
///
/// let response = cached.to_cached_result().execute();
/// assert_eq!(response.body_ref(), b"Hello");
/// assert_eq!(response.headers().get("content-type"), Some("text/plain; charset=utf-8"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    #[serde(with = "status_code")]
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    #[serde(default)]
    content_encoding: Option<String>,
}

impl CachedResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
            content_encoding: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    /// Captures a content result: its text becomes the body, its encoding is
    /// kept, and its content type (if any) becomes a `Content-Type` entry.
    pub fn from_content(content: &ContentResult) -> Self {
        let mut cached = Self::new(StatusCode::Ok, Bytes::from(content.content().to_owned()));
        cached.content_encoding = content.content_encoding().map(str::to_owned);
        if let Some(content_type) = content.content_type() {
            cached.headers.insert("Content-Type", content_type);
        }
        cached
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    /// Wraps a snapshot of this entry in a result the pipeline can execute.
    pub fn to_cached_result(&self) -> ActionResult {
        ActionResult::Cached(CachedResult::new(self.clone()))
    }
}

/// Capability of results (and views) that can describe themselves as a
/// [`CachedResponse`].
pub trait CacheableResult: Send + Sync {
    /// Returns the storable form of this result, or `None` if this instance
    /// cannot be cached after all.
    fn cached_response(&self) -> Option<CachedResponse>;
}

/// A result replaying a [`CachedResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResult {
    response: CachedResponse,
}

impl CachedResult {
    pub fn new(response: CachedResponse) -> Self {
        Self { response }
    }

    pub fn response(&self) -> &CachedResponse {
        &self.response
    }

    /// Rebuilds the response: same status, headers in stored order, same
    /// body bytes. A stored encoding is applied to `Content-Type` the same
    /// way [`ContentResult::execute`] applies it.
    pub fn execute(&self) -> Response {
        let cached = &self.response;
        let mut response = Response::new(cached.status);
        for (name, value) in cached.headers.iter() {
            if name.eq_ignore_ascii_case("content-type") {
                response.add_header(name, content_type_value(value, cached.content_encoding()));
            } else {
                response.add_header(name, value);
            }
        }
        response.body_bytes(cached.body.to_vec())
    }
}

impl CacheableResult for CachedResult {
    fn cached_response(&self) -> Option<CachedResponse> {
        Some(self.response.clone())
    }
}

mod status_code {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::http::StatusCode;

    pub fn serialize<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(status.as_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StatusCode, D::Error> {
        let code = u16::deserialize(deserializer)?;
        StatusCode::from_u16(code)
            .ok_or_else(|| D::Error::custom(format!("unsupported status code {code}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_round_trip_is_exact() {
        let content = ContentResult::new("Hello")
            .with_content_type("text/plain")
            .with_encoding("utf-8");

        let cached = CachedResponse::from_content(&content);
        assert_eq!(cached.body().as_ref(), b"Hello");
        assert_eq!(cached.content_encoding(), Some("utf-8"));
        assert_eq!(cached.headers().get("Content-Type"), Some("text/plain"));

        let replayed = cached.to_cached_result();
        let ActionResult::Cached(result) = &replayed else {
            panic!("expected a cached result, got {replayed:?}");
        };
        assert_eq!(result.response().body().as_ref(), content.content().as_bytes());
        assert_eq!(result.response().content_encoding(), content.content_encoding());
        assert_eq!(result.response().headers().get("content-type"), content.content_type());
        assert_eq!(replayed.execute(), content.execute());
    }

    #[test]
    fn content_without_type_has_no_header() {
        let cached = CachedResponse::from_content(&ContentResult::new("x"));
        assert!(cached.headers().is_empty());
        assert_eq!(cached.to_cached_result().execute(), ContentResult::new("x").execute());
    }

    #[test]
    fn replay_keeps_status_header_order_and_raw_body() {
        let cached = CachedResponse::new(StatusCode::NotFound, vec![0u8, 159, 146, 150])
            .with_header("X-B", "2")
            .with_header("X-A", "1");

        let expected = Response::new(StatusCode::NotFound)
            .header("X-B", "2")
            .header("X-A", "1")
            .body_bytes(vec![0u8, 159, 146, 150]);
        assert_eq!(CachedResult::new(cached).execute(), expected);
    }

    #[test]
    fn serializes_for_external_stores() {
        let cached = CachedResponse::new(StatusCode::Ok, "Hello")
            .with_header("Content-Type", "text/plain")
            .with_encoding("utf-8");
        let json = serde_json::to_string(&cached).unwrap();
        let back: CachedResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cached);

        let bogus = json.replace("200", "299");
        assert!(serde_json::from_str::<CachedResponse>(&bogus).is_err());
    }
}
