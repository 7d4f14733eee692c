//! Responses produced by executing an action result.

use super::{Headers, StatusCode};

/// The response an action hands back to the host server.
///
/// # Examples
///
/// ```
/// use outcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.headers().get("content-type"), Some("application/json"));
/// assert_eq!(response.body_ref(), br#"{"status":"ok"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in place, for code replaying headers in a loop.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers set so far, in insertion order.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_keep_insertion_order() {
        let r = Response::new(StatusCode::Ok)
            .header("X-Request-Id", "abc-123")
            .header("Cache-Control", "max-age=60");
        let names: Vec<_> = r.headers().iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-Request-Id", "Cache-Control"]);
    }

    #[test]
    fn later_body_replaces_earlier() {
        let r = Response::new(StatusCode::NoContent)
            .body("text")
            .body_bytes(vec![0u8, 1, 2]);
        assert_eq!(r.status(), StatusCode::NoContent);
        assert_eq!(r.body_ref(), &[0u8, 1, 2]);
    }
}
