//! Requests as the action pipeline sees them.

use super::{Headers, Method};

/// A request handed to an action.
///
/// The host server builds one per incoming request; a child action gets its
/// own, built the same way.
///
/// # Examples
///
/// ```
/// use outcache::http::{Method, Request};
///
/// let request = Request::new(Method::Get, "/products/42?lang=en")
///     .header("Accept-Language", "en");
/// assert_eq!(request.path(), "/products/42");
/// assert_eq!(request.query_string(), Some("lang=en"));
/// assert_eq!(request.headers().get("accept-language"), Some("en"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
}

impl Request {
    /// Builds a request for `target`, a path with an optional `?query`
    /// suffix.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };
        Self {
            method,
            path,
            query,
            headers: Headers::new(),
        }
    }

    /// Appends a header and returns the request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}
