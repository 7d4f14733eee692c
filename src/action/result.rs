//! Action results: what a handler produces and the pipeline executes.
//!
//! [`ActionResult`] is a closed set of built-in result kinds plus an open
//! [`ActionResult::Custom`] slot. Filters never downcast: they ask a result
//! for a capability through [`ActionResult::as_cacheable`],
//! [`ActionResult::as_content`] and [`ActionResult::as_view`].

use std::fmt;
use std::sync::Arc;

use crate::cache::{CacheableResult, CachedResult};
use crate::http::{Response, StatusCode};

/// The outcome of running an action handler.
pub enum ActionResult {
    /// Literal text with an optional content type and encoding.
    Content(ContentResult),
    /// A rendered view.
    View(ViewResult),
    /// A response replayed from the output cache.
    Cached(CachedResult),
    /// A fully built response that is sent as-is.
    Response(Response),
    /// An application-defined result.
    Custom(Box<dyn CustomResult>),
}

impl ActionResult {
    /// Executes the result into the response that goes back to the client.
    pub fn execute(&self) -> Response {
        match self {
            Self::Content(content) => content.execute(),
            Self::View(view) => view.execute(),
            Self::Cached(cached) => cached.execute(),
            Self::Response(response) => response.clone(),
            Self::Custom(custom) => custom.execute(),
        }
    }

    /// Returns the result's cacheable capability, if it declares one.
    pub fn as_cacheable(&self) -> Option<&dyn CacheableResult> {
        match self {
            Self::Cached(cached) => Some(cached as &dyn CacheableResult),
            Self::Custom(custom) => custom.as_cacheable(),
            _ => None,
        }
    }

    /// Returns the result viewed as plain content, if it is one.
    pub fn as_content(&self) -> Option<&ContentResult> {
        match self {
            Self::Content(content) => Some(content),
            Self::Custom(custom) => custom.as_content(),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&ViewResult> {
        match self {
            Self::View(view) => Some(view),
            _ => None,
        }
    }

    /// Short label used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Content(_) => "content",
            Self::View(_) => "view",
            Self::Cached(_) => "cached",
            Self::Response(_) => "response",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(content) => f.debug_tuple("Content").field(content).finish(),
            Self::View(view) => f.debug_tuple("View").field(view).finish(),
            Self::Cached(cached) => f.debug_tuple("Cached").field(cached).finish(),
            Self::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<ContentResult> for ActionResult {
    fn from(content: ContentResult) -> Self {
        Self::Content(content)
    }
}

impl From<ViewResult> for ActionResult {
    fn from(view: ViewResult) -> Self {
        Self::View(view)
    }
}

impl From<CachedResult> for ActionResult {
    fn from(cached: CachedResult) -> Self {
        Self::Cached(cached)
    }
}

impl From<Response> for ActionResult {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// A textual result: `200 OK` with the given content.
///
/// # Examples
///
/// ```
/// use outcache::action::ContentResult;
///
/// let result = ContentResult::new("<p>Hello</p>")
///     .with_content_type("text/html")
///     .with_encoding("utf-8");
///
/// let response = result.execute();
/// assert_eq!(response.headers().get("content-type"), Some("text/html; charset=utf-8"));
/// assert_eq!(response.body_ref(), b"<p>Hello</p>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentResult {
    content: String,
    content_type: Option<String>,
    content_encoding: Option<String>,
}

impl ContentResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: None,
            content_encoding: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn execute(&self) -> Response {
        let mut response = Response::new(StatusCode::Ok);
        if let Some(content_type) = &self.content_type {
            response.add_header(
                "Content-Type",
                content_type_value(content_type, self.content_encoding.as_deref()),
            );
        }
        response.body(self.content.clone())
    }
}

/// Something that renders to a response body, typically a template bound
/// to a model.
pub trait View: Send + Sync {
    fn render(&self) -> String;

    fn content_type(&self) -> &str {
        "text/html; charset=utf-8"
    }

    /// Views that can hand out a cacheable snapshot of their output
    /// override this.
    fn as_cacheable(&self) -> Option<&dyn CacheableResult> {
        None
    }
}

/// A result that renders a [`View`].
#[derive(Clone)]
pub struct ViewResult {
    view: Arc<dyn View>,
    status: StatusCode,
}

impl ViewResult {
    pub fn new(view: impl View + 'static) -> Self {
        Self::shared(Arc::new(view))
    }

    pub fn shared(view: Arc<dyn View>) -> Self {
        Self {
            view,
            status: StatusCode::Ok,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn view(&self) -> &dyn View {
        self.view.as_ref()
    }

    pub fn execute(&self) -> Response {
        Response::new(self.status)
            .header("Content-Type", self.view.content_type())
            .body(self.view.render())
    }
}

impl fmt::Debug for ViewResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewResult")
            .field("status", &self.status)
            .field("content_type", &self.view.content_type())
            .finish_non_exhaustive()
    }
}

/// An application-defined result type.
///
/// A custom result may be cacheable, may be plain content, or both. When it
/// is both, the output cache takes the cacheable snapshot.
pub trait CustomResult: Send + Sync {
    fn execute(&self) -> Response;

    fn as_cacheable(&self) -> Option<&dyn CacheableResult> {
        None
    }

    fn as_content(&self) -> Option<&ContentResult> {
        None
    }
}

/// Builds the `Content-Type` value for `content_type`, appending the
/// charset when an encoding is known and the type does not name one.
pub(crate) fn content_type_value(content_type: &str, encoding: Option<&str>) -> String {
    match encoding {
        Some(encoding) if !content_type.to_ascii_lowercase().contains("charset=") => {
            format!("{content_type}; charset={encoding}")
        }
        _ => content_type.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting;

    impl View for Greeting {
        fn render(&self) -> String {
            "<h1>hi</h1>".to_owned()
        }
    }

    #[test]
    fn content_without_type_sets_no_header() {
        let response = ContentResult::new("Hello").execute();
        assert!(response.headers().is_empty());
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_ref(), b"Hello");
    }

    #[test]
    fn explicit_charset_is_not_duplicated() {
        assert_eq!(
            content_type_value("text/html; Charset=latin1", Some("utf-8")),
            "text/html; Charset=latin1"
        );
        assert_eq!(content_type_value("text/csv", None), "text/csv");
    }

    #[test]
    fn view_result_renders_with_status() {
        let result = ActionResult::from(ViewResult::new(Greeting).with_status(StatusCode::Created));
        assert_eq!(result.kind(), "view");
        assert!(result.as_cacheable().is_none());

        let response = result.execute();
        assert_eq!(response.status(), StatusCode::Created);
        assert_eq!(
            response.headers().get("content-type"),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(response.body_ref(), b"<h1>hi</h1>");
    }

    #[test]
    fn plain_response_is_not_content() {
        let result = ActionResult::from(Response::new(StatusCode::NoContent));
        assert!(result.as_content().is_none());
        assert!(result.as_view().is_none());
        assert_eq!(result.execute().status(), StatusCode::NoContent);
    }
}
