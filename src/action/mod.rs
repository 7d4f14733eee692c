//! Action pipeline: an async handler wrapped by ordered filters.
//!
//! An [`Action`] is the unit the host application dispatches a request to.
//! Each [`ActionFilter`] gets two callbacks around the handler:
//!
//! - [`ActionFilter::on_action_executing`] runs before the handler, in
//!   registration order. Returning a result short-circuits: the handler and
//!   every remaining hook are skipped and that result is sent instead.
//! - [`ActionFilter::on_result_executed`] runs after the handler's result has
//!   been executed into a response, in reverse registration order.
//!
//! Filter hooks are synchronous; the only suspension point in an invocation
//! is the handler itself.

use std::{future::Future, pin::Pin, sync::Arc};

use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info};

use crate::cache::StoreError;
use crate::context::Context;
use crate::http::{Response, StatusCode};

pub mod result;

pub use result::{ActionResult, ContentResult, CustomResult, View, ViewResult};

/// Errors a filter hook can raise. These are infrastructure faults; the
/// invocation answers `500 Internal Server Error`.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("cache store failure: {0}")]
    Store(#[from] StoreError),
}

/// A hook pair wrapped around an action's handler.
///
/// Both hooks default to doing nothing, so a filter only implements the side
/// it cares about.
pub trait ActionFilter: Send + Sync {
    /// Called before the handler. `Ok(Some(result))` replaces the handler's
    /// result and ends the invocation.
    fn on_action_executing(&self, ctx: &mut Context) -> Result<Option<ActionResult>, FilterError> {
        let _ = ctx;
        Ok(None)
    }

    /// Called once the handler's result has been executed into a response.
    fn on_result_executed(&self, ctx: &Context, result: &ActionResult) -> Result<(), FilterError> {
        let _ = (ctx, result);
        Ok(())
    }
}

/// Type-erased, heap-allocated async handler producing an [`ActionResult`].
pub type ActionHandler = Arc<
    dyn Fn(Arc<Context>) -> Pin<Box<dyn Future<Output = ActionResult> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Arc<Context>) -> impl Future<Output = ActionResult> + Send` that is
/// also `Send + Sync + 'static` implements this trait through the blanket impl.
pub trait IntoAction: Send + Sync + 'static {
    fn call(&self, ctx: Arc<Context>) -> Pin<Box<dyn Future<Output = ActionResult> + Send>>;
}

impl<T, F> IntoAction for T
where
    T: Fn(Arc<Context>) -> F + Send + Sync + 'static,
    F: Future<Output = ActionResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<Context>) -> Pin<Box<dyn Future<Output = ActionResult> + Send>> {
        Box::pin((self)(ctx))
    }
}

/// A handler plus the filters wrapped around it.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use outcache::action::{Action, ActionResult, ContentResult};
/// use outcache::{Context, Method, Request};
///
/// # async fn example() {
/// let action = Action::new(|_ctx: Arc<Context>| async {
///     ActionResult::from(ContentResult::new("Hello"))
/// });
/// let response = action.invoke(Context::new(Request::new(Method::Get, "/"))).await;
/// assert_eq!(response.body_ref(), b"Hello");
/// # }
/// ```
pub struct Action {
    handler: ActionHandler,
    filters: Vec<Arc<dyn ActionFilter>>,
}

impl Action {
    pub fn new(handler: impl IntoAction) -> Self {
        let handler: ActionHandler = Arc::new(move |ctx| handler.call(ctx));
        Self {
            handler,
            filters: Vec::new(),
        }
    }

    /// Appends a filter. Filters run their pre-execution hooks in the order
    /// they were added.
    #[must_use]
    pub fn filter(self, filter: impl ActionFilter + 'static) -> Self {
        self.shared_filter(Arc::new(filter))
    }

    /// Appends a filter shared with other actions.
    #[must_use]
    pub fn shared_filter(mut self, filter: Arc<dyn ActionFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Runs the action for one request and returns the response to send.
    pub async fn invoke(&self, ctx: Context) -> Response {
        let start = Instant::now();
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_owned();
        let child = ctx.is_child_action();

        let response = match self.try_invoke(ctx).await {
            Ok(response) => response,
            Err(e) => {
                error!(%method, %path, error = %e, "action filter failed");
                Response::new(StatusCode::InternalServerError).body("Internal Server Error")
            }
        };

        info!(
            %method,
            %path,
            child,
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "action invoked"
        );
        response
    }

    async fn try_invoke(&self, mut ctx: Context) -> Result<Response, FilterError> {
        for filter in &self.filters {
            if let Some(result) = filter.on_action_executing(&mut ctx)? {
                return Ok(result.execute());
            }
        }

        let ctx = Arc::new(ctx);
        let result = (self.handler)(Arc::clone(&ctx)).await;
        let response = result.execute();

        for filter in self.filters.iter().rev() {
            filter.on_result_executed(&ctx, &result)?;
        }

        Ok(response)
    }
}
