//! The output-cache filter.
//!
//! Per request the filter moves through these states:
//!
//! ```text
//! Init ─▶ KeyComputed ─┬─▶ ServedFromCache
//!                      └─▶ Executing ─▶ ResultProduced ─┬─▶ CacheWritten
//!                                                       └─▶ CacheSkipped
//! ```
//!
//! A request without a key skips straight from `Init` to normal execution
//! and is never written.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::{CachePolicyProvider, CacheStore, CachedResponse, StoreError};
use crate::action::{ActionFilter, ActionResult, FilterError};
use crate::context::Context;

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(0);

/// Keys computed by the pre-execution hooks, one slot per filter, kept for
/// the matching post-execution hook to compare against.
#[derive(Debug, Default)]
struct LookupKeys(HashMap<u64, Option<String>>);

/// Why a produced result was not written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The result has no cacheable form.
    NotCacheable,
    /// The result belongs to a child action.
    ChildAction,
    /// The provider produced no key for this request.
    NoKey,
    /// The provider produced a different key than before the handler ran.
    KeyChanged,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotCacheable => "result is not cacheable",
            Self::ChildAction => "child action",
            Self::NoKey => "no cache key",
            Self::KeyChanged => "cache key changed during execution",
        })
    }
}

/// What the post-execution hook did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The response was stored under `key`.
    Written { key: String },
    /// Nothing was stored.
    Skipped(SkipReason),
}

/// Serves cached responses before the handler runs and captures fresh
/// ones after it.
///
/// Filters are normally obtained from [`OutputCache`](super::OutputCache),
/// which supplies the shared store and the application's default provider.
/// Several filters may wrap the same action; each keeps its own lookup key.
/// Clones share the key slot of the filter they were cloned from.
#[derive(Clone)]
pub struct OutputCacheFilter {
    id: u64,
    store: Arc<dyn CacheStore>,
    provider: Arc<dyn CachePolicyProvider>,
}

impl OutputCacheFilter {
    pub fn new(store: Arc<dyn CacheStore>, provider: Arc<dyn CachePolicyProvider>) -> Self {
        Self {
            id: NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed),
            store,
            provider,
        }
    }

    fn remember_key(&self, ctx: &mut Context, key: Option<String>) {
        let extensions = ctx.extensions_mut();
        match extensions.get_mut::<LookupKeys>() {
            Some(keys) => {
                keys.0.insert(self.id, key);
            }
            None => {
                extensions.insert(LookupKeys(HashMap::from([(self.id, key)])));
            }
        }
    }

    /// Looks the request up in the store. `Ok(None)` covers both a miss and
    /// a request the provider opted out.
    pub fn lookup(&self, ctx: &Context) -> Result<Option<CachedResponse>, StoreError> {
        match self.provider.cache_key(ctx) {
            Some(key) => self.store.get(&key),
            None => Ok(None),
        }
    }

    /// Captures `result` for the request in `ctx`, if it qualifies.
    pub fn store_result(
        &self,
        ctx: &Context,
        result: &ActionResult,
    ) -> Result<CacheOutcome, StoreError> {
        let Some(cached) = extract_cached_response(result) else {
            return Ok(CacheOutcome::Skipped(SkipReason::NotCacheable));
        };

        // A child action's output is part of its parent's page and has no
        // address of its own.
        if ctx.is_child_action() {
            return Ok(CacheOutcome::Skipped(SkipReason::ChildAction));
        }

        let key = self.provider.cache_key(ctx);
        let earlier = ctx
            .extensions()
            .get::<LookupKeys>()
            .and_then(|keys| keys.0.get(&self.id));
        if let Some(earlier) = earlier {
            if *earlier != key {
                warn!(
                    before = ?earlier,
                    after = ?key,
                    "cache key changed between lookup and write; not caching"
                );
                return Ok(CacheOutcome::Skipped(SkipReason::KeyChanged));
            }
        }
        let Some(key) = key else {
            return Ok(CacheOutcome::Skipped(SkipReason::NoKey));
        };

        let policy = self.provider.policy(ctx, &cached);
        self.store.write(&key, cached, &policy)?;
        Ok(CacheOutcome::Written { key })
    }
}

impl ActionFilter for OutputCacheFilter {
    fn on_action_executing(&self, ctx: &mut Context) -> Result<Option<ActionResult>, FilterError> {
        let key = self.provider.cache_key(ctx);
        self.remember_key(ctx, key.clone());

        let Some(key) = key else {
            debug!(path = %ctx.request().path(), "no cache key; output cache bypassed");
            return Ok(None);
        };

        match self.store.get(&key)? {
            Some(cached) => {
                debug!(%key, "output cache hit");
                Ok(Some(cached.to_cached_result()))
            }
            None => {
                debug!(%key, "output cache miss");
                Ok(None)
            }
        }
    }

    fn on_result_executed(&self, ctx: &Context, result: &ActionResult) -> Result<(), FilterError> {
        match self.store_result(ctx, result)? {
            CacheOutcome::Written { key } => {
                debug!(%key, kind = result.kind(), "response written to output cache");
            }
            CacheOutcome::Skipped(reason) => {
                debug!(%reason, kind = result.kind(), "response not cached");
            }
        }
        Ok(())
    }
}

/// Extracts the storable form of `result`.
///
/// Tried in order:
///
/// 1. the result's own cacheable capability;
/// 2. for a view result, the view's cacheable capability;
/// 3. for a content result, a snapshot of its content, encoding and content type.
///
/// Anything else yields `None`.
pub fn extract_cached_response(result: &ActionResult) -> Option<CachedResponse> {
    if let Some(cacheable) = result.as_cacheable() {
        return cacheable.cached_response();
    }
    if let Some(cacheable) = result.as_view().and_then(|view| view.view().as_cacheable()) {
        return cacheable.cached_response();
    }
    result.as_content().map(CachedResponse::from_content)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::action::{Action, ContentResult, CustomResult, View, ViewResult};
    use crate::cache::{CachePolicy, CacheableResult, DefaultPolicyResolver, MemoryStore};
    use crate::http::{Method, Request, Response, StatusCode};

    struct Snapshot(CachedResponse);

    impl CacheableResult for Snapshot {
        fn cached_response(&self) -> Option<CachedResponse> {
            Some(self.0.clone())
        }
    }

    // Both plain content and self-declared cacheable.
    struct Hybrid {
        content: ContentResult,
        snapshot: Snapshot,
    }

    impl CustomResult for Hybrid {
        fn execute(&self) -> Response {
            self.content.execute()
        }

        fn as_cacheable(&self) -> Option<&dyn CacheableResult> {
            Some(&self.snapshot as &dyn CacheableResult)
        }

        fn as_content(&self) -> Option<&ContentResult> {
            Some(&self.content)
        }
    }

    struct CachingView(Snapshot);

    impl View for CachingView {
        fn render(&self) -> String {
            "rendered".to_owned()
        }

        fn as_cacheable(&self) -> Option<&dyn CacheableResult> {
            Some(&self.0 as &dyn CacheableResult)
        }
    }

    struct PlainView;

    impl View for PlainView {
        fn render(&self) -> String {
            "plain".to_owned()
        }
    }

    // Hands out a different key on every call.
    struct Unstable(std::sync::atomic::AtomicUsize);

    impl CachePolicyProvider for Unstable {
        fn cache_key(&self, _ctx: &Context) -> Option<String> {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Some(format!("k{n}"))
        }

        fn policy(&self, _ctx: &Context, _response: &CachedResponse) -> CachePolicy {
            CachePolicy::absolute(Duration::from_secs(1))
        }
    }

    // Always the same key.
    struct Fixed(&'static str);

    impl CachePolicyProvider for Fixed {
        fn cache_key(&self, _ctx: &Context) -> Option<String> {
            Some(self.0.to_owned())
        }

        fn policy(&self, _ctx: &Context, _response: &CachedResponse) -> CachePolicy {
            CachePolicy::absolute(Duration::from_secs(60))
        }
    }

    fn snapshot(body: &'static str) -> Snapshot {
        Snapshot(CachedResponse::new(StatusCode::Ok, body))
    }

    fn filter() -> (OutputCacheFilter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let filter = OutputCacheFilter::new(
            Arc::clone(&store) as Arc<dyn CacheStore>,
            Arc::new(DefaultPolicyResolver::default()),
        );
        (filter, store)
    }

    fn get(path: &str) -> Context {
        Context::new(Request::new(Method::Get, path))
    }

    #[test]
    fn capability_wins_over_content_fallback() {
        let result = ActionResult::Custom(Box::new(Hybrid {
            content: ContentResult::new("as content"),
            snapshot: snapshot("as snapshot"),
        }));
        let cached = extract_cached_response(&result).unwrap();
        assert_eq!(cached.body().as_ref(), b"as snapshot");
    }

    #[test]
    fn view_capability_is_used() {
        let result = ActionResult::from(ViewResult::new(CachingView(snapshot("from view"))));
        let cached = extract_cached_response(&result).unwrap();
        assert_eq!(cached.body().as_ref(), b"from view");

        let plain = ActionResult::from(ViewResult::new(PlainView));
        assert_eq!(extract_cached_response(&plain), None);
    }

    #[test]
    fn content_is_snapshotted() {
        let result = ActionResult::from(ContentResult::new("Hello").with_content_type("text/plain"));
        let cached = extract_cached_response(&result).unwrap();
        assert_eq!(cached.body().as_ref(), b"Hello");
        assert_eq!(cached.headers().get("content-type"), Some("text/plain"));
    }

    #[test]
    fn raw_responses_are_not_cacheable() {
        let result = ActionResult::from(Response::new(StatusCode::Ok).body("x"));
        assert_eq!(extract_cached_response(&result), None);
    }

    #[tokio::test]
    async fn child_actions_are_never_written() {
        let (filter, store) = filter();
        let ctx = Context::child(Request::new(Method::Get, "/widgets/cart"));
        let outcome = filter
            .store_result(&ctx, &ActionResult::from(ContentResult::new("3 items")))
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Skipped(SkipReason::ChildAction));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn uncacheable_results_are_skipped_before_key_derivation() {
        let unstable = Arc::new(Unstable(Default::default()));
        let filter = OutputCacheFilter::new(Arc::new(MemoryStore::new()), unstable.clone());
        let outcome = filter
            .store_result(&get("/"), &ActionResult::from(Response::new(StatusCode::Ok)))
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Skipped(SkipReason::NotCacheable));
        assert_eq!(unstable.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn opted_out_requests_touch_nothing() {
        let (filter, store) = filter();
        let mut ctx = Context::new(Request::new(Method::Post, "/orders"));

        assert!(filter.on_action_executing(&mut ctx).unwrap().is_none());
        let outcome = filter
            .store_result(&ctx, &ActionResult::from(ContentResult::new("created")))
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Skipped(SkipReason::NoKey));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn hit_short_circuits_with_stored_response() {
        let (filter, store) = filter();
        let stored = CachedResponse::new(StatusCode::Ok, "Hello").with_header("X-Cache", "1");
        store
            .write("products:42", stored.clone(), &CachePolicy::absolute(Duration::from_secs(60)))
            .unwrap();

        let mut ctx = get("/products/42");
        let result = filter.on_action_executing(&mut ctx).unwrap().unwrap();

        assert_eq!(extract_cached_response(&result), Some(stored));
        assert_eq!(filter.lookup(&ctx).unwrap().unwrap().body().as_ref(), b"Hello");
    }

    #[tokio::test]
    async fn miss_then_write_under_the_same_key() {
        let (filter, store) = filter();
        let mut ctx = get("/products/42");

        assert!(filter.on_action_executing(&mut ctx).unwrap().is_none());
        let outcome = filter
            .store_result(&ctx, &ActionResult::from(ContentResult::new("Hello")))
            .unwrap();

        assert_eq!(
            outcome,
            CacheOutcome::Written { key: "products:42".to_owned() }
        );
        assert_eq!(store.get("products:42").unwrap().unwrap().body().as_ref(), b"Hello");
    }

    #[tokio::test]
    async fn unstable_keys_are_not_written() {
        let store = Arc::new(MemoryStore::new());
        let filter = OutputCacheFilter::new(
            Arc::clone(&store) as Arc<dyn CacheStore>,
            Arc::new(Unstable(Default::default())),
        );
        let mut ctx = get("/");

        assert!(filter.on_action_executing(&mut ctx).unwrap().is_none());
        let outcome = filter
            .store_result(&ctx, &ActionResult::from(ContentResult::new("x")))
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Skipped(SkipReason::KeyChanged));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn stacked_filters_each_write_under_their_own_key() {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn CacheStore> = Arc::clone(&store) as Arc<dyn CacheStore>;
        let action = Action::new(|_ctx: Arc<Context>| async {
            ActionResult::from(ContentResult::new("page"))
        })
        .filter(OutputCacheFilter::new(Arc::clone(&shared), Arc::new(Fixed("a"))))
        .filter(OutputCacheFilter::new(shared, Arc::new(Fixed("b"))));

        action.invoke(get("/")).await;

        assert!(store.get("a").unwrap().is_some());
        assert!(store.get("b").unwrap().is_some());
    }
}
