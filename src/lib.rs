//! # outcache
//!
//! Output caching for async request handlers: the rendered output of an
//! action is captured after it runs, stored under a key derived from the
//! request, and replayed on later requests without running the action again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use outcache::action::{Action, ActionResult, ContentResult};
//! use outcache::cache::{OutputCache, PolicyProviderRegistry};
//! use outcache::config::CacheConfig;
//! use outcache::{Context, Method, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = OutputCache::from_config(CacheConfig::default(), PolicyProviderRegistry::new())?;
//!
//!     let hello = Action::new(|_ctx: Arc<Context>| async {
//!         ActionResult::from(ContentResult::new("Hello").with_content_type("text/plain"))
//!     })
//!     .filter(cache.filter());
//!
//!     // Runs the handler and stores "Hello" under `products:42`.
//!     let first = hello.invoke(Context::new(Request::new(Method::Get, "/products/42"))).await;
//!     // Served from the cache for the next 60 seconds.
//!     let second = hello.invoke(Context::new(Request::new(Method::Get, "/products/42"))).await;
//!     assert_eq!(first, second);
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod cache;
pub mod config;
pub mod context;
pub mod http;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use action::{Action, ActionFilter, ActionResult};
pub use cache::{OutputCache, OutputCacheFilter};
pub use config::CacheConfig;
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
