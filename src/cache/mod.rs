//! Output caching: serve stored responses instead of re-running handlers.
//!
//! ## Pieces
//!
//! - [`CachedResponse`]: the storable form of a response.
//! - [`CachePolicy`]: lifetime and invalidation tags of an entry.
//! - [`CachePolicyProvider`]: per-request key and policy strategy;
//!   [`DefaultPolicyResolver`] is the application-wide default.
//! - [`CacheStore`]: the shared key/value store; [`MemoryStore`] keeps
//!   entries in process.
//! - [`OutputCacheFilter`]: the [`ActionFilter`](crate::action::ActionFilter)
//!   that ties them together.
//! - [`OutputCache`]: owns the shared store and default provider, and hands
//!   out filters.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use outcache::action::{Action, ActionResult, ContentResult};
//! use outcache::cache::OutputCache;
//! use outcache::config::CacheConfig;
//! use outcache::Context;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = OutputCache::from_config(CacheConfig::default(), Default::default())?;
//!
//! let product = Action::new(|ctx: Arc<Context>| async move {
//!     ActionResult::from(ContentResult::new(format!("product page for {}", ctx.request().path())))
//! })
//! .filter(cache.filter());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::{CacheConfig, ConfigError};

pub mod filter;
pub mod policy;
pub mod provider;
pub mod response;
pub mod store;

pub use filter::{CacheOutcome, OutputCacheFilter, SkipReason, extract_cached_response};
pub use policy::{CachePolicy, Expiration};
pub use provider::{CachePolicyProvider, DefaultPolicyResolver, PolicyProviderRegistry, ProviderFactory};
pub use response::{CacheableResult, CachedResponse, CachedResult};
pub use store::{CacheStore, MemoryStore, StoreError};

/// The application's output cache: one shared store, one default policy
/// provider, and the registry of named providers.
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct OutputCache {
    store: Arc<dyn CacheStore>,
    default_provider: Arc<dyn CachePolicyProvider>,
    registry: PolicyProviderRegistry,
    config: CacheConfig,
}

impl OutputCache {
    pub fn new(store: Arc<dyn CacheStore>, default_provider: Arc<dyn CachePolicyProvider>) -> Self {
        Self {
            store,
            default_provider,
            registry: PolicyProviderRegistry::new(),
            config: CacheConfig::default(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: PolicyProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Builds the output cache described by `config`.
    ///
    /// Creates an in-memory store and, unless `policy_provider` names a
    /// provider from `registry`, a [`DefaultPolicyResolver`]. Starts the
    /// expiry sweeper when `sweep_interval_secs` is set.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Invalid`]: `config` fails validation, or a sweeper
    ///   is requested outside a Tokio runtime.
    /// - [`ConfigError::UnknownPolicyProvider`]: `policy_provider` is not
    ///   registered.
    pub fn from_config(
        config: CacheConfig,
        registry: PolicyProviderRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let default_provider: Arc<dyn CachePolicyProvider> = match &config.policy_provider {
            Some(name) => registry.resolve(name, &config)?,
            None => Arc::new(DefaultPolicyResolver::new(&config)),
        };

        let memory = Arc::new(MemoryStore::new());
        if let Some(every) = config.sweep_interval() {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(ConfigError::Invalid {
                    field: "sweep_interval_secs",
                    reason: "the expiry sweeper needs a running Tokio runtime".to_owned(),
                });
            }
            let _sweeper = memory.spawn_sweeper(every);
        }

        info!(
            enabled = config.enabled,
            ttl_secs = config.default_ttl_secs,
            sliding = config.sliding_expiration,
            provider = config.policy_provider.as_deref().unwrap_or("default"),
            "output cache configured"
        );

        Ok(Self {
            store: memory,
            default_provider,
            registry,
            config,
        })
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// A filter using the application's default provider.
    pub fn filter(&self) -> OutputCacheFilter {
        OutputCacheFilter::new(Arc::clone(&self.store), Arc::clone(&self.default_provider))
    }

    /// A filter using `provider` instead of the default.
    pub fn filter_with(&self, provider: impl CachePolicyProvider + 'static) -> OutputCacheFilter {
        OutputCacheFilter::new(Arc::clone(&self.store), Arc::new(provider))
    }

    /// A filter using the provider registered as `name`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownPolicyProvider`] if nothing is registered under
    /// `name`. This is raised here, when the filter is attached, not when a
    /// request arrives.
    pub fn filter_named(&self, name: &str) -> Result<OutputCacheFilter, ConfigError> {
        let provider = self.registry.resolve(name, &self.config)?;
        Ok(OutputCacheFilter::new(Arc::clone(&self.store), provider))
    }
}
