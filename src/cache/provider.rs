//! Cache key and cache policy derivation.
//!
//! A [`CachePolicyProvider`] decides, per request, whether the output cache
//! applies (by producing a key or not) and how long a captured response
//! lives. [`DefaultPolicyResolver`] is the application-wide provider built
//! from [`CacheConfig`]; [`PolicyProviderRegistry`] lets configuration pick
//! a custom provider by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{CachePolicy, CachedResponse};
use crate::config::{CacheConfig, ConfigError};
use crate::context::Context;
use crate::http::{Method, Request};

/// Strategy computing the cache key and cache policy for a request.
///
/// # Contract
///
/// - `cache_key` **must** be deterministic and free of side effects: the
///   output-cache filter calls it once before the handler runs and again
///   after, and only writes when both calls agree.
/// - `None` from `cache_key` opts the request out entirely: no lookup, no
///   write.
/// - The key **must** cover everything that changes the response (path,
///   query, negotiated headers, ...).
/// - `policy` receives the captured response, so lifetime and dependency
///   tags may depend on the content.
pub trait CachePolicyProvider: Send + Sync {
    fn cache_key(&self, ctx: &Context) -> Option<String>;

    fn policy(&self, ctx: &Context, response: &CachedResponse) -> CachePolicy;
}

impl<P: CachePolicyProvider + ?Sized> CachePolicyProvider for Arc<P> {
    fn cache_key(&self, ctx: &Context) -> Option<String> {
        (**self).cache_key(ctx)
    }

    fn policy(&self, ctx: &Context, response: &CachedResponse) -> CachePolicy {
        (**self).policy(ctx, response)
    }
}

/// The provider used when an action does not bring its own.
///
/// Keys are built from the request:
///
/// | Request                                   | Key                     |
/// |-------------------------------------------|-------------------------|
/// | `GET /products/42`                        | `products:42`           |
/// | `GET /`                                   | `index`                 |
/// | `GET /search?q=rust&page=2`               | `search?page=2&q=rust`  |
/// | `GET /` with `Accept-Language: de` varied | `index\|accept-language=de` |
///
/// No key is produced when caching is disabled, when the method is not
/// cacheable, or when the request says `Cache-Control: no-store` or
/// `no-cache`.
#[derive(Debug, Clone)]
pub struct DefaultPolicyResolver {
    enabled: bool,
    methods: Vec<Method>,
    vary_by: Vec<String>,
    policy: CachePolicy,
}

impl DefaultPolicyResolver {
    pub fn new(config: &CacheConfig) -> Self {
        let policy = if config.sliding_expiration {
            CachePolicy::sliding(config.default_ttl())
        } else {
            CachePolicy::absolute(config.default_ttl())
        };
        Self {
            enabled: config.enabled,
            methods: config
                .cacheable_methods
                .iter()
                .map(|m| m.to_ascii_uppercase().parse::<Method>().unwrap_or_else(|never| match never {}))
                .collect(),
            vary_by: config
                .vary_by_headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            policy,
        }
    }

    /// Derives the key for `request`, ignoring the opt-out rules.
    pub fn request_key(&self, request: &Request) -> String {
        let trimmed = request.path().trim_matches('/');
        let mut key = if trimmed.is_empty() {
            "index".to_owned()
        } else {
            trimmed.replace('/', ":")
        };

        if let Some(query) = request.query_string() {
            let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
            if !pairs.is_empty() {
                pairs.sort_unstable();
                key.push('?');
                key.push_str(&pairs.join("&"));
            }
        }

        for name in &self.vary_by {
            if let Some(value) = request.headers().get(name) {
                key.push('|');
                key.push_str(name);
                key.push('=');
                key.push_str(value);
            }
        }

        key
    }

    fn bypasses_cache(request: &Request) -> bool {
        request
            .headers()
            .get_all("cache-control")
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .any(|d| d.eq_ignore_ascii_case("no-store") || d.eq_ignore_ascii_case("no-cache"))
    }
}

impl Default for DefaultPolicyResolver {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl CachePolicyProvider for DefaultPolicyResolver {
    fn cache_key(&self, ctx: &Context) -> Option<String> {
        let request = ctx.request();
        if !self.enabled
            || !self.methods.contains(request.method())
            || Self::bypasses_cache(request)
        {
            return None;
        }
        Some(self.request_key(request))
    }

    fn policy(&self, _ctx: &Context, _response: &CachedResponse) -> CachePolicy {
        self.policy.clone()
    }
}

/// Builds a provider instance from the active configuration.
pub type ProviderFactory =
    Arc<dyn Fn(&CacheConfig) -> Arc<dyn CachePolicyProvider> + Send + Sync + 'static>;

/// Named policy-provider factories, consulted when configuration selects a
/// provider by name.
///
/// # Examples
///
/// ```
/// use outcache::cache::{DefaultPolicyResolver, PolicyProviderRegistry};
/// use outcache::config::{CacheConfig, ConfigError};
///
/// let mut registry = PolicyProviderRegistry::new();
/// registry.register_default::<DefaultPolicyResolver>("stock");
///
/// let config = CacheConfig::default();
/// assert!(registry.resolve("stock", &config).is_ok());
/// assert!(matches!(
///     registry.resolve("missing", &config),
///     Err(ConfigError::UnknownPolicyProvider { .. })
/// ));
/// ```
#[derive(Clone, Default)]
pub struct PolicyProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl PolicyProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&CacheConfig) -> Arc<dyn CachePolicyProvider> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registers a provider type that needs no configuration.
    pub fn register_default<P>(&mut self, name: impl Into<String>)
    where
        P: CachePolicyProvider + Default + 'static,
    {
        self.register(name, |_config: &CacheConfig| {
            Arc::new(P::default()) as Arc<dyn CachePolicyProvider>
        });
    }

    /// Instantiates the provider registered under `name`.
    pub fn resolve(
        &self,
        name: &str,
        config: &CacheConfig,
    ) -> Result<Arc<dyn CachePolicyProvider>, ConfigError> {
        self.factories
            .get(name)
            .map(|factory| factory(config))
            .ok_or_else(|| ConfigError::UnknownPolicyProvider {
                name: name.to_owned(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl fmt::Debug for PolicyProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("PolicyProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}
