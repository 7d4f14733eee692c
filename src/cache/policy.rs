//! How long a cached response stays valid, and what can invalidate it early.

use std::time::Duration;

/// When an entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// A fixed lifetime counted from the write.
    Absolute(Duration),
    /// An idle window: every hit pushes the deadline forward by this much.
    Sliding(Duration),
}

impl Expiration {
    pub fn duration(&self) -> Duration {
        match *self {
            Self::Absolute(d) | Self::Sliding(d) => d,
        }
    }

    pub fn is_sliding(&self) -> bool {
        matches!(self, Self::Sliding(_))
    }
}

/// The policy an entry is written under.
///
/// Dependencies are opaque tags, typically identifiers of the upstream
/// content the response was built from. Invalidating a tag through
/// [`CacheStore::invalidate_dependency`](super::CacheStore::invalidate_dependency)
/// drops every entry that listed it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use outcache::cache::{CachePolicy, Expiration};
///
/// let policy = CachePolicy::absolute(Duration::from_secs(60))
///     .depends_on("product:42")
///     .depends_on("catalog");
///
/// assert_eq!(policy.expiration(), Expiration::Absolute(Duration::from_secs(60)));
/// assert_eq!(policy.dependencies(), ["product:42", "catalog"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    expiration: Expiration,
    dependencies: Vec<String>,
}

impl CachePolicy {
    pub fn new(expiration: Expiration) -> Self {
        Self {
            expiration,
            dependencies: Vec::new(),
        }
    }

    pub fn absolute(ttl: Duration) -> Self {
        Self::new(Expiration::Absolute(ttl))
    }

    pub fn sliding(window: Duration) -> Self {
        Self::new(Expiration::Sliding(window))
    }

    /// Adds an invalidation tag. Duplicate tags are ignored.
    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn expiration(&self) -> Expiration {
        self.expiration
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}
