//! Shared key/value storage for cached responses.
//!
//! [`CacheStore`] is the seam between the output-cache filter and whatever
//! holds the entries. [`MemoryStore`] is the in-process implementation.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{CachePolicy, CachedResponse, Expiration};

/// Failures of a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// A process-wide cache shared by every in-flight request.
///
/// # Contract
///
/// - Implementations **must** be safe to call concurrently from any number
///   of tasks; the filter performs no locking of its own.
/// - A `write` replaces the entry under `key` as a whole. Readers see either
///   the old entry or the new one, never a mix.
/// - `get` never returns an entry past its deadline, and returns an owned
///   snapshot the caller may keep.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError>;

    fn write(
        &self,
        key: &str,
        response: CachedResponse,
        policy: &CachePolicy,
    ) -> Result<(), StoreError>;

    /// Removes the entry under `key`. Returns `true` if one was present.
    fn invalidate(&self, key: &str) -> Result<bool, StoreError>;

    /// Removes every entry whose policy listed `dependency`. Returns how
    /// many entries were removed.
    fn invalidate_dependency(&self, dependency: &str) -> Result<usize, StoreError>;
}

// Deadlines the clock cannot represent are clamped to this far out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(now: Instant, lifetime: Duration) -> Instant {
    now.checked_add(lifetime).unwrap_or_else(|| now + FAR_FUTURE)
}

#[derive(Debug)]
struct Entry {
    response: CachedResponse,
    expiration: Expiration,
    deadline: Instant,
    dependencies: Vec<String>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// In-memory [`CacheStore`] backed by a read/write-locked hash map.
///
/// Deadlines are measured on the Tokio clock. Expired entries are dropped
/// lazily when they are looked up, by [`purge_expired`](Self::purge_expired),
/// or by the background task started with
/// [`spawn_sweeper`](Self::spawn_sweeper).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Spawns a Tokio task that purges expired entries every `every`.
    ///
    /// The task holds only a weak reference and ends on its own once the
    /// store is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged, "swept expired output-cache entries");
                }
            }
        })
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let now = Instant::now();

        // Live absolute entries are served under the shared lock.
        match self.entries.read().get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) && !entry.expiration.is_sliding() => {
                return Ok(Some(entry.response.clone()));
            }
            Some(_) => {}
        }

        // The entry may have been replaced or removed since the shared lock
        // was released.
        let mut entries = self.entries.write();
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            entries.remove(key);
            trace!(key, "dropped expired output-cache entry");
            return Ok(None);
        }

        Ok(entries.get_mut(key).map(|entry| {
            if entry.expiration.is_sliding() {
                entry.deadline = deadline_after(now, entry.expiration.duration());
            }
            entry.response.clone()
        }))
    }

    fn write(
        &self,
        key: &str,
        response: CachedResponse,
        policy: &CachePolicy,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            response,
            expiration: policy.expiration(),
            deadline: deadline_after(Instant::now(), policy.expiration().duration()),
            dependencies: policy.dependencies().to_vec(),
        };
        self.entries.write().insert(key.to_owned(), entry);
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn invalidate_dependency(&self, dependency: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.dependencies.iter().any(|d| d == dependency));
        Ok(before - entries.len())
    }
}
