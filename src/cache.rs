//! Cross-request caches keyed by namespace
//!
//! Unlike the per-request memoization inside [crate::ImageStream], these
//! caches are owned by the caller and shared by every request touching the
//! same namespace.

use crate::errors::CacheError;
use lru::LruCache;
use parking_lot::Mutex;
use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

/// A store of per-namespace object lists
pub trait ProjectObjectListStore<T>: Send + Sync {
    fn add(&self, namespace: &str, value: Arc<T>) -> Result<(), CacheError>;
    fn get(&self, namespace: &str) -> Option<Arc<T>>;
}

/// Builder for configuring a [ProjectObjectListCache]
#[derive(Clone, Debug)]
pub struct ProjectObjectListCacheBuilder {
    ttl: Duration,
    capacity: usize,
}

impl ProjectObjectListCacheBuilder {
    pub fn new() -> Self {
        ProjectObjectListCacheBuilder {
            ttl: Duration::from_secs(60),
            capacity: 1024,
        }
    }

    /// How long an entry stays valid after it is added, 60 seconds by default
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// How many namespaces can be cached at once, 1024 by default
    ///
    /// A capacity of zero disables caching: every `add` fails with
    /// [CacheError::Full].
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn build<T>(self) -> ProjectObjectListCache<T> {
        ProjectObjectListCache {
            ttl: self.ttl,
            entries: NonZeroUsize::new(self.capacity)
                .map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }
}

struct Entry<T> {
    value: Arc<T>,
    expires: Instant,
}

/// In-memory [ProjectObjectListStore] with expiring entries
///
/// Adding a new namespace to a full cache evicts the least recently used one.
/// Expired entries are dropped when they are next looked up.
pub struct ProjectObjectListCache<T> {
    ttl: Duration,
    entries: Option<Mutex<LruCache<String, Entry<T>>>>,
}

impl Default for ProjectObjectListCacheBuilder {
    fn default() -> Self {
        ProjectObjectListCacheBuilder::new()
    }
}

impl<T> ProjectObjectListCache<T> {
    pub fn new() -> Self {
        ProjectObjectListCacheBuilder::new().build()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ProjectObjectListCache<T> {
    fn default() -> Self {
        ProjectObjectListCache::new()
    }
}

impl<T: Send + Sync> ProjectObjectListStore<T> for ProjectObjectListCache<T> {
    fn add(&self, namespace: &str, value: Arc<T>) -> Result<(), CacheError> {
        let entries = match &self.entries {
            Some(entries) => entries,
            None => return Err(CacheError::Full(namespace.to_owned())),
        };
        let entry = Entry {
            value,
            expires: Instant::now() + self.ttl,
        };
        if let Some((evicted, _)) = entries.lock().push(namespace.to_owned(), entry) {
            if evicted != namespace {
                log::trace!("evicted cached namespace {:?}", evicted);
            }
        }
        Ok(())
    }

    fn get(&self, namespace: &str) -> Option<Arc<T>> {
        let mut entries = self.entries.as_ref()?.lock();
        let entry = entries.get(namespace)?;
        if entry.expires > Instant::now() {
            return Some(entry.value.clone());
        }
        entries.pop(namespace);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get() {
        let cache: ProjectObjectListCache<Vec<u32>> = ProjectObjectListCache::new();
        assert!(cache.get("team").is_none());
        cache.add("team", Arc::new(vec![1, 2])).unwrap();
        assert_eq!(*cache.get("team").unwrap(), vec![1, 2]);
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn entries_expire() {
        let cache: ProjectObjectListCache<u32> = ProjectObjectListCacheBuilder::new()
            .ttl(Duration::from_secs(0))
            .build();
        cache.add("team", Arc::new(1)).unwrap();
        assert!(cache.get("team").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_evicts_least_recently_used() {
        let cache: ProjectObjectListCache<u32> =
            ProjectObjectListCacheBuilder::new().capacity(2).build();
        cache.add("a", Arc::new(1)).unwrap();
        cache.add("b", Arc::new(2)).unwrap();
        for _ in 0..3 {
            assert_eq!(*cache.get("a").unwrap(), 1);
        }
        cache.add("c", Arc::new(3)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get("c").unwrap(), 3);
        assert_eq!(*cache.get("a").unwrap(), 1);
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn full_cache_replaces_existing_namespace() {
        let cache: ProjectObjectListCache<u32> =
            ProjectObjectListCacheBuilder::new().capacity(1).build();
        cache.add("a", Arc::new(1)).unwrap();
        cache.add("a", Arc::new(3)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get("a").unwrap(), 3);
        cache.add("b", Arc::new(2)).unwrap();
        assert!(cache.get("a").is_none());
        assert_eq!(*cache.get("b").unwrap(), 2);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let cache: ProjectObjectListCache<u32> =
            ProjectObjectListCacheBuilder::new().capacity(0).build();
        assert_eq!(
            cache.add("a", Arc::new(1)),
            Err(CacheError::Full("a".to_owned()))
        );
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }
}
