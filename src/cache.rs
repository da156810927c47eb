use std::{
    num::NonZeroUsize,
    sync::Mutex,
    time::{Duration, Instant},
};

use lru::LruCache;

use crate::{evaluator::Evaluate, snapshot::VariantValue, Result};

/// Memoizes successful evaluations of an inner [`Evaluate`] for a bounded time.
///
/// Only calls with an entity id are cached: anonymous evaluations are random by definition. Errors
/// are never cached. A cached result may outlive a configuration refresh by up to the TTL.
pub struct CachedEvaluator<E> {
    inner: E,
    ttl: Duration,
    entries: Mutex<LruCache<(String, String), CacheEntry>>,
}

struct CacheEntry {
    variant: VariantValue,
    inserted_at: Instant,
}

impl<E: Evaluate> CachedEvaluator<E> {
    /// Default maximum number of cached results.
    pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
        Some(capacity) => capacity,
        None => unreachable!(),
    };

    /// Default time a cached result is served for.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

    /// Wrap `inner` with [`DEFAULT_CAPACITY`](Self::DEFAULT_CAPACITY) and
    /// [`DEFAULT_TTL`](Self::DEFAULT_TTL).
    pub fn new(inner: E) -> CachedEvaluator<E> {
        CachedEvaluator::with_capacity(inner, Self::DEFAULT_CAPACITY, Self::DEFAULT_TTL)
    }

    /// Wrap `inner`, holding at most `capacity` results for `ttl` each.
    pub fn with_capacity(
        inner: E,
        capacity: NonZeroUsize,
        ttl: Duration,
    ) -> CachedEvaluator<E> {
        CachedEvaluator {
            inner,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The wrapped evaluator.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Number of entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all cached results.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<(String, String), CacheEntry>> {
        // A poisoned cache is still a valid cache.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, key: &(String, String)) -> Option<VariantValue> {
        let mut entries = self.lock();
        let expired = entries
            .get(key)
            .map(|entry| entry.inserted_at.elapsed() >= self.ttl)?;
        if expired {
            entries.pop(key);
            return None;
        }
        entries.peek(key).map(|entry| entry.variant.clone())
    }
}

impl<E: Evaluate> Evaluate for CachedEvaluator<E> {
    fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue> {
        let Some(entity_id) = entity_id else {
            return self.inner.evaluate(feature_key, None);
        };

        let key = (feature_key.to_owned(), entity_id.to_owned());
        if let Some(variant) = self.lookup(&key) {
            log::trace!(target: "featuresheet", feature_key, entity_id; "evaluation served from cache");
            return Ok(variant);
        }

        // Evaluate without holding the lock: the inner evaluator may be a network call.
        let variant = self.inner.evaluate(feature_key, Some(entity_id))?;
        self.lock().put(
            key,
            CacheEntry {
                variant: variant.clone(),
                inserted_at: Instant::now(),
            },
        );
        Ok(variant)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::CachedEvaluator;
    use crate::{snapshot::VariantValue, Error, Evaluate, Result};

    #[derive(Default)]
    struct CountingEvaluator {
        calls: AtomicUsize,
    }

    impl CountingEvaluator {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Evaluate for CountingEvaluator {
        fn evaluate(&self, feature_key: &str, entity_id: Option<&str>) -> Result<VariantValue> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if feature_key == "missing" {
                return Err(Error::FeatureNotFound(feature_key.to_owned()));
            }
            Ok(format!("{feature_key}:{}:{n}", entity_id.unwrap_or("anonymous")).into())
        }
    }

    #[test]
    fn repeated_calls_hit_the_cache() {
        let cache = CachedEvaluator::new(CountingEvaluator::default());

        let first = cache.evaluate("cta_color", Some("user-42")).unwrap();
        let second = cache.evaluate("cta_color", Some("user-42")).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.inner().calls(), 1);

        cache.evaluate("cta_color", Some("user-43")).unwrap();
        cache.evaluate("banner", Some("user-42")).unwrap();
        assert_eq!(cache.inner().calls(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn anonymous_calls_bypass_the_cache() {
        let cache = CachedEvaluator::new(CountingEvaluator::default());
        cache.evaluate("cta_color", None).unwrap();
        cache.evaluate("cta_color", None).unwrap();
        assert_eq!(cache.inner().calls(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_entity_id_is_cached() {
        let cache = CachedEvaluator::new(CountingEvaluator::default());
        let first = cache.evaluate("cta_color", Some("")).unwrap();
        assert_eq!(cache.evaluate("cta_color", Some("")).unwrap(), first);
        assert_eq!(cache.inner().calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = CachedEvaluator::new(CountingEvaluator::default());
        assert!(cache.evaluate("missing", Some("user-42")).is_err());
        assert!(cache.evaluate("missing", Some("user-42")).is_err());
        assert_eq!(cache.inner().calls(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_reevaluated() {
        let cache = CachedEvaluator::with_capacity(
            CountingEvaluator::default(),
            NonZeroUsize::new(16).unwrap(),
            Duration::from_millis(10),
        );
        let first = cache.evaluate("cta_color", Some("user-42")).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let second = cache.evaluate("cta_color", Some("user-42")).unwrap();
        assert_ne!(first, second);
        assert_eq!(cache.inner().calls(), 2);
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = CachedEvaluator::with_capacity(
            CountingEvaluator::default(),
            NonZeroUsize::new(2).unwrap(),
            CachedEvaluator::<CountingEvaluator>::DEFAULT_TTL,
        );
        cache.evaluate("a", Some("user")).unwrap();
        cache.evaluate("b", Some("user")).unwrap();
        cache.evaluate("a", Some("user")).unwrap();
        cache.evaluate("c", Some("user")).unwrap();
        assert_eq!(cache.inner().calls(), 3);
        assert_eq!(cache.len(), 2);

        // "b" was evicted, "a" was not.
        cache.evaluate("a", Some("user")).unwrap();
        assert_eq!(cache.inner().calls(), 3);
        cache.evaluate("b", Some("user")).unwrap();
        assert_eq!(cache.inner().calls(), 4);
    }

    #[test]
    fn clear_drops_entries() {
        let cache = CachedEvaluator::new(CountingEvaluator::default());
        cache.evaluate("cta_color", Some("user-42")).unwrap();
        cache.clear();
        cache.evaluate("cta_color", Some("user-42")).unwrap();
        assert_eq!(cache.inner().calls(), 2);
    }
}
