//! Single-flight response memoization with TTL expiry.
//!
//! [`ResponseCache`] coalesces concurrent identical outbound queries:
//! the first caller for a key runs the producer, every caller that
//! arrives while it is in flight (or before the entry expires) awaits
//! the same shared future and receives a clone of the same result.
//! Entries are evicted lazily on the next lookup past their expiry --
//! there is no background sweep and no persistence.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// One cached (possibly still in-flight) result.
struct CacheEntry<T> {
    result: Shared<BoxFuture<'static, T>>,
    /// Provisional (insert time plus TTL) while the producer is in
    /// flight; reset to completion time plus TTL when the result lands.
    expires_at: Instant,
    /// Distinguishes this entry from any replacement inserted after
    /// expiry, so a stale producer cannot refresh the new entry.
    generation: u64,
}

/// Async memoization keyed by `K`, with fixed TTL and single-flight
/// semantics per key.
pub struct ResponseCache<K, T> {
    name: &'static str,
    ttl: Duration,
    entries: Arc<Mutex<HashMap<K, CacheEntry<T>>>>,
    generations: AtomicU64,
}

impl<K, T> ResponseCache<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. `name` only labels debug logs.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Return the live result for `key`, running `producer` only if no
    /// live entry exists.
    ///
    /// Concurrent callers with the same key during an in-flight producer
    /// call all receive the same eventual result. The TTL window is
    /// measured from the producer's completion, so a slow producer does
    /// not eat into it. A caller arriving after the entry expired
    /// replaces it and runs a fresh producer; the stale shared future
    /// is dropped and never observed again.
    pub async fn wrap<F>(&self, key: K, producer: F) -> T
    where
        F: Future<Output = T> + Send + 'static,
    {
        let result = {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => {
                    tracing::debug!(cache = self.name, "response cache hit");
                    entry.result.clone()
                }
                _ => {
                    tracing::debug!(cache = self.name, "response cache miss");
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                    let ttl = self.ttl;
                    let map = Arc::clone(&self.entries);
                    let entry_key = key.clone();
                    let result = async move {
                        let value = producer.await;
                        // Restart the expiry clock now that the result
                        // exists, unless the entry was replaced while the
                        // producer ran.
                        let mut entries = map.lock().await;
                        if let Some(entry) = entries.get_mut(&entry_key) {
                            if entry.generation == generation {
                                entry.expires_at = Instant::now() + ttl;
                            }
                        }
                        value
                    }
                    .boxed()
                    .shared();
                    entries.insert(
                        key,
                        CacheEntry {
                            result: result.clone(),
                            expires_at: now + self.ttl,
                            generation,
                        },
                    );
                    result
                }
            }
        };
        // Awaited outside the lock so other keys make progress while the
        // producer is suspended on network I/O.
        result.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl Future<Output = u32> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            // Suspend so a concurrent caller can observe the in-flight entry.
            tokio::time::sleep(Duration::from_millis(10)).await;
            value
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_producer_run() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.wrap("key", counting_producer(&calls, 7)),
            cache.wrap("key", counting_producer(&calls, 8)),
        );

        assert_eq!(a, 7);
        assert_eq!(b, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn live_entry_served_without_rerunning_producer() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.wrap("key", counting_producer(&calls, 1)).await, 1);
        assert_eq!(cache.wrap("key", counting_producer(&calls, 2)).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_fresh_producer_run() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.wrap("key", counting_producer(&calls, 1)).await, 1);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert_eq!(cache.wrap("key", counting_producer(&calls, 2)).await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_counts_from_producer_completion() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let slow_producer = |calls: &Arc<AtomicUsize>, value: u32| {
            let calls = Arc::clone(calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(TTL / 2).await;
                value
            }
        };

        assert_eq!(cache.wrap("key", slow_producer(&calls, 1)).await, 1);

        // A full TTL after the producer *started* but just short of a
        // TTL after it completed: the entry must still be live.
        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert_eq!(cache.wrap("key", slow_producer(&calls, 2)).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.wrap("key", slow_producer(&calls, 3)).await, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_do_not_share_results() {
        let cache: ResponseCache<&str, u32> = ResponseCache::new("test", TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.wrap("a", counting_producer(&calls, 1)).await, 1);
        assert_eq!(cache.wrap("b", counting_producer(&calls, 2)).await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
