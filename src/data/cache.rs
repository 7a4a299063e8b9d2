use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of entries kept per cached operation.
pub const DEFAULT_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// MemoCache – bounded LRU shared between threads
// ---------------------------------------------------------------------------

/// A bounded least-recently-used memo table.
///
/// Values are handed out as `Arc<V>` so every caller sees the same object.
/// The lock is never held while a value is computed: two threads missing on
/// the same key may both compute it, but the first insert wins and both get
/// that value back.
#[derive(Debug)]
pub struct MemoCache<K, V> {
    capacity: usize,
    state: Mutex<LruState<K, V>>,
}

#[derive(Debug)]
struct LruState<K, V> {
    entries: HashMap<K, Arc<V>>,
    /// front = least recently used, back = most recently used
    order: VecDeque<K>,
    hits: u64,
    misses: u64,
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// A cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        MemoCache {
            capacity: capacity.max(1),
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, LruState<K, V>> {
        // Nothing panics while the lock is held, but a poisoned map is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `key`, marking it as most recently used.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut state = self.lock();
        let value = state.entries.get(key).cloned()?;
        state.touch(key);
        Some(value)
    }

    /// Insert a value unless `key` is already present; returns whichever
    /// value ends up cached.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let mut state = self.lock();
        if let Some(existing) = state.entries.get(&key).cloned() {
            state.touch(&key);
            return existing;
        }
        let value = Arc::new(value);
        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
        state.entries.insert(key.clone(), Arc::clone(&value));
        state.order.push_back(key);
        value
    }

    /// Return the cached value for `key`, computing and caching it on a miss.
    /// Errors are returned as-is and nothing is cached.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        {
            let mut state = self.lock();
            if let Some(value) = state.entries.get(&key).cloned() {
                state.touch(&key);
                state.hits += 1;
                return Ok(value);
            }
            state.misses += 1;
        }
        let value = compute()?;
        Ok(self.insert(key, value))
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            len: state.entries.len(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> LruState<K, V> {
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn second_call_is_a_hit_returning_the_same_arc() {
        let cache = MemoCache::new(4);
        let first = cache.get_or_try_insert_with("a", || Ok::<_, ()>(1)).unwrap();
        let second = cache
            .get_or_try_insert_with("a", || -> Result<i32, ()> { panic!("recomputed") })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, len: 1 });
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = MemoCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get(&"a").as_deref(), Some(&1));
        cache.insert("c", 3);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: MemoCache<&str, i32> = MemoCache::new(2);
        assert_eq!(cache.get_or_try_insert_with("a", || Err("boom")), Err("boom"));
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_try_insert_with("a", || Ok::<_, &str>(5)).unwrap(), 5);
    }

    #[test]
    fn first_insert_wins() {
        let cache = MemoCache::new(2);
        let a = cache.insert("k", 1);
        let b = cache.insert("k", 2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b, 1);
    }

    #[test]
    fn zero_capacity_still_holds_one_entry() {
        let cache = MemoCache::new(0);
        cache.insert(1, "x");
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_callers_agree_on_one_value() {
        let cache = Arc::new(MemoCache::new(8));
        let computed = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let computed = Arc::clone(&computed);
                thread::spawn(move || {
                    cache
                        .get_or_try_insert_with("shared", || {
                            computed.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, ()>(i)
                        })
                        .unwrap()
                })
            })
            .collect();
        let values: Vec<Arc<i32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert!(computed.load(Ordering::SeqCst) >= 1);
        assert_eq!(cache.len(), 1);
    }
}
