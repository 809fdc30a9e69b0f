//! Structural-hash compile cache (section 5 "Across compilation units")
//!
//! Single-producer-per-key: the first caller to ask for a key sees it
//! missing and compiles it; every other caller for the same key blocks on
//! the same [`Condvar`] until the producer publishes. No caller ever
//! compiles the same key twice concurrently.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex};

enum Slot<V> {
    Producing,
    Ready(Arc<V>),
}

pub struct CompileCache<K, V> {
    state: Mutex<HashMap<K, Slot<V>>>,
    ready: Condvar,
}

impl<K, V> CompileCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        CompileCache { state: Mutex::new(HashMap::new()), ready: Condvar::new() }
    }

    /// Returns the cached value for `key`, compiling it with `compile` if
    /// absent. Concurrent callers for the same key share one compilation.
    ///
    /// If `compile` panics, the slot is cleared and waiters are woken so
    /// the next caller can retry rather than deadlock on a dead producer.
    pub fn get_or_compile(&self, key: K, compile: impl FnOnce() -> V) -> Arc<V> {
        let mut state = self.state.lock().unwrap();
        loop {
            match state.get(&key) {
                Some(Slot::Ready(v)) => return v.clone(),
                Some(Slot::Producing) => {
                    state = self.ready.wait(state).unwrap();
                }
                None => {
                    state.insert(key.clone(), Slot::Producing);
                    drop(state);
                    tracing::trace!("cache miss, compiling");
                    let produced = std::panic::catch_unwind(std::panic::AssertUnwindSafe(compile));
                    state = self.state.lock().unwrap();
                    match produced {
                        Ok(v) => {
                            let v = Arc::new(v);
                            state.insert(key.clone(), Slot::Ready(v.clone()));
                            self.ready.notify_all();
                            return v;
                        }
                        Err(payload) => {
                            tracing::debug!("producer panicked, clearing slot for waiters");
                            state.remove(&key);
                            self.ready.notify_all();
                            std::panic::resume_unwind(payload);
                        }
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for CompileCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        CompileCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn second_get_for_same_key_does_not_recompile() {
        let cache: CompileCache<u64, u32> = CompileCache::new();
        let calls = AtomicUsize::new(0);

        let a = cache.get_or_compile(1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            10
        });
        let b = cache.get_or_compile(1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            99
        });

        assert_eq!(*a, 10);
        assert_eq!(*b, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_getters_share_one_compilation() {
        let cache = Arc::new(CompileCache::<u64, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    *cache.get_or_compile(7, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(5));
                        42
                    })
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_producer_does_not_poison_later_callers() {
        let cache: CompileCache<u64, u32> = CompileCache::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cache.get_or_compile(3, || panic!("boom"))
        }));
        assert!(result.is_err());

        let v = cache.get_or_compile(3, || 5);
        assert_eq!(*v, 5);
    }
}
