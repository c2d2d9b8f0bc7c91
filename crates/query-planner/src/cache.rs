//! The plan cache (spec §4.7).
//!
//! Keys are normalized so that two structurally identical queries that
//! merely used different variable names hash and compare equal. Each slot
//! is a `OnceLock`, so concurrent callers computing the *same* key block on
//! one another's first write (single-flight) rather than recomputing the
//! plan redundantly, while the cache's own mutex is only ever held long
//! enough to get-or-insert that slot — never across the caller-supplied
//! `compute_fn`.

use crate::algebra::AlgebraNode;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use term_model::Variable;

/// A structurally normalized cache key: the tree with every distinct
/// variable renamed to its first-appearance index (`?0`, `?1`, ...), so
/// `SELECT ?x WHERE { ?x :p ?y }` and `SELECT ?a WHERE { ?a :p ?b }` share
/// a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a normalized key from an algebra tree.
    pub fn normalize(node: &AlgebraNode) -> Self {
        let mut renaming = VariableRenaming::default();
        let mut out = String::new();
        render(node, &mut renaming, &mut out);
        CacheKey(out)
    }
}

#[derive(Default)]
struct VariableRenaming {
    seen: Vec<Variable>,
}

impl VariableRenaming {
    fn canonical_index(&mut self, var: &Variable) -> usize {
        if let Some(pos) = self.seen.iter().position(|v| v == var) {
            pos
        } else {
            self.seen.push(var.clone());
            self.seen.len() - 1
        }
    }
}

/// Renders `node` into `out` using canonical `#N` variable names instead of
/// their original text, so the textual form is the normalization.
fn render(node: &AlgebraNode, renaming: &mut VariableRenaming, out: &mut String) {
    use std::fmt::Write as _;
    // `pretty_print` already gives a deterministic, structurally faithful
    // textual form; canonicalizing variable names on top of it avoids
    // hand-rolling a second tree-walking renderer here.
    let rendered = crate::algebra::pretty_print(node);
    let mut canonical = String::with_capacity(rendered.len());
    for token in tokenize_preserving_structure(&rendered) {
        match token.strip_prefix('?') {
            Some(name) if !name.is_empty() => {
                let idx = renaming.canonical_index(&Variable::new(name));
                let _ = write!(canonical, "?{idx}");
            }
            _ => canonical.push_str(token),
        }
    }
    out.push_str(&canonical);
}

/// Splits `s` into tokens, where each `?name`-shaped run is its own token
/// and everything else is grouped into the surrounding non-variable runs.
fn tokenize_preserving_structure(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut run_start = 0;
    while i < bytes.len() {
        if bytes[i] == b'?' {
            if i > run_start {
                tokens.push(&s[run_start..i]);
            }
            let start = i;
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(&s[start..i]);
            run_start = i;
        } else {
            i += 1;
        }
    }
    if run_start < bytes.len() {
        tokens.push(&s[run_start..]);
    }
    tokens
}

/// Hit/miss counters exposed by [`PlanCache::stats`].
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// A point-in-time snapshot of cache hit-rate statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Number of `get`/`get_or_compute` calls that found an existing entry.
    pub hits: u64,
    /// Number of calls that computed a fresh entry.
    pub misses: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or `0.0` with no calls yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type Slot<V> = Arc<OnceLock<Arc<V>>>;

/// An LRU plan cache keyed by structurally normalized query shape.
///
/// `V` is the cached value type — normally [`crate::enumerator::Plan`], but
/// left generic so the cache can also front other keyed-and-expensive
/// planning artifacts without duplicating this module.
pub struct PlanCache<V> {
    inner: Mutex<LruCache<CacheKey, Slot<V>>>,
    counters: Counters,
}

impl<V> PlanCache<V> {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            counters: Counters::default(),
        }
    }

    /// Looks up `key` without computing anything on a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let slot = {
            let mut guard = self.inner.lock();
            guard.get(key).cloned()
        };
        match slot.and_then(|s| s.get().cloned()) {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Returns the cached value for `key`, computing it with `compute_fn` on
    /// a miss.
    ///
    /// The cache's mutex is held only to get-or-insert the slot; it is
    /// never held while `compute_fn` runs, so other keys remain available
    /// to other callers during a slow compute. Concurrent callers for the
    /// *same* key share one `compute_fn` invocation (single-flight): the
    /// `OnceLock` ensures only the first caller to reach `get_or_init`
    /// actually runs the closure, and every other caller blocks until that
    /// result is ready and then reuses it.
    pub fn get_or_compute(&self, key: CacheKey, compute_fn: impl FnOnce() -> V) -> Arc<V> {
        let slot = {
            let mut guard = self.inner.lock();
            guard.get_or_insert(key, Slot::default).clone()
        };

        // Track whether *this* call was the one that actually ran
        // `compute_fn`, not merely whether the slot looked empty a moment
        // ago — another thread can win the race between that check and
        // `get_or_init` below.
        let ran_compute = std::sync::atomic::AtomicBool::new(false);
        let value = slot.get_or_init(|| {
            ran_compute.store(true, Ordering::Relaxed);
            Arc::new(compute_fn())
        });

        if ran_compute.load(Ordering::Relaxed) {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        value.clone()
    }

    /// Evicts every entry.
    pub fn invalidate_all(&self) {
        self.inner.lock().clear();
    }

    /// Evicts a single key, if present.
    pub fn invalidate(&self, key: &CacheKey) {
        self.inner.lock().pop(key);
    }

    /// The number of entries currently cached (including in-flight slots
    /// whose compute hasn't finished yet).
    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    /// A snapshot of hit/miss counters accumulated since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use term_model::{ConcreteTerm, TriplePattern};

    fn iri(s: &str) -> ConcreteTerm {
        ConcreteTerm::NamedNode(s.into())
    }

    fn pattern(s: &str, o: &str) -> AlgebraNode {
        AlgebraNode::Bgp(vec![TriplePattern::new(Variable::new(s), iri("http://ex/p"), Variable::new(o))])
    }

    #[test]
    fn structurally_equivalent_queries_normalize_to_the_same_key() {
        let a = CacheKey::normalize(&pattern("x", "y"));
        let b = CacheKey::normalize(&pattern("a", "b"));
        assert_eq!(a, b);
    }

    #[test]
    fn structurally_different_queries_normalize_differently() {
        let a = CacheKey::normalize(&pattern("x", "y"));
        let b = CacheKey::normalize(&AlgebraNode::Join { left: Box::new(pattern("x", "y")), right: Box::new(pattern("y", "z")) });
        assert_ne!(a, b);
    }

    #[test]
    fn get_or_compute_caches_across_calls() {
        let cache: PlanCache<u32> = PlanCache::new(NonZeroUsize::new(8).unwrap());
        let key = CacheKey::normalize(&pattern("x", "y"));
        let calls = AtomicUsize::new(0);
        let first = cache.get_or_compute(key.clone(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        });
        let second = cache.get_or_compute(key, || {
            calls.fetch_add(1, Ordering::SeqCst);
            99
        });
        assert_eq!(*first, 42);
        assert_eq!(*second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn invalidate_removes_a_single_key() {
        let cache: PlanCache<u32> = PlanCache::new(NonZeroUsize::new(8).unwrap());
        let key = CacheKey::normalize(&pattern("x", "y"));
        cache.get_or_compute(key.clone(), || 1);
        assert_eq!(cache.size(), 1);
        cache.invalidate(&key);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let cache: PlanCache<u32> = PlanCache::new(NonZeroUsize::new(8).unwrap());
        cache.get_or_compute(CacheKey::normalize(&pattern("x", "y")), || 1);
        cache.get_or_compute(CacheKey::normalize(&AlgebraNode::Join { left: Box::new(pattern("x", "y")), right: Box::new(pattern("y", "z")) }), || 2);
        assert_eq!(cache.size(), 2);
        cache.invalidate_all();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn concurrent_get_or_compute_on_the_same_key_runs_compute_fn_once() {
        let cache: Arc<PlanCache<u32>> = Arc::new(PlanCache::new(NonZeroUsize::new(8).unwrap()));
        let key = CacheKey::normalize(&pattern("x", "y"));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    cache.get_or_compute(key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::yield_now();
                        7
                    })
                })
            })
            .collect();

        for h in handles {
            assert_eq!(*h.join().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lru_capacity_evicts_the_least_recently_used_entry() {
        let cache: PlanCache<u32> = PlanCache::new(NonZeroUsize::new(1).unwrap());
        let key_a = CacheKey::normalize(&pattern("x", "y"));
        let key_b = CacheKey::normalize(&AlgebraNode::Join { left: Box::new(pattern("x", "y")), right: Box::new(pattern("y", "z")) });
        cache.get_or_compute(key_a.clone(), || 1);
        cache.get_or_compute(key_b, || 2);
        assert_eq!(cache.size(), 1);
        assert!(cache.get(&key_a).is_none());
    }
}
