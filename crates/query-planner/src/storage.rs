//! The storage/dictionary boundary (spec §6.2).
//!
//! The physical triple store and its ID↔term dictionary live outside this
//! crate. This module defines only the interface the planning core
//! consumes: a statistics snapshot and the traits a storage collaborator
//! implements so the cardinality estimator, cost model, and update
//! executor can talk to it without depending on a concrete backend.

use rustc_hash::FxHashMap;
use std::fmt;
use term_model::{Quad, TermId};

/// A point-in-time snapshot of storage statistics (spec §3.5).
///
/// Statistics are captured once at plan time and never mutated; an UPDATE
/// invalidates cached plans rather than patching a live snapshot (spec §5).
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    /// Total number of triples in the store.
    pub triple_count: u64,
    /// Number of distinct subject terms.
    pub distinct_subjects: u64,
    /// Number of distinct predicate terms.
    pub distinct_predicates: u64,
    /// Number of distinct object terms.
    pub distinct_objects: u64,
    /// Per-predicate triple counts, keyed by dictionary id.
    pub predicate_histogram: FxHashMap<TermId, u64>,
}

/// The default assumed when a statistics field is missing (spec §3.5):
/// a triple count of 10,000 with no further histogram information.
impl Default for StatsSnapshot {
    fn default() -> Self {
        Self {
            triple_count: 10_000,
            distinct_subjects: Self::DEFAULT_DISTINCT_SUBJECTS,
            distinct_predicates: Self::DEFAULT_DISTINCT_PREDICATES,
            distinct_objects: Self::DEFAULT_DISTINCT_OBJECTS,
            predicate_histogram: FxHashMap::default(),
        }
    }
}

impl StatsSnapshot {
    /// Default proportion of `triple_count` assumed for `distinct_subjects`
    /// when storage does not report it: roughly one distinct subject per
    /// 10 triples, a conservative fan-out estimate.
    pub const DEFAULT_SUBJECT_FANOUT: u64 = 10;
    const DEFAULT_DISTINCT_SUBJECTS: u64 = 1_000;
    const DEFAULT_DISTINCT_PREDICATES: u64 = 50;
    const DEFAULT_DISTINCT_OBJECTS: u64 = 1_000;

    /// Looks up a predicate's histogram count, if storage recorded one.
    pub fn predicate_count(&self, predicate: TermId) -> Option<u64> {
        self.predicate_histogram.get(&predicate).copied()
    }
}

/// Errors a storage collaborator can raise while committing a write batch.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    /// The backend rejected the batch outright (e.g. a constraint violation).
    #[error("storage backend rejected the write batch: {0}")]
    Rejected(String),
    /// The backend began committing but failed partway; it guarantees the
    /// whole batch was rolled back.
    #[error("storage backend failed mid-commit and rolled back: {0}")]
    CommitFailed(String),
    /// The backend is unavailable (connection lost, handle closed, ...).
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// A single physical write, gathered into one atomic batch by the update
/// executor (spec §4.8, §5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert a quad (a no-op at the storage level if already present).
    InsertQuad(Quad),
    /// Remove a quad (a no-op if absent).
    RemoveQuad(Quad),
    /// Remove every quad in the named graph, or the default graph if `None`.
    ClearGraph(Option<std::sync::Arc<str>>),
    /// Remove every quad in every graph, default graph included.
    ClearAllGraphs,
    /// Remove every quad in every named graph; the default graph is
    /// untouched.
    ClearAllNamed,
    /// Ensure a named graph exists, for backends that track a graph
    /// catalog separately from quad membership. A no-op for quad-only
    /// storage, where a graph exists as soon as a quad references it.
    EnsureGraphExists(std::sync::Arc<str>),
}

/// Read access to storage statistics, consulted by the cardinality
/// estimator and cost model.
pub trait StatisticsProvider: Send + Sync {
    /// Returns the current statistics snapshot.
    fn stats(&self) -> StatsSnapshot;
}

/// Write access to storage, consulted only by the update executor.
///
/// Implementations must commit `ops` atomically: either every write in the
/// batch is applied, or (on error) none are.
pub trait WriteSink: Send + Sync {
    /// Commits `ops` as a single atomic batch, returning the number of
    /// quads actually inserted or removed (storage-level deduplication may
    /// make this smaller than `ops.len()`).
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<u64, StorageError>;
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::InsertQuad(q) => write!(f, "+{} {} {}", q.subject, q.predicate, q.object),
            WriteOp::RemoveQuad(q) => write!(f, "-{} {} {}", q.subject, q.predicate, q.object),
            WriteOp::ClearGraph(g) => write!(f, "clear {}", g.as_deref().unwrap_or("<default>")),
            WriteOp::ClearAllGraphs => write!(f, "clear all graphs"),
            WriteOp::ClearAllNamed => write!(f, "clear all named graphs"),
            WriteOp::EnsureGraphExists(g) => write!(f, "ensure graph {g} exists"),
        }
    }
}

/// An in-memory [`StatisticsProvider`] + [`WriteSink`] used by this crate's
/// own tests. Not a production storage backend — a real embedding engine
/// supplies its own implementation backed by the physical triple indexes.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// A trivial in-memory quad set implementing both storage traits.
    #[derive(Default)]
    pub struct InMemoryStore {
        quads: Mutex<HashSet<Quad>>,
        stats: Mutex<StatsSnapshot>,
    }

    impl InMemoryStore {
        /// Creates an empty store with the given starting statistics.
        pub fn new(stats: StatsSnapshot) -> Self {
            Self {
                quads: Mutex::new(HashSet::new()),
                stats: Mutex::new(stats),
            }
        }

        /// The number of quads currently stored.
        pub fn len(&self) -> usize {
            self.quads.lock().len()
        }
    }

    impl StatisticsProvider for InMemoryStore {
        fn stats(&self) -> StatsSnapshot {
            self.stats.lock().clone()
        }
    }

    impl WriteSink for InMemoryStore {
        fn write_batch(&self, ops: Vec<WriteOp>) -> Result<u64, StorageError> {
            let mut quads = self.quads.lock();
            let mut affected = 0u64;
            for op in ops {
                match op {
                    WriteOp::InsertQuad(q) => {
                        if quads.insert(q) {
                            affected += 1;
                        }
                    }
                    WriteOp::RemoveQuad(q) => {
                        if quads.remove(&q) {
                            affected += 1;
                        }
                    }
                    WriteOp::ClearGraph(graph) => {
                        let before = quads.len();
                        quads.retain(|q| q.graph != graph);
                        affected += (before - quads.len()) as u64;
                    }
                    WriteOp::ClearAllGraphs => {
                        affected += quads.len() as u64;
                        quads.clear();
                    }
                    WriteOp::ClearAllNamed => {
                        let before = quads.len();
                        quads.retain(|q| q.graph.is_none());
                        affected += (before - quads.len()) as u64;
                    }
                    WriteOp::EnsureGraphExists(_) => {}
                }
            }
            Ok(affected)
        }
    }
}
