//! End-to-end scenarios exercising the public API surface: compile →
//! optimize → enumerate → cache, and UPDATE execution, the way an
//! embedding application would drive this crate.

use query_planner::cost::CostModelConfig;
use query_planner::optimizer::{analyze_filters, optimize, OptimizerOptions};
use query_planner::storage::test_support::InMemoryStore;
use query_planner::storage::{StatsSnapshot, WriteOp, WriteSink};
use query_planner::update::{self, DocumentFetcher, PatternEvaluator, Solution};
use query_planner::{enumerate, enumerate_with_cancellation, AlgebraNode, CacheKey, CancellationToken, PlanCache, UpdateOperation};
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use term_model::{ConcreteTerm, Quad, QuadPattern, TermId, TriplePattern, Variable};

fn iri(s: &str) -> ConcreteTerm {
    ConcreteTerm::NamedNode(s.into())
}

fn bgp(s: &str, p: &str, o: &str) -> AlgebraNode {
    AlgebraNode::Bgp(vec![TriplePattern::new(Variable::new(s), iri(p), Variable::new(o))])
}

/// Scenario 1: a filter over a join fully absorbs into the matching side.
#[test]
fn filter_pushes_through_join_to_the_single_matching_side() {
    use query_planner::expression::Expression;

    let tree = AlgebraNode::Filter {
        expr: Expression::Greater(Box::new(Expression::Variable(Variable::new("age"))), Box::new(Expression::Constant(iri("http://ex/18")))),
        child: Box::new(AlgebraNode::Join {
            left: Box::new(bgp("p", "http://ex/age", "age")),
            right: Box::new(bgp("p", "http://ex/name", "name")),
        }),
    };

    let optimized = optimize(&tree, OptimizerOptions::default());
    match optimized {
        AlgebraNode::Join { left, right } => {
            assert!(matches!(*left, AlgebraNode::Filter { .. }));
            assert!(matches!(*right, AlgebraNode::Bgp(_)));
        }
        other => panic!("expected the filter to be absorbed into a join, got {other:?}"),
    }
}

/// Scenario 2: a conjunctive filter splits across both join sides.
#[test]
fn split_conjunctive_filter_lands_one_conjunct_on_each_side() {
    use query_planner::expression::Expression;

    let tree = AlgebraNode::Filter {
        expr: Expression::And(
            Box::new(Expression::Greater(Box::new(Expression::Variable(Variable::new("age"))), Box::new(Expression::Constant(iri("http://ex/18"))))),
            Box::new(Expression::Less(Box::new(Expression::Variable(Variable::new("score"))), Box::new(Expression::Constant(iri("http://ex/100"))))),
        ),
        child: Box::new(AlgebraNode::Join {
            left: Box::new(bgp("p", "http://ex/age", "age")),
            right: Box::new(bgp("p", "http://ex/score", "score")),
        }),
    };

    let optimized = optimize(&tree, OptimizerOptions::default());
    match optimized {
        AlgebraNode::Join { left, right } => {
            assert!(matches!(*left, AlgebraNode::Filter { .. }));
            assert!(matches!(*right, AlgebraNode::Filter { .. }));
        }
        other => panic!("expected a join with a filter on each side, got {other:?}"),
    }
    assert_eq!(analyze_filters(&tree).total_filters, 1);
}

/// Scenario 3: a filter over an OPTIONAL-only variable stays above the
/// left_join rather than being pushed into its protected right side.
#[test]
fn optional_right_side_stays_protected_from_push_down() {
    use query_planner::expression::Expression;

    let tree = AlgebraNode::Filter {
        expr: Expression::Bound(Variable::new("email")),
        child: Box::new(AlgebraNode::LeftJoin {
            left: Box::new(bgp("p", "http://ex/name", "name")),
            right: Box::new(bgp("p", "http://ex/email", "email")),
            filter: None,
        }),
    };
    let optimized = optimize(&tree, OptimizerOptions::default());
    assert!(matches!(optimized, AlgebraNode::Filter { .. }));
}

/// Scenario 4: a filter never crosses into either branch of a UNION.
#[test]
fn union_branches_stay_protected_from_push_down() {
    use query_planner::expression::Expression;

    let tree = AlgebraNode::Filter {
        expr: Expression::Greater(Box::new(Expression::Variable(Variable::new("age"))), Box::new(Expression::Constant(iri("http://ex/18")))),
        child: Box::new(AlgebraNode::Union {
            left: Box::new(bgp("p", "http://ex/age", "age")),
            right: Box::new(bgp("p", "http://ex/legacy_age", "age")),
        }),
    };
    let optimized = optimize(&tree, OptimizerOptions::default());
    match optimized {
        AlgebraNode::Filter { child, .. } => assert!(matches!(*child, AlgebraNode::Union { .. })),
        other => panic!("expected the filter to remain above the union, got {other:?}"),
    }
}

/// A filter over a `slice` (LIMIT/OFFSET) pushes through into the slice's
/// child rather than staying pinned above it — a slice is not a push-down
/// boundary, unlike `group`/`union`/`left_join`'s protected sides.
#[test]
fn filter_pushes_through_a_slice_wrapper_into_its_child() {
    use query_planner::algebra::Limit;
    use query_planner::expression::Expression;

    let tree = AlgebraNode::Filter {
        expr: Expression::Greater(Box::new(Expression::Variable(Variable::new("age"))), Box::new(Expression::Constant(iri("http://ex/18")))),
        child: Box::new(AlgebraNode::Slice {
            child: Box::new(bgp("p", "http://ex/age", "age")),
            offset: 0,
            limit: Limit::Bounded(10),
        }),
    };
    let optimized = optimize(&tree, OptimizerOptions::default());
    match optimized {
        AlgebraNode::Slice { child, .. } => assert!(matches!(*child, AlgebraNode::Filter { .. })),
        other => panic!("expected the filter pushed into the slice's child, got {other:?}"),
    }
}

/// Scenario 5: ten calls with two distinct keys and a 9:1 hit-to-miss
/// ratio produce a 0.9 cache hit rate.
#[test]
fn repeated_lookups_of_the_same_shape_reach_a_high_hit_rate() {
    let cache: PlanCache<u32> = PlanCache::new(NonZeroUsize::new(8).unwrap());
    let hot_key = CacheKey::normalize(&bgp("p", "http://ex/age", "age"));
    let cold_key = CacheKey::normalize(&bgp("p", "http://ex/name", "name"));

    cache.get_or_compute(cold_key, || 1);
    for _ in 0..9 {
        cache.get_or_compute(hot_key.clone(), || 2);
    }

    let stats = cache.stats();
    assert_eq!(stats.hits, 9);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 0.9).abs() < 1e-9);
}

/// Scenario 6: a 7-pattern chain plans under DPccp well inside the 500ms
/// budget spec §8.4 sets for this shape.
#[test]
fn seven_pattern_chain_plans_fast_under_dpccp() {
    let config = CostModelConfig::default();
    let stats = StatsSnapshot::default();
    let patterns: Vec<TriplePattern> = (0..7).map(|i| TriplePattern::new(Variable::new(format!("v{i}")), TermId(1), Variable::new(format!("v{}", i + 1)))).collect();

    let start = Instant::now();
    let plan = enumerate(&patterns, &stats, &config).unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_millis(500), "enumeration took {elapsed:?}, expected under 500ms");
    assert!(plan.cardinality >= 1.0);
}

/// Scenario 7: an exact histogram entry yields an exact cardinality.
#[test]
fn histogram_entry_yields_exact_pattern_cardinality() {
    let mut histogram = FxHashMap::default();
    histogram.insert(TermId(2), 200);
    let stats = StatsSnapshot {
        triple_count: 1000,
        distinct_subjects: 100,
        distinct_predicates: 10,
        distinct_objects: 500,
        predicate_histogram: histogram,
    };
    let pattern = TriplePattern::new(Variable::new("s"), TermId(2), Variable::new("o"));
    assert_eq!(query_planner::cardinality::estimate_pattern(&pattern, &stats), 200.0);
}

struct NoFetcher;
impl DocumentFetcher for NoFetcher {
    fn fetch(&self, source: &str) -> Result<Vec<Quad>, query_planner::UpdateError> {
        Err(query_planner::UpdateError::Unsupported(format!("no document fetcher configured for {source}")))
    }
}

/// Scenario 8: a DELETE/INSERT batch with an unbound template variable
/// fails validation and the store is left untouched (no partial commit).
#[test]
fn update_atomicity_on_validation_failure_leaves_storage_untouched() {
    struct OneEmptySolution;
    impl PatternEvaluator for OneEmptySolution {
        fn evaluate(&self, _pattern: &AlgebraNode) -> Result<Vec<Solution>, query_planner::UpdateError> {
            Ok(vec![Solution::default()])
        }
    }

    let store = InMemoryStore::new(StatsSnapshot::default());
    let cache: PlanCache<()> = PlanCache::new(NonZeroUsize::new(4).unwrap());
    let pattern = bgp("s", "http://ex/p", "o");
    let ops = vec![UpdateOperation::DeleteInsert {
        delete_template: vec![],
        insert_template: vec![QuadPattern {
            subject: Variable::new("s").into(),
            predicate: iri("http://ex/p").into(),
            object: Variable::new("unbound").into(),
            graph: None,
        }],
        pattern,
    }];

    let result = update::execute(&ops, &OneEmptySolution, &NoFetcher, &store, &cache);
    assert!(result.is_err());
    assert_eq!(store.len(), 0);
}

/// §5's single-flight guarantee: many concurrent callers computing the
/// same structural key invoke the supplied closure exactly once.
#[test]
fn concurrent_cache_lookups_on_one_key_compute_only_once() {
    let cache: Arc<PlanCache<u64>> = Arc::new(PlanCache::new(NonZeroUsize::new(8).unwrap()));
    let key = CacheKey::normalize(&bgp("s", "http://ex/p", "o"));
    let computations = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            let computations = computations.clone();
            thread::spawn(move || {
                cache.get_or_compute(key, || {
                    computations.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    123
                })
            })
        })
        .collect();

    for h in handles {
        assert_eq!(*h.join().unwrap(), 123);
    }
    assert_eq!(computations.load(Ordering::SeqCst), 1);
}

/// Cancelling a long enumeration before it starts surfaces as `Cancelled`
/// rather than silently returning a partial plan.
#[test]
fn cancellation_aborts_a_large_dpccp_enumeration() {
    let config = CostModelConfig::default();
    let stats = StatsSnapshot::default();
    let patterns: Vec<TriplePattern> = (0..8).map(|i| TriplePattern::new(Variable::new(format!("v{i}")), TermId(1), Variable::new(format!("v{}", i + 1)))).collect();
    let token = CancellationToken::new();
    token.cancel();
    let result = enumerate_with_cancellation(&patterns, &stats, &config, &token);
    assert!(result.is_err());
}

/// Data written by one UPDATE is observable through the `WriteSink` the
/// cache-invalidation guarantee assumes it commits against.
#[test]
fn insert_data_is_visible_through_the_storage_collaborator_after_commit() {
    struct NoSolutions;
    impl PatternEvaluator for NoSolutions {
        fn evaluate(&self, _pattern: &AlgebraNode) -> Result<Vec<Solution>, query_planner::UpdateError> {
            Ok(vec![])
        }
    }

    let store = InMemoryStore::new(StatsSnapshot::default());
    let cache: PlanCache<()> = PlanCache::new(NonZeroUsize::new(4).unwrap());
    let quad_pattern = QuadPattern {
        subject: iri("http://ex/a").into(),
        predicate: iri("http://ex/p").into(),
        object: iri("http://ex/b").into(),
        graph: None,
    };
    let ops = vec![UpdateOperation::InsertData(vec![quad_pattern])];
    update::execute(&ops, &NoSolutions, &NoFetcher, &store, &cache).unwrap();
    assert_eq!(store.len(), 1);

    // A direct write through the same sink also participates in the same
    // atomic guarantee the executor relies on.
    store
        .write_batch(vec![WriteOp::RemoveQuad(Quad { subject: iri("http://ex/a"), predicate: iri("http://ex/p"), object: iri("http://ex/b"), graph: None })])
        .unwrap();
    assert_eq!(store.len(), 0);
}
