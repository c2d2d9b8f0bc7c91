//! Cardinality estimation from storage statistics (spec §4.3).
//!
//! Every estimate is clamped to be at least `1.0` — a plan with an
//! estimated cardinality of zero would make costs incomparable (e.g. an
//! empty-seeming join would look free no matter how it's shaped), so the
//! floor keeps the cost model well-founded even over empty or
//! near-empty inputs.

use crate::storage::StatsSnapshot;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use term_model::{Position, TriplePattern, Variable};

/// A per-variable count of how many distinct values a prior stage of
/// evaluation has already bound a variable to, used by
/// [`estimate_pattern_with_bindings`].
pub type BindingDomain = FxHashMap<Variable, u64>;

/// Estimates the number of matching triples for a single pattern.
pub fn estimate_pattern(pattern: &TriplePattern, stats: &StatsSnapshot) -> f64 {
    let base = pattern_base_cardinality(pattern, stats);
    let mut estimate = base;

    if is_effectively_bound(&pattern.subject) {
        estimate *= 1.0 / stats.distinct_subjects.max(1) as f64;
    }
    if is_effectively_bound(&pattern.object) {
        estimate *= 1.0 / stats.distinct_objects.max(1) as f64;
    }

    estimate.max(1.0)
}

/// As [`estimate_pattern`], but additionally accounts for variables the
/// caller has already bound (e.g. from an outer join) to a known number of
/// distinct values.
pub fn estimate_pattern_with_bindings(pattern: &TriplePattern, stats: &StatsSnapshot, bindings: &BindingDomain) -> f64 {
    let mut estimate = estimate_pattern(pattern, stats);

    for (position, domain_size) in [
        (&pattern.subject, stats.distinct_subjects),
        (&pattern.predicate, stats.distinct_predicates),
        (&pattern.object, stats.distinct_objects),
    ] {
        if let Some(var) = position.as_variable() {
            if let Some(&k) = bindings.get(var) {
                let domain = domain_size.max(1) as f64;
                estimate *= (k as f64 / domain).min(1.0);
            }
        }
    }

    estimate.max(1.0)
}

/// The base cardinality before subject/object selectivity factors (step 1
/// of spec §4.3's pattern-cardinality rule).
fn pattern_base_cardinality(pattern: &TriplePattern, stats: &StatsSnapshot) -> f64 {
    match &pattern.predicate {
        Position::Bound(term_model::BoundValue::Id(id)) => stats
            .predicate_count(*id)
            .map(|c| c as f64)
            .unwrap_or_else(|| stats.triple_count as f64 / stats.distinct_predicates.max(1) as f64),
        Position::Bound(term_model::BoundValue::Term(_)) => {
            // Unresolved textual predicate: storage hasn't given us an id
            // to look up in the histogram, so fall back to the uniform
            // per-predicate average, same as a resolved-but-unseen id.
            stats.triple_count as f64 / stats.distinct_predicates.max(1) as f64
        }
        Position::Variable(_) => stats.triple_count as f64,
    }
}

/// True for a position that contributes selectivity: bound, and not a
/// blank node (spec §4.3: "blank nodes are treated as unbound for scan
/// purposes").
fn is_effectively_bound(position: &Position) -> bool {
    position.is_bound() && !position.is_blank()
}

/// Estimates the cardinality of joining two inputs over `join_vars`.
///
/// Symmetric in `(left_card, right_card)`: swapping the two inputs
/// produces the same estimate.
pub fn estimate_join(left_card: f64, right_card: f64, join_vars: &[Variable], stats: &StatsSnapshot) -> f64 {
    if join_vars.is_empty() {
        return (left_card * right_card).max(1.0);
    }
    let selectivity: f64 = join_vars
        .iter()
        .map(|_| 1.0 / stats.distinct_subjects.max(1) as f64)
        .product();
    (left_card * right_card * selectivity).max(1.0)
}

/// Left-deep multi-pattern estimate: estimate each pattern, then fold them
/// together pattern by pattern, joining on whatever variables the already
/// consumed prefix shares with the next pattern.
pub fn estimate_multi_pattern(patterns: &[TriplePattern], stats: &StatsSnapshot) -> f64 {
    let mut iter = patterns.iter();
    let Some(first) = iter.next() else {
        return 1.0;
    };

    let mut running_card = estimate_pattern(first, stats);
    let mut consumed_vars: BTreeSet<Variable> = first.variables().into_iter().collect();

    for pattern in iter {
        let pattern_vars: BTreeSet<Variable> = pattern.variables().into_iter().collect();
        let shared: Vec<Variable> = consumed_vars.intersection(&pattern_vars).cloned().collect();
        let pattern_card = estimate_pattern(pattern, stats);
        running_card = estimate_join(running_card, pattern_card, &shared, stats);
        consumed_vars.extend(pattern_vars);
    }

    running_card
}

/// `estimate_pattern(pattern, stats) / stats.triple_count`, clamped to `(0, 1]`.
pub fn estimate_selectivity(pattern: &TriplePattern, stats: &StatsSnapshot) -> f64 {
    let selectivity = estimate_pattern(pattern, stats) / stats.triple_count.max(1) as f64;
    selectivity.clamp(f64::MIN_POSITIVE, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use term_model::{ConcreteTerm, TermId};

    fn stats() -> StatsSnapshot {
        let mut histogram = FxHashMap::default();
        histogram.insert(TermId(2), 200);
        StatsSnapshot {
            triple_count: 1000,
            distinct_subjects: 100,
            distinct_predicates: 10,
            distinct_objects: 500,
            predicate_histogram: histogram,
        }
    }

    fn pattern_with_predicate_id(id: u64) -> TriplePattern {
        TriplePattern::new(Variable::new("s"), TermId(id), Variable::new("o"))
    }

    #[test]
    fn histogram_hit_yields_exact_cardinality() {
        // Scenario 7: predicate_histogram = {2 -> 200}, triple_count = 1000,
        // pattern (?s, 2, ?o) yields cardinality exactly 200.0.
        let s = stats();
        let p = pattern_with_predicate_id(2);
        assert_eq!(estimate_pattern(&p, &s), 200.0);
    }

    #[test]
    fn unbound_predicate_falls_back_to_average() {
        let s = stats();
        let p = TriplePattern::new(Variable::new("s"), Variable::new("p"), Variable::new("o"));
        assert_eq!(estimate_pattern(&p, &s), 1000.0);
    }

    #[test]
    fn histogram_miss_falls_back_to_uniform_average() {
        let s = stats();
        let p = pattern_with_predicate_id(999);
        assert_eq!(estimate_pattern(&p, &s), 100.0); // 1000 / 10
    }

    #[test]
    fn bound_subject_and_object_multiply_selectivity() {
        let s = stats();
        let p = TriplePattern::new(ConcreteTerm::NamedNode("s".into()), TermId(2), ConcreteTerm::NamedNode("o".into()));
        let expected = 200.0 * (1.0 / 100.0) * (1.0 / 500.0);
        assert_eq!(estimate_pattern(&p, &s), expected.max(1.0));
    }

    #[test]
    fn blank_node_position_is_treated_as_unbound() {
        let s = stats();
        let with_blank = TriplePattern::new(
            term_model::ConcreteTerm::BlankNode("b0".into()),
            TermId(2),
            Variable::new("o"),
        );
        assert_eq!(estimate_pattern(&with_blank, &s), 200.0);
    }

    #[test]
    fn cardinality_is_never_below_one() {
        let mut s = stats();
        s.triple_count = 1;
        s.distinct_subjects = 1_000_000;
        s.distinct_objects = 1_000_000;
        let p = TriplePattern::new(
            ConcreteTerm::NamedNode("s".into()),
            Variable::new("p"),
            ConcreteTerm::NamedNode("o".into()),
        );
        assert!(estimate_pattern(&p, &s) >= 1.0);
    }

    #[test]
    fn join_estimate_is_symmetric() {
        let s = stats();
        let vars = vec![Variable::new("x")];
        assert_eq!(estimate_join(50.0, 30.0, &vars, &s), estimate_join(30.0, 50.0, &vars, &s));
    }

    #[test]
    fn cartesian_join_multiplies_when_no_shared_variables() {
        let s = stats();
        assert_eq!(estimate_join(10.0, 20.0, &[], &s), 200.0);
    }

    #[test]
    fn multi_pattern_empty_input_is_one() {
        let s = stats();
        assert_eq!(estimate_multi_pattern(&[], &s), 1.0);
    }

    #[test]
    fn selectivity_is_clamped_to_unit_interval() {
        let s = stats();
        let p = pattern_with_predicate_id(2);
        let sel = estimate_selectivity(&p, &s);
        assert!(sel > 0.0 && sel <= 1.0);
    }

    #[test]
    fn bindings_shrink_estimate_proportional_to_domain_coverage() {
        let s = stats();
        let p = TriplePattern::new(Variable::new("s"), TermId(2), Variable::new("o"));
        let mut bindings = BindingDomain::default();
        bindings.insert(Variable::new("s"), 10); // 10 of 100 distinct subjects already known
        let with_bindings = estimate_pattern_with_bindings(&p, &s, &bindings);
        let without = estimate_pattern(&p, &s);
        assert!(with_bindings <= without);
        assert_eq!(with_bindings, (without * (10.0 / 100.0)).max(1.0));
    }
}
