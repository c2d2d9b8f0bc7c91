//! The closed-form cost model (spec §4.4).
//!
//! Costs are composed of three additive components — `cpu`, `io`, `memory`
//! — with `total` always their sum. The constants below are a design
//! choice (spec §9): they need only satisfy the ranking invariants
//! exercised in this module's tests, not match a calibrated workload.

use crate::storage::StatsSnapshot;
use term_model::{Position, TriplePattern};

/// The cost constants shared by every costing function in this module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModelConfig {
    /// CPU cost of comparing one pair of tuples.
    pub c_cpu_per_compare: f64,
    /// CPU cost of one hash/probe operation.
    pub c_cpu_per_hash: f64,
    /// Memory cost of retaining one intermediate tuple.
    pub c_mem_per_tuple: f64,
    /// IO cost of a single index seek.
    pub c_io_seek: f64,
    /// IO cost of reading one result row off an index.
    pub c_io_per_result: f64,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            c_cpu_per_compare: 1.0,
            c_cpu_per_hash: 1.2,
            c_mem_per_tuple: 0.5,
            c_io_seek: 10.0,
            c_io_per_result: 0.1,
        }
    }
}

/// A three-component cost estimate. `total` is always `cpu + io + memory`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostVector {
    /// CPU component.
    pub cpu: f64,
    /// IO component.
    pub io: f64,
    /// Memory component.
    pub memory: f64,
    /// Sum of the three components.
    pub total: f64,
}

impl CostVector {
    /// Builds a cost vector, computing `total` from its components.
    pub fn new(cpu: f64, io: f64, memory: f64) -> Self {
        Self { cpu, io, memory, total: cpu + io + memory }
    }

    /// The zero-cost vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// A cost vector representing "not applicable" (infinite total).
    pub fn infinite() -> Self {
        Self {
            cpu: f64::INFINITY,
            io: 0.0,
            memory: 0.0,
            total: f64::INFINITY,
        }
    }

    /// Component-wise sum.
    pub fn add(self, other: CostVector) -> CostVector {
        CostVector::new(self.cpu + other.cpu, self.io + other.io, self.memory + other.memory)
    }
}

/// Sums a list of cost vectors, recomputing `total` as the sum of the
/// summed components (rather than summing the individual `total` fields,
/// which would be equivalent here but is specified this way to guard
/// against a future non-additive component).
pub fn total_plan_cost(costs: &[CostVector]) -> CostVector {
    costs.iter().fold(CostVector::zero(), |acc, c| acc.add(*c))
}

/// Total order over cost vectors by `.total`.
pub fn compare_costs(a: &CostVector, b: &CostVector) -> std::cmp::Ordering {
    a.total.total_cmp(&b.total)
}

/// The physical scan shape a pattern implies, by counting bound positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// All three positions bound.
    PointLookup,
    /// At least one bound, at least one unbound.
    PrefixScan,
    /// All three positions unbound (blank nodes count as unbound here too).
    FullScan,
}

/// Classifies a pattern's scan shape (spec §4.4). A blank node position
/// counts as unbound, consistent with [`crate::cardinality`]'s treatment.
pub fn pattern_scan_type(pattern: &TriplePattern) -> ScanType {
    let bound_count = [&pattern.subject, &pattern.predicate, &pattern.object]
        .into_iter()
        .filter(|p| is_effectively_bound(p))
        .count();
    match bound_count {
        3 => ScanType::PointLookup,
        0 => ScanType::FullScan,
        _ => ScanType::PrefixScan,
    }
}

fn is_effectively_bound(position: &Position) -> bool {
    position.is_bound() && !position.is_blank()
}

/// The cost of scanning an index for `kind`, given the expected result count.
pub fn index_scan_cost(kind: ScanType, expected_results: f64, stats: &StatsSnapshot, config: &CostModelConfig) -> CostVector {
    match kind {
        ScanType::PointLookup => CostVector::new(config.c_cpu_per_compare, config.c_io_seek, config.c_mem_per_tuple),
        ScanType::PrefixScan => CostVector::new(
            config.c_cpu_per_compare * expected_results,
            config.c_io_seek,
            config.c_mem_per_tuple * expected_results,
        ),
        ScanType::FullScan => CostVector::new(
            config.c_cpu_per_compare * stats.triple_count as f64,
            config.c_io_seek + config.c_io_per_result * stats.triple_count as f64,
            config.c_mem_per_tuple * expected_results,
        ),
    }
}

/// Whether a bound-subject/unbound-predicate/bound-object shape must be
/// served by scanning and filtering an OSP-like index rather than directly
/// honoring the bound predicate, per spec §4.4.
fn requires_post_filter(pattern: &TriplePattern) -> bool {
    is_effectively_bound(&pattern.subject) && !is_effectively_bound(&pattern.predicate) && is_effectively_bound(&pattern.object)
}

/// Costs a single triple pattern's scan, including the post-filter penalty
/// for `(bound, unbound, bound)` shapes that can't directly use a
/// predicate-ordered index.
pub fn pattern_cost(pattern: &TriplePattern, stats: &StatsSnapshot, config: &CostModelConfig) -> CostVector {
    let expected = crate::cardinality::estimate_pattern(pattern, stats);
    let base = index_scan_cost(pattern_scan_type(pattern), expected, stats, config);
    if requires_post_filter(pattern) {
        // Scanning OSP and filtering every candidate by predicate costs an
        // extra compare per candidate beyond what SPO/POS access gives for
        // free.
        CostVector::new(base.cpu + config.c_cpu_per_compare * expected, base.io, base.memory)
    } else {
        base
    }
}

/// Cost of a nested-loop join of `l` rows against `r` rows.
pub fn nested_loop_cost(l: f64, r: f64, config: &CostModelConfig) -> CostVector {
    CostVector::new(config.c_cpu_per_compare * l * r, 0.0, config.c_mem_per_tuple * r)
}

/// Cost of a hash join of `l` rows against `r` rows (`l` is the build side).
pub fn hash_join_cost(l: f64, r: f64, config: &CostModelConfig) -> CostVector {
    CostVector::new(config.c_cpu_per_hash * (l + r), 0.0, config.c_mem_per_tuple * l)
}

/// Cost of a leapfrog triejoin over `cardinalities.len()` relations sharing
/// `join_vars`. `+infinity` when fewer than two inputs are given — leapfrog
/// needs at least two sorted iterators to intersect.
pub fn leapfrog_cost(cardinalities: &[f64], join_vars: &[term_model::Variable], config: &CostModelConfig) -> CostVector {
    let k = cardinalities.len();
    if k < 2 {
        return CostVector::infinite();
    }
    let min_card = cardinalities.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_card = cardinalities.iter().cloned().fold(0.0, f64::max).max(1.0);

    let memory = config.c_mem_per_tuple * k as f64;
    let cpu = if join_vars.is_empty() {
        min_card * k as f64 * max_card.ln().max(1.0)
    } else {
        // Selectivity improves (cost drops) as more variables are shared
        // across the joined relations, since leapfrog can prune earlier.
        let selectivity_factor = 1.0 / (1 + join_vars.len()) as f64;
        min_card * k as f64 * max_card.ln().max(1.0) * selectivity_factor
    };
    CostVector::new(cpu, 0.0, memory)
}

/// A binary-join physical strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Nested-loop join.
    NestedLoop,
    /// Hash join.
    HashJoin,
}

/// Picks the cheaper of nested-loop and hash join for `(l, r)` rows sharing
/// `join_vars`, returning the strategy and its cost.
///
/// `join_vars` does not change either binary strategy's formula (both scan
/// every input row regardless of shared variables) but is accepted to keep
/// the signature uniform with [`should_use_leapfrog`], which does use it.
pub fn select_join_strategy(l: f64, r: f64, _join_vars: &[term_model::Variable], config: &CostModelConfig) -> (JoinStrategy, CostVector) {
    let nl = nested_loop_cost(l, r, config);
    let hj = hash_join_cost(l, r, config);
    if compare_costs(&nl, &hj) == std::cmp::Ordering::Greater {
        (JoinStrategy::HashJoin, hj)
    } else {
        (JoinStrategy::NestedLoop, nl)
    }
}

/// Whether a leapfrog triejoin over `cardinalities` beats cascading
/// pairwise hash joins over the same inputs. Always `false` below three
/// inputs, since leapfrog's worst-case-optimality advantage only shows up
/// once there are at least three relations to intersect at once.
pub fn should_use_leapfrog(cardinalities: &[f64], join_vars: &[term_model::Variable], config: &CostModelConfig) -> bool {
    if cardinalities.len() < 3 {
        return false;
    }
    let leapfrog = leapfrog_cost(cardinalities, join_vars, config);
    let cascade = cascading_hash_join_cost(cardinalities, config);
    compare_costs(&leapfrog, &cascade) == std::cmp::Ordering::Less
}

/// Cost of joining `cardinalities` pairwise, left to right, with hash joins.
fn cascading_hash_join_cost(cardinalities: &[f64], config: &CostModelConfig) -> CostVector {
    let mut iter = cardinalities.iter().copied();
    let Some(first) = iter.next() else {
        return CostVector::zero();
    };
    let mut running_card = first;
    let mut total = CostVector::zero();
    for card in iter {
        let cost = hash_join_cost(running_card, card, config);
        total = total.add(cost);
        running_card *= card; // conservative cartesian upper bound between cascades
    }
    total
}
