//! Join-order enumeration (spec §4.6).
//!
//! Below [`EXHAUSTIVE_THRESHOLD`] patterns, every way of splitting a
//! pattern set into two non-empty halves is tried. At or above the
//! threshold the search is pruned to connected subgraphs and
//! connected-complement-pair splits in the style of DPccp (Moerkotte &
//! Neumann), which is what keeps enumeration from exploding
//! combinatorially on long join chains.

use crate::cardinality::{self, estimate_multi_pattern};
use crate::cost::{self, CostModelConfig, CostVector};
use crate::error::EnumerationError;
use crate::storage::StatsSnapshot;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use term_model::{TriplePattern, Variable};

/// Patterns at or above this count are planned with DPccp rather than
/// exhaustive enumeration.
pub const EXHAUSTIVE_THRESHOLD: usize = 5;

/// A physical join strategy chosen for one join node of a [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Binary nested-loop join.
    NestedLoop,
    /// Binary hash join.
    HashJoin,
    /// `k`-way leapfrog triejoin.
    Leapfrog,
}

/// A physical plan tree (spec §3.6).
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// A single-pattern index scan.
    Scan(TriplePattern),
    /// A binary join of two subplans.
    Join {
        /// Left input.
        left: Box<PlanNode>,
        /// Right input.
        right: Box<PlanNode>,
        /// Physical strategy, either [`JoinKind::NestedLoop`] or [`JoinKind::HashJoin`].
        strategy: JoinKind,
        /// Variables shared between `left` and `right`; empty for a Cartesian join.
        join_vars: Vec<Variable>,
    },
    /// A `k`-way leapfrog triejoin over several inputs at once.
    Leapfrog {
        /// The joined inputs.
        inputs: Vec<PlanNode>,
        /// Variables shared across all inputs.
        join_vars: Vec<Variable>,
    },
}

/// A costed, cardinality-estimated physical plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// The plan tree.
    pub root: PlanNode,
    /// Total estimated cost of the tree.
    pub cost: CostVector,
    /// Estimated output cardinality.
    pub cardinality: f64,
}

/// A cooperative cancellation flag, checked once per DPccp outer-loop
/// iteration (spec §4.6's "long-running enumeration must be cancellable").
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that starts out not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`Self::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The variables appearing in `pattern`, exposed here under the name the
/// join-graph building code uses.
pub fn pattern_variables(pattern: &TriplePattern) -> Vec<Variable> {
    pattern.variables()
}

/// The variables common to both `a` and `b`, in `a`'s order.
pub fn shared_variables(a: &[Variable], b: &[Variable]) -> Vec<Variable> {
    a.iter().filter(|v| b.contains(v)).cloned().collect()
}

/// An `n x n` adjacency matrix: `graph[i][j]` is true iff `patterns[i]` and
/// `patterns[j]` share at least one variable.
pub fn build_join_graph(patterns: &[TriplePattern]) -> Vec<Vec<bool>> {
    let vars: Vec<Vec<Variable>> = patterns.iter().map(pattern_variables).collect();
    let n = patterns.len();
    let mut graph = vec![vec![false; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let shares = !shared_variables(&vars[i], &vars[j]).is_empty();
            graph[i][j] = shares;
            graph[j][i] = shares;
        }
    }
    graph
}

/// Whether any pattern index in `set_a` is adjacent (in `graph`) to any
/// pattern index in `set_b`. Indices are encoded as bits of a `u64` mask.
pub fn sets_connected(graph: &[Vec<bool>], set_a: u64, set_b: u64) -> bool {
    for i in 0..graph.len() {
        if set_a & (1 << i) == 0 {
            continue;
        }
        for j in 0..graph.len() {
            if set_b & (1 << j) != 0 && graph[i][j] {
                return true;
            }
        }
    }
    false
}

/// The variables shared between the patterns named by `set_a` and those
/// named by `set_b` (each a bitmask of pattern indices into `patterns`).
pub fn shared_variables_between_sets(patterns: &[TriplePattern], set_a: u64, set_b: u64) -> Vec<Variable> {
    let vars_a = vars_of_set(patterns, set_a);
    let vars_b = vars_of_set(patterns, set_b);
    shared_variables(&vars_a, &vars_b)
}

fn vars_of_set(patterns: &[TriplePattern], set: u64) -> Vec<Variable> {
    let mut out = Vec::new();
    for (i, p) in patterns.iter().enumerate() {
        if set & (1 << i) != 0 {
            for v in p.variables() {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
    }
    out
}

fn patterns_of_set(patterns: &[TriplePattern], set: u64) -> Vec<TriplePattern> {
    patterns.iter().enumerate().filter(|(i, _)| set & (1 << i) != 0).map(|(_, p)| p.clone()).collect()
}

fn is_connected_subgraph(graph: &[Vec<bool>], set: u64) -> bool {
    let n = graph.len();
    let bits: Vec<usize> = (0..n).filter(|i| set & (1 << i) != 0).collect();
    if bits.len() <= 1 {
        return true;
    }
    let mut visited = vec![false; n];
    let mut stack = vec![bits[0]];
    visited[bits[0]] = true;
    let mut count = 1;
    while let Some(i) = stack.pop() {
        for &j in &bits {
            if !visited[j] && graph[i][j] {
                visited[j] = true;
                count += 1;
                stack.push(j);
            }
        }
    }
    count == bits.len()
}

/// Enumerates the non-empty proper subsets of `set`, via the standard
/// "subset of a bitmask" trick, each paired with its complement within `set`.
fn sub_splits(set: u64) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    let mut sub = (set - 1) & set;
    while sub != 0 {
        out.push((sub, set & !sub));
        if sub == 0 {
            break;
        }
        sub = (sub.wrapping_sub(1)) & set;
    }
    out
}

type Memo = FxHashMap<u64, Plan>;

fn base_plan(pattern: &TriplePattern, stats: &StatsSnapshot, config: &CostModelConfig) -> Plan {
    Plan {
        root: PlanNode::Scan(pattern.clone()),
        cost: cost::pattern_cost(pattern, stats, config),
        cardinality: cardinality::estimate_pattern(pattern, stats),
    }
}

fn binary_join_plan(left: &Plan, right: &Plan, join_vars: Vec<Variable>, stats: &StatsSnapshot, config: &CostModelConfig) -> Plan {
    let (strategy, join_cost) = cost::select_join_strategy(left.cardinality, right.cardinality, &join_vars, config);
    let kind = match strategy {
        cost::JoinStrategy::NestedLoop => JoinKind::NestedLoop,
        cost::JoinStrategy::HashJoin => JoinKind::HashJoin,
    };
    let cardinality = cardinality::estimate_join(left.cardinality, right.cardinality, &join_vars, stats);
    Plan {
        cost: cost::total_plan_cost(&[left.cost, right.cost, join_cost]),
        cardinality,
        root: PlanNode::Join {
            left: Box::new(left.root.clone()),
            right: Box::new(right.root.clone()),
            strategy: kind,
            join_vars,
        },
    }
}

/// Considers planning `set` as a single `k`-way leapfrog triejoin instead of
/// a binary join tree, when every pattern in the set pairwise shares a
/// variable with every other (so a single sort order can serve them all)
/// and [`cost::should_use_leapfrog`] judges it cheaper.
fn leapfrog_candidate(
    patterns: &[TriplePattern],
    set: u64,
    graph: &[Vec<bool>],
    stats: &StatsSnapshot,
    config: &CostModelConfig,
) -> Option<Plan> {
    let bits: Vec<usize> = (0..patterns.len()).filter(|i| set & (1 << i) != 0).collect();
    if bits.len() < 3 {
        return None;
    }
    let pairwise_connected = bits.iter().all(|&i| bits.iter().all(|&j| i == j || graph[i][j]));
    if !pairwise_connected {
        return None;
    }

    let members: Vec<TriplePattern> = bits.iter().map(|&i| patterns[i].clone()).collect();
    let cardinalities: Vec<f64> = members.iter().map(|p| cardinality::estimate_pattern(p, stats)).collect();
    let join_vars = vars_of_set(patterns, set)
        .into_iter()
        .filter(|v| bits.iter().filter(|&&i| patterns[i].variables().contains(v)).count() > 1)
        .collect::<Vec<_>>();

    if !cost::should_use_leapfrog(&cardinalities, &join_vars, config) {
        return None;
    }

    Some(Plan {
        cost: cost::leapfrog_cost(&cardinalities, &join_vars, config),
        cardinality: estimate_multi_pattern(&members, stats),
        root: PlanNode::Leapfrog {
            inputs: members.into_iter().map(PlanNode::Scan).collect(),
            join_vars,
        },
    })
}

fn cheaper(a: Plan, b: Plan) -> Plan {
    if cost::compare_costs(&a.cost, &b.cost) == std::cmp::Ordering::Greater {
        b
    } else {
        a
    }
}

/// Exhaustive join enumeration: for each pattern subset, every way of
/// splitting it into two non-empty halves is costed, with no requirement
/// that either half be connected in the join graph.
fn enumerate_exhaustive(patterns: &[TriplePattern], graph: &[Vec<bool>], stats: &StatsSnapshot, config: &CostModelConfig) -> Memo {
    let n = patterns.len();
    let full = (1u64 << n) - 1;
    let mut memo: Memo = FxHashMap::default();

    for i in 0..n {
        memo.insert(1 << i, base_plan(&patterns[i], stats, config));
    }

    let mut subsets: Vec<u64> = (1u64..=full).filter(|s| s.count_ones() >= 2).collect();
    subsets.sort_by_key(|s| s.count_ones());

    for set in subsets {
        let mut best: Option<Plan> = None;
        for (a, b) in sub_splits(set) {
            let (Some(left), Some(right)) = (memo.get(&a), memo.get(&b)) else {
                continue;
            };
            let join_vars = shared_variables_between_sets(patterns, a, b);
            let candidate = binary_join_plan(left, right, join_vars, stats, config);
            best = Some(match best {
                Some(current) => cheaper(current, candidate),
                None => candidate,
            });
        }
        if let Some(leapfrog) = leapfrog_candidate(patterns, set, graph, stats, config) {
            best = Some(match best {
                Some(current) => cheaper(current, leapfrog),
                None => leapfrog,
            });
        }
        if let Some(plan) = best {
            memo.insert(set, plan);
        }
    }

    memo
}

/// DPccp-style join enumeration: only connected subsets are planned, and
/// only connected-complement-pair splits are considered, pruning the search
/// space relative to [`enumerate_exhaustive`] on long join chains.
fn enumerate_dpccp(
    patterns: &[TriplePattern],
    graph: &[Vec<bool>],
    stats: &StatsSnapshot,
    config: &CostModelConfig,
    cancellation: Option<&CancellationToken>,
) -> Result<Memo, EnumerationError> {
    let n = patterns.len();
    let full = (1u64 << n) - 1;
    let mut memo: Memo = FxHashMap::default();

    for i in 0..n {
        memo.insert(1 << i, base_plan(&patterns[i], stats, config));
    }

    let mut subsets: Vec<u64> = (1u64..=full).filter(|s| s.count_ones() >= 2 && is_connected_subgraph(graph, *s)).collect();
    subsets.sort_by_key(|s| s.count_ones());

    for set in subsets {
        if let Some(token) = cancellation {
            if token.is_cancelled() {
                return Err(EnumerationError::Cancelled);
            }
        }
        let mut best: Option<Plan> = None;
        for (a, b) in sub_splits(set) {
            if !sets_connected(graph, a, b) {
                continue;
            }
            let (Some(left), Some(right)) = (memo.get(&a), memo.get(&b)) else {
                continue;
            };
            let join_vars = shared_variables_between_sets(patterns, a, b);
            let candidate = binary_join_plan(left, right, join_vars, stats, config);
            best = Some(match best {
                Some(current) => cheaper(current, candidate),
                None => candidate,
            });
        }
        if let Some(leapfrog) = leapfrog_candidate(patterns, set, graph, stats, config) {
            best = Some(match best {
                Some(current) => cheaper(current, leapfrog),
                None => leapfrog,
            });
        }
        if let Some(plan) = best {
            memo.insert(set, plan);
        }
    }

    Ok(memo)
}

fn connected_components(graph: &[Vec<bool>]) -> Vec<u64> {
    let n = graph.len();
    let mut visited = vec![false; n];
    let mut components = Vec::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut mask = 0u64;
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(i) = stack.pop() {
            mask |= 1 << i;
            for j in 0..n {
                if !visited[j] && graph[i][j] {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }
        components.push(mask);
    }
    components
}

fn plan_connected_component(
    patterns: &[TriplePattern],
    stats: &StatsSnapshot,
    config: &CostModelConfig,
    cancellation: Option<&CancellationToken>,
) -> Result<Plan, EnumerationError> {
    if patterns.len() == 1 {
        return Ok(base_plan(&patterns[0], stats, config));
    }
    let graph = build_join_graph(patterns);
    let full = (1u64 << patterns.len()) - 1;
    let memo = if patterns.len() < EXHAUSTIVE_THRESHOLD + 1 {
        enumerate_exhaustive(patterns, &graph, stats, config)
    } else {
        enumerate_dpccp(patterns, &graph, stats, config, cancellation)?
    };
    memo.get(&full).cloned().ok_or_else(|| EnumerationError::EmptyPatterns)
}

/// Plans `patterns`, handling a join graph with multiple connected
/// components by enumerating each component separately and combining them
/// with Cartesian (empty-`join_vars`) joins, left to right.
fn enumerate_inner(patterns: &[TriplePattern], stats: &StatsSnapshot, config: &CostModelConfig, cancellation: Option<&CancellationToken>) -> Result<Plan, EnumerationError> {
    if patterns.is_empty() {
        return Err(EnumerationError::EmptyPatterns);
    }
    let graph = build_join_graph(patterns);
    let components = connected_components(&graph);

    let mut plans = Vec::with_capacity(components.len());
    for component in components {
        let member_patterns = patterns_of_set(patterns, component);
        plans.push(plan_connected_component(&member_patterns, stats, config, cancellation)?);
    }

    let mut iter = plans.into_iter();
    let mut acc = iter.next().expect("at least one component when patterns is non-empty");
    for next in iter {
        acc = binary_join_plan(&acc, &next, Vec::new(), stats, config);
    }
    Ok(acc)
}

/// Plans `patterns` without cancellation support.
pub fn enumerate(patterns: &[TriplePattern], stats: &StatsSnapshot, config: &CostModelConfig) -> Result<Plan, EnumerationError> {
    enumerate_inner(patterns, stats, config, None)
}

/// Plans `patterns`, checking `cancellation` once per DPccp outer-loop
/// iteration. Components small enough for exhaustive search are not
/// interruptible mid-way, since they are expected to finish quickly.
pub fn enumerate_with_cancellation(
    patterns: &[TriplePattern],
    stats: &StatsSnapshot,
    config: &CostModelConfig,
    cancellation: &CancellationToken,
) -> Result<Plan, EnumerationError> {
    enumerate_inner(patterns, stats, config, Some(cancellation))
}
