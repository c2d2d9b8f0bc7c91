//! The algebraic optimizer: filter push-down (spec §4.5).
//!
//! Push-down is conjunct-at-a-time: `AND`-chains are flattened before
//! pushing so that `FILTER(?a > 1 && ?b < 2)` over a join can send `?a > 1`
//! down one side and `?b < 2` down the other, even though neither half
//! alone was written as a separate `FILTER` in the query.
//!
//! Three boundaries never let a conjunct cross them, regardless of which
//! variables it mentions:
//! - `left_join`'s (OPTIONAL's) right child — a filter that could be
//!   satisfied by the absence of an optional match must stay above it.
//! - `union`'s branches — a conjunct that's pushed into one branch but not
//!   evaluated against the other would silently change which rows survive.
//! - `group`'s child — aggregation already collapses rows; filtering after
//!   aggregation (`HAVING`) and filtering the pre-aggregation rows are not
//!   the same operation.
//!
//! `service` and `minus`'s subtracted side get the same treatment for the
//! analogous reason: `service` because its child is evaluated by a remote
//! endpoint this crate does not control, `minus` because a conjunct
//! satisfied only by the subtracted side's absence must stay above it.
//! `slice` is not a boundary — pushing a conjunct through `LIMIT`/`OFFSET`
//! into its child only restricts which rows reach the slice, it does not
//! change the slice's own row-count semantics.

use crate::algebra::{self, AlgebraNode};
use crate::expression::Expression;
use std::collections::BTreeSet;
use term_model::Variable;

/// Toggles for [`optimize`]. Kept as a struct (rather than a bare bool
/// parameter) so further rewrite passes can be added without breaking
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerOptions {
    /// Whether to run filter push-down.
    pub push_filters: bool,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self { push_filters: true }
    }
}

/// Summary statistics produced by inspecting a tree's filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterAnalysis {
    /// The number of explicit `filter` nodes in the tree.
    pub total_filters: usize,
}

/// Counts the explicit `filter` nodes in `node`.
pub fn analyze_filters(node: &AlgebraNode) -> FilterAnalysis {
    FilterAnalysis {
        total_filters: algebra::collect_filters(node).len(),
    }
}

/// Runs the optimizer's configured rewrite passes over `node`.
pub fn optimize(node: &AlgebraNode, options: OptimizerOptions) -> AlgebraNode {
    if options.push_filters {
        push_filters_down(node)
    } else {
        node.clone()
    }
}

/// Rewrites `node`, pushing every `filter`'s conjuncts as close to their
/// referenced triple patterns as the soundness boundaries above allow.
pub fn push_filters_down(node: &AlgebraNode) -> AlgebraNode {
    algebra::map(node, &|rebuilt| match rebuilt {
        AlgebraNode::Filter { expr, child } => {
            let conjuncts: Vec<Expression> = expr.flatten_conjuncts().into_iter().cloned().collect();
            push_into(*child, conjuncts)
        }
        other => other,
    })
}

fn partition_by_scope(conjuncts: Vec<Expression>, scope: &BTreeSet<Variable>) -> (Vec<Expression>, Vec<Expression>) {
    conjuncts.into_iter().partition(|c| c.free_variables().is_subset(scope))
}

fn wrap_filter(node: AlgebraNode, conjuncts: Vec<Expression>) -> AlgebraNode {
    match Expression::conjoin(conjuncts) {
        Some(expr) => AlgebraNode::Filter { expr, child: Box::new(node) },
        None => node,
    }
}

/// Pushes `conjuncts` into `node` as far as each one's free variables and
/// `node`'s boundary rules allow, wrapping whatever can't go further back
/// on top as a `filter`.
fn push_into(node: AlgebraNode, conjuncts: Vec<Expression>) -> AlgebraNode {
    if conjuncts.is_empty() {
        return node;
    }

    match node {
        AlgebraNode::Filter { expr, child } => {
            let mut merged = conjuncts;
            merged.extend(expr.flatten_conjuncts().into_iter().cloned());
            push_into(*child, merged)
        }

        AlgebraNode::Join { left, right } => {
            let left_scope = algebra::in_scope_variables(&left);
            let right_scope = algebra::in_scope_variables(&right);
            let (left_only, rest) = partition_by_scope(conjuncts, &left_scope);
            let (right_only, remaining) = partition_by_scope(rest, &right_scope);
            let new_left = push_into(*left, left_only);
            let new_right = push_into(*right, right_only);
            wrap_filter(
                AlgebraNode::Join { left: Box::new(new_left), right: Box::new(new_right) },
                remaining,
            )
        }

        // OPTIONAL: only the required left side is safe to push into.
        AlgebraNode::LeftJoin { left, right, filter } => {
            let left_scope = algebra::in_scope_variables(&left);
            let (left_only, remaining) = partition_by_scope(conjuncts, &left_scope);
            let new_left = push_into(*left, left_only);
            let new_right = push_filters_down(&right);
            wrap_filter(
                AlgebraNode::LeftJoin { left: Box::new(new_left), right: Box::new(new_right), filter },
                remaining,
            )
        }

        // MINUS is treated the same as left_join: the subtracted right side
        // is never a safe push target, only the retained left side is.
        AlgebraNode::Minus { left, right } => {
            let left_scope = algebra::in_scope_variables(&left);
            let (left_only, remaining) = partition_by_scope(conjuncts, &left_scope);
            let new_left = push_into(*left, left_only);
            let new_right = push_filters_down(&right);
            wrap_filter(AlgebraNode::Minus { left: Box::new(new_left), right: Box::new(new_right) }, remaining)
        }

        // UNION: neither branch is a safe push target, since a conjunct
        // pushed into one branch but not evaluated against the other would
        // change which rows the union as a whole produces.
        AlgebraNode::Union { left, right } => {
            let new_left = push_filters_down(&left);
            let new_right = push_filters_down(&right);
            wrap_filter(AlgebraNode::Union { left: Box::new(new_left), right: Box::new(new_right) }, conjuncts)
        }

        // GROUP BY: aggregation is a hard boundary; HAVING and pre-aggregate
        // filtering are different operations.
        AlgebraNode::Group { child, group_vars, aggregates } => {
            let new_child = push_filters_down(&child);
            wrap_filter(AlgebraNode::Group { child: Box::new(new_child), group_vars, aggregates }, conjuncts)
        }

        // BIND: a conjunct mentioning the newly bound variable can't go
        // below the point where that variable starts existing.
        AlgebraNode::Extend { child, var, expr } => {
            let (below, above) = conjuncts.into_iter().partition(|c| !c.free_variables().contains(&var));
            let new_child = push_into(*child, below);
            wrap_filter(AlgebraNode::Extend { child: Box::new(new_child), var, expr }, above)
        }

        // Pass-through single-child nodes: none of these change which
        // variables are visible or which rows a predicate matches.
        AlgebraNode::Project { child, vars } => AlgebraNode::Project { child: Box::new(push_into(*child, conjuncts)), vars },
        AlgebraNode::Distinct { child } => AlgebraNode::Distinct { child: Box::new(push_into(*child, conjuncts)) },
        AlgebraNode::Reduced { child } => AlgebraNode::Reduced { child: Box::new(push_into(*child, conjuncts)) },
        AlgebraNode::OrderBy { child, conditions } => AlgebraNode::OrderBy { child: Box::new(push_into(*child, conjuncts)), conditions },
        AlgebraNode::Graph { graph, child } => AlgebraNode::Graph { graph, child: Box::new(push_into(*child, conjuncts)) },

        // LIMIT/OFFSET: pushing a conjunct through to the child only makes
        // the pre-slice bag smaller, it doesn't change which rows are kept
        // once the slice itself runs.
        AlgebraNode::Slice { child, offset, limit } => AlgebraNode::Slice { child: Box::new(push_into(*child, conjuncts)), offset, limit },

        // SERVICE's child is evaluated by a remote endpoint this crate does
        // not control; nothing pushes across that boundary.
        AlgebraNode::Service { endpoint, child, silent } => {
            let new_child = push_filters_down(&child);
            wrap_filter(AlgebraNode::Service { endpoint, child: Box::new(new_child), silent }, conjuncts)
        }

        leaf @ (AlgebraNode::Bgp(_) | AlgebraNode::Values { .. } | AlgebraNode::Path { .. }) => wrap_filter(leaf, conjuncts),
    }
}
