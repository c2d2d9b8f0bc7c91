//! The SPARQL algebra: a closed, tagged tree representation of a query.
//!
//! Algebra trees are values — immutable once built. Rewrites (the
//! optimizer, §4.5) always produce a new tree rather than mutating one in
//! place. This mirrors a `DataFrame`/expression-tree style more than a
//! class hierarchy: every node is a variant of one closed enum, arity is
//! fixed per variant at compile time, and a tree walk that needs an open
//! set of behaviors takes a closure (`fold`/`map`) rather than dispatching
//! through trait objects.

use crate::error::AlgebraError;
use crate::expression::{Aggregate, Expression};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use term_model::{ConcreteTerm, GraphTerm, Position, TriplePattern, Variable};

/// An inclusive lower bound, exclusive upper bound `slice.limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// A finite limit.
    Bounded(u64),
    /// No limit (SPARQL's absence of `LIMIT`).
    Unbounded,
}

/// One `ORDER BY` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCondition {
    /// `true` for `ASC`, `false` for `DESC`.
    pub ascending: bool,
    /// The ordering key expression.
    pub expr: Expression,
}

/// A SPARQL 1.1 property path expression (the `path` algebra node's
/// `path-expression` field).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyPath {
    /// A single predicate IRI, traversed forwards.
    Predicate(ConcreteTerm),
    /// `^path` — traverse the wrapped path backwards.
    Inverse(Box<PropertyPath>),
    /// `a/b` — traverse `a` then `b`.
    Sequence(Box<PropertyPath>, Box<PropertyPath>),
    /// `a|b` — traverse `a` or `b`.
    Alternative(Box<PropertyPath>, Box<PropertyPath>),
    /// `path*`
    ZeroOrMore(Box<PropertyPath>),
    /// `path+`
    OneOrMore(Box<PropertyPath>),
    /// `path?`
    ZeroOrOne(Box<PropertyPath>),
    /// `!(p1|p2|...)` — negated predicate set.
    NegatedPredicateSet(Vec<ConcreteTerm>),
}

/// The SPARQL algebra's closed node set (spec §3.2).
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraNode {
    /// A Basic Graph Pattern: an ordered conjunction of triple patterns.
    Bgp(Vec<TriplePattern>),
    /// Inner join of two subtrees.
    Join {
        /// Left operand.
        left: Box<AlgebraNode>,
        /// Right operand.
        right: Box<AlgebraNode>,
    },
    /// `OPTIONAL`: left join of two subtrees, with an optional join filter.
    LeftJoin {
        /// Required left pattern.
        left: Box<AlgebraNode>,
        /// Optional right pattern.
        right: Box<AlgebraNode>,
        /// Filter attached to the OPTIONAL clause, if any.
        filter: Option<Expression>,
    },
    /// `MINUS`: solutions of `left` with `right`'s solutions removed.
    Minus {
        /// Base pattern.
        left: Box<AlgebraNode>,
        /// Pattern whose solutions are subtracted.
        right: Box<AlgebraNode>,
    },
    /// `UNION` of two subtrees.
    Union {
        /// First alternative.
        left: Box<AlgebraNode>,
        /// Second alternative.
        right: Box<AlgebraNode>,
    },
    /// `FILTER`: restricts `child`'s solutions to those satisfying `expr`.
    Filter {
        /// The filter condition.
        expr: Expression,
        /// The filtered subtree.
        child: Box<AlgebraNode>,
    },
    /// `BIND`: extends each solution of `child` with `expr` bound to `var`.
    Extend {
        /// The extended subtree.
        child: Box<AlgebraNode>,
        /// The newly bound variable.
        var: Variable,
        /// The expression computing its value.
        expr: Expression,
    },
    /// `GROUP BY` with aggregates.
    Group {
        /// The grouped subtree.
        child: Box<AlgebraNode>,
        /// Grouping key variables.
        group_vars: Vec<Variable>,
        /// Aggregate expressions, each bound to a result variable.
        aggregates: Vec<(Variable, Aggregate)>,
    },
    /// `SELECT <vars>`: restricts visible variables.
    Project {
        /// The projected subtree.
        child: Box<AlgebraNode>,
        /// Variables kept in scope.
        vars: Vec<Variable>,
    },
    /// `DISTINCT`
    Distinct {
        /// The deduplicated subtree.
        child: Box<AlgebraNode>,
    },
    /// `REDUCED`
    Reduced {
        /// The subtree permitted to drop some duplicates.
        child: Box<AlgebraNode>,
    },
    /// `ORDER BY`
    OrderBy {
        /// The sorted subtree.
        child: Box<AlgebraNode>,
        /// Ordering conditions, most significant first.
        conditions: Vec<OrderCondition>,
    },
    /// `OFFSET`/`LIMIT`
    Slice {
        /// The sliced subtree.
        child: Box<AlgebraNode>,
        /// Number of leading solutions to skip. Must be non-negative;
        /// negative values exist only transiently before [`validate`] runs.
        offset: i64,
        /// Maximum number of solutions to keep.
        limit: Limit,
    },
    /// `VALUES`: an inline table of solutions.
    Values {
        /// The table's column variables.
        variables: Vec<Variable>,
        /// Table rows; a cell of `None` is `UNDEF`.
        rows: Vec<Vec<Option<ConcreteTerm>>>,
    },
    /// `SERVICE`: a federated subquery (evaluated out of scope of this crate).
    Service {
        /// The remote endpoint, fixed or variable.
        endpoint: GraphTerm,
        /// The pattern to send to the endpoint.
        child: Box<AlgebraNode>,
        /// `SILENT`: suppress failures from an unreachable endpoint.
        silent: bool,
    },
    /// `GRAPH`: restricts `child` to a named graph.
    Graph {
        /// The graph to match within, fixed or variable.
        graph: GraphTerm,
        /// The pattern matched within that graph.
        child: Box<AlgebraNode>,
    },
    /// A property-path triple.
    Path {
        /// Path subject.
        subject: Position,
        /// The path expression.
        path: PropertyPath,
        /// Path object.
        object: Position,
    },
}

impl AlgebraNode {
    /// A leaf BGP over zero patterns. Useful as an optimizer/enumerator base case.
    pub fn empty_bgp() -> Self {
        AlgebraNode::Bgp(Vec::new())
    }
}

/// Returns this node's tag name, as used for pretty-printing and logging.
pub fn node_type(node: &AlgebraNode) -> &'static str {
    match node {
        AlgebraNode::Bgp(_) => "bgp",
        AlgebraNode::Join { .. } => "join",
        AlgebraNode::LeftJoin { .. } => "left_join",
        AlgebraNode::Minus { .. } => "minus",
        AlgebraNode::Union { .. } => "union",
        AlgebraNode::Filter { .. } => "filter",
        AlgebraNode::Extend { .. } => "extend",
        AlgebraNode::Group { .. } => "group",
        AlgebraNode::Project { .. } => "project",
        AlgebraNode::Distinct { .. } => "distinct",
        AlgebraNode::Reduced { .. } => "reduced",
        AlgebraNode::OrderBy { .. } => "order_by",
        AlgebraNode::Slice { .. } => "slice",
        AlgebraNode::Values { .. } => "values",
        AlgebraNode::Service { .. } => "service",
        AlgebraNode::Graph { .. } => "graph",
        AlgebraNode::Path { .. } => "path",
    }
}

/// True when `node`'s tag equals `tag`.
pub fn is_type(node: &AlgebraNode, tag: &str) -> bool {
    node_type(node) == tag
}

/// The structurally ordered algebra-node children of `node` (never
/// expressions — `filter.expr`, `extend.expr`, etc. are not children here).
pub fn children(node: &AlgebraNode) -> Vec<&AlgebraNode> {
    use AlgebraNode::*;
    match node {
        Bgp(_) | Values { .. } | Path { .. } => vec![],
        Join { left, right } | Minus { left, right } | Union { left, right } => vec![left, right],
        LeftJoin { left, right, .. } => vec![left, right],
        Filter { child, .. }
        | Extend { child, .. }
        | Group { child, .. }
        | Project { child, .. }
        | Distinct { child }
        | Reduced { child }
        | OrderBy { child, .. }
        | Slice { child, .. }
        | Service { child, .. }
        | Graph { child, .. } => vec![child],
    }
}

/// The variables *consumed* anywhere under `node`: triple-pattern and
/// VALUES/path positions, plus the free variables of any expression in
/// the tree. This deliberately excludes variables a node only
/// *introduces* (`extend.var`, `project.vars`, `group.group_vars`,
/// aggregate result variables) — callers that need the set of variables in
/// scope after a subtree use [`in_scope_variables`] instead.
pub fn variables(node: &AlgebraNode) -> BTreeSet<Variable> {
    use AlgebraNode::*;
    match node {
        Bgp(patterns) => patterns.iter().flat_map(|p| p.variables()).collect(),
        Join { left, right } | Minus { left, right } | Union { left, right } => {
            let mut out = variables(left);
            out.extend(variables(right));
            out
        }
        LeftJoin { left, right, filter } => {
            let mut out = variables(left);
            out.extend(variables(right));
            if let Some(f) = filter {
                out.extend(f.free_variables());
            }
            out
        }
        Filter { expr, child } => {
            let mut out = variables(child);
            out.extend(expr.free_variables());
            out
        }
        Extend { child, var: _, expr } => {
            let mut out = variables(child);
            out.extend(expr.free_variables());
            out
        }
        Group { child, group_vars: _, aggregates } => {
            let mut out = variables(child);
            for (_, agg) in aggregates {
                out.extend(agg.free_variables());
            }
            out
        }
        Project { child, .. } | Distinct { child } | Reduced { child } | Slice { child, .. } => variables(child),
        OrderBy { child, conditions } => {
            let mut out = variables(child);
            for c in conditions {
                out.extend(c.expr.free_variables());
            }
            out
        }
        Values { variables: vars, .. } => vars.iter().cloned().collect(),
        Service { endpoint, child, .. } => {
            let mut out = variables(child);
            if let GraphTerm::Variable(v) = endpoint {
                out.insert(v.clone());
            }
            out
        }
        Graph { graph, child } => {
            let mut out = variables(child);
            if let GraphTerm::Variable(v) = graph {
                out.insert(v.clone());
            }
            out
        }
        Path { subject, object, .. } => {
            let mut out = BTreeSet::new();
            if let Some(v) = subject.as_variable() {
                out.insert(v.clone());
            }
            if let Some(v) = object.as_variable() {
                out.insert(v.clone());
            }
            out
        }
    }
}

/// The variables *produced* (bound, possibly to unbound-but-in-scope) by
/// `node` — used to validate that `project`/`group`/`order_by` only
/// reference variables their subtree actually exposes.
pub fn in_scope_variables(node: &AlgebraNode) -> BTreeSet<Variable> {
    use AlgebraNode::*;
    match node {
        Bgp(patterns) => patterns.iter().flat_map(|p| p.variables()).collect(),
        Join { left, right } | Union { left, right } | LeftJoin { left, right, .. } => {
            let mut out = in_scope_variables(left);
            out.extend(in_scope_variables(right));
            out
        }
        // MINUS does not expose its right side's bindings to the outer scope.
        Minus { left, .. } => in_scope_variables(left),
        Filter { child, .. } | Distinct { child } | Reduced { child } | OrderBy { child, .. } | Slice { child, .. } => {
            in_scope_variables(child)
        }
        Extend { child, var, .. } => {
            let mut out = in_scope_variables(child);
            out.insert(var.clone());
            out
        }
        // GROUP BY collapses scope down to the grouping keys and aggregate results.
        Group { group_vars, aggregates, .. } => group_vars
            .iter()
            .cloned()
            .chain(aggregates.iter().map(|(v, _)| v.clone()))
            .collect(),
        Project { child, vars } => in_scope_variables(child).intersection(&vars.iter().cloned().collect()).cloned().collect(),
        Values { variables: vars, .. } => vars.iter().cloned().collect(),
        Service { endpoint, child, .. } => {
            let mut out = in_scope_variables(child);
            if let GraphTerm::Variable(v) = endpoint {
                out.insert(v.clone());
            }
            out
        }
        Graph { graph, child } => {
            let mut out = in_scope_variables(child);
            if let GraphTerm::Variable(v) = graph {
                out.insert(v.clone());
            }
            out
        }
        Path { subject, object, .. } => {
            let mut out = BTreeSet::new();
            if let Some(v) = subject.as_variable() {
                out.insert(v.clone());
            }
            if let Some(v) = object.as_variable() {
                out.insert(v.clone());
            }
            out
        }
    }
}

/// Applies `f` to every node of the tree in post-order (children before
/// parents), threading an accumulator through.
///
/// `fold(T, 0, |_, acc| acc + 1)` counts the nodes of `T` (the tree-size law).
pub fn fold<A>(node: &AlgebraNode, init: A, f: &impl Fn(&AlgebraNode, A) -> A) -> A {
    let acc = children(node).into_iter().fold(init, |acc, child| fold(child, acc, f));
    f(node, acc)
}

/// Rebuilds the tree bottom-up, applying `f` to each node after its
/// children have already been rewritten.
///
/// `map(T, |n| n.clone())` reproduces `T` structurally — this is the
/// identity-map round-trip law.
pub fn map(node: &AlgebraNode, f: &impl Fn(AlgebraNode) -> AlgebraNode) -> AlgebraNode {
    use AlgebraNode::*;
    let rebuilt = match node.clone() {
        Bgp(p) => Bgp(p),
        Join { left, right } => Join {
            left: Box::new(map(&left, f)),
            right: Box::new(map(&right, f)),
        },
        LeftJoin { left, right, filter } => LeftJoin {
            left: Box::new(map(&left, f)),
            right: Box::new(map(&right, f)),
            filter,
        },
        Minus { left, right } => Minus {
            left: Box::new(map(&left, f)),
            right: Box::new(map(&right, f)),
        },
        Union { left, right } => Union {
            left: Box::new(map(&left, f)),
            right: Box::new(map(&right, f)),
        },
        Filter { expr, child } => Filter {
            expr,
            child: Box::new(map(&child, f)),
        },
        Extend { child, var, expr } => Extend {
            child: Box::new(map(&child, f)),
            var,
            expr,
        },
        Group { child, group_vars, aggregates } => Group {
            child: Box::new(map(&child, f)),
            group_vars,
            aggregates,
        },
        Project { child, vars } => Project {
            child: Box::new(map(&child, f)),
            vars,
        },
        Distinct { child } => Distinct { child: Box::new(map(&child, f)) },
        Reduced { child } => Reduced { child: Box::new(map(&child, f)) },
        OrderBy { child, conditions } => OrderBy {
            child: Box::new(map(&child, f)),
            conditions,
        },
        Slice { child, offset, limit } => Slice {
            child: Box::new(map(&child, f)),
            offset,
            limit,
        },
        Values { variables, rows } => Values { variables, rows },
        Service { endpoint, child, silent } => Service {
            endpoint,
            child: Box::new(map(&child, f)),
            silent,
        },
        Graph { graph, child } => Graph {
            graph,
            child: Box::new(map(&child, f)),
        },
        Path { subject, path, object } => Path { subject, path, object },
    };
    f(rebuilt)
}

/// Validates the scope invariants of spec §3.2 that Rust's type system
/// does not already enforce structurally. (Arity is fixed per-variant by
/// the enum itself, and `slice.limit`/`bgp.patterns` are well-typed by
/// construction, so those checks can never fail on a tree built through
/// this module's own constructors; they remain meaningful only at the AST
/// compiler's untrusted boundary — see [`crate::compiler`].)
pub fn validate(node: &AlgebraNode) -> Result<(), AlgebraError> {
    use AlgebraNode::*;
    match node {
        Slice { offset, child, .. } => {
            if *offset < 0 {
                return Err(AlgebraError::NegativeSliceOffset(*offset));
            }
            validate(child)?;
        }
        Values { variables: vars, rows } => {
            for (row_index, row) in rows.iter().enumerate() {
                if row.len() != vars.len() {
                    return Err(AlgebraError::ValuesRowArityMismatch {
                        row_index,
                        expected: vars.len(),
                        found: row.len(),
                    });
                }
            }
        }
        Project { child, vars } => {
            validate(child)?;
            let scope = in_scope_variables(child);
            for v in vars {
                if !scope.contains(v) {
                    return Err(AlgebraError::OutOfScopeVariable(v.clone()));
                }
            }
        }
        Group { child, group_vars, aggregates } => {
            validate(child)?;
            let scope = in_scope_variables(child);
            for v in group_vars {
                if !scope.contains(v) {
                    return Err(AlgebraError::OutOfScopeVariable(v.clone()));
                }
            }
            for (_, agg) in aggregates {
                for v in agg.free_variables() {
                    if !scope.contains(&v) {
                        return Err(AlgebraError::OutOfScopeVariable(v));
                    }
                }
            }
        }
        OrderBy { child, conditions } => {
            validate(child)?;
            let scope = in_scope_variables(child);
            for c in conditions {
                for v in c.expr.free_variables() {
                    if !scope.contains(&v) {
                        return Err(AlgebraError::OutOfScopeVariable(v));
                    }
                }
            }
        }
        _ => {
            for child in children(node) {
                validate(child)?;
            }
        }
    }
    Ok(())
}

/// Renders an indented, human-readable form of the tree for diagnostics.
/// Every level's line starts with the node's tag name.
pub fn pretty_print(node: &AlgebraNode) -> String {
    let mut out = String::new();
    pretty_print_indented(node, 0, &mut out);
    out
}

fn pretty_print_indented(node: &AlgebraNode, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match node {
        AlgebraNode::Bgp(patterns) => {
            let _ = writeln!(out, "{pad}bgp [{} pattern(s)]", patterns.len());
            for p in patterns {
                let _ = writeln!(out, "{pad}  {} {} {}", fmt_pos(&p.subject), fmt_pos(&p.predicate), fmt_pos(&p.object));
            }
            return;
        }
        AlgebraNode::Values { variables, rows } => {
            let _ = writeln!(out, "{pad}values {:?} [{} row(s)]", variables.iter().map(|v| v.to_string()).collect::<Vec<_>>(), rows.len());
            return;
        }
        AlgebraNode::Path { subject, path, object } => {
            let _ = writeln!(out, "{pad}path {} {:?} {}", fmt_pos(subject), path, fmt_pos(object));
            return;
        }
        _ => {
            let _ = writeln!(out, "{pad}{}", node_type(node));
        }
    }
    for child in children(node) {
        pretty_print_indented(child, depth + 1, out);
    }
}

fn fmt_pos(pos: &Position) -> String {
    match pos.as_variable() {
        Some(v) => v.to_string(),
        None => match pos {
            Position::Bound(term_model::BoundValue::Term(t)) => t.to_string(),
            Position::Bound(term_model::BoundValue::Id(id)) => format!("#{}", id.0),
            Position::Variable(_) => unreachable!(),
        },
    }
}

/// For a `select`-shaped tree — a `project` optionally wrapped in any
/// combination of `distinct`/`reduced`/`order_by`/`slice` — the projected
/// result variables, in `project`'s order. Any other tree shape (`ask`,
/// `construct`, a bare pattern) has no result-variable list, so this
/// returns the empty sequence.
pub fn result_variables(node: &AlgebraNode) -> Vec<Variable> {
    match node {
        AlgebraNode::Project { vars, .. } => vars.clone(),
        AlgebraNode::Distinct { child } | AlgebraNode::Reduced { child } | AlgebraNode::OrderBy { child, .. } | AlgebraNode::Slice { child, .. } => {
            result_variables(child)
        }
        _ => Vec::new(),
    }
}

/// Every `bgp` leaf reachable under `node`.
pub fn collect_bgps(node: &AlgebraNode) -> Vec<&AlgebraNode> {
    let mut out = Vec::new();
    collect_bgps_into(node, &mut out);
    out
}

fn collect_bgps_into<'n>(node: &'n AlgebraNode, out: &mut Vec<&'n AlgebraNode>) {
    if matches!(node, AlgebraNode::Bgp(_)) {
        out.push(node);
    }
    for child in children(node) {
        collect_bgps_into(child, out);
    }
}

/// The total number of triple patterns across all `bgp` leaves under `node`.
pub fn triple_count(node: &AlgebraNode) -> usize {
    collect_bgps(node)
        .into_iter()
        .map(|n| match n {
            AlgebraNode::Bgp(p) => p.len(),
            _ => unreachable!(),
        })
        .sum()
}

/// True if `node` contains an OPTIONAL (`left_join`) anywhere.
pub fn has_optional(node: &AlgebraNode) -> bool {
    matches!(node, AlgebraNode::LeftJoin { .. }) || children(node).into_iter().any(has_optional)
}

/// True if `node` contains a UNION anywhere.
pub fn has_union(node: &AlgebraNode) -> bool {
    matches!(node, AlgebraNode::Union { .. }) || children(node).into_iter().any(has_union)
}

/// True if `node` contains a FILTER anywhere.
pub fn has_filter(node: &AlgebraNode) -> bool {
    matches!(node, AlgebraNode::Filter { .. }) || children(node).into_iter().any(has_filter)
}

/// True if `node` contains a GROUP (aggregation) anywhere.
pub fn has_aggregation(node: &AlgebraNode) -> bool {
    matches!(node, AlgebraNode::Group { .. }) || children(node).into_iter().any(has_aggregation)
}

/// Every `filter` node's expression reachable under `node`, in pre-order.
///
/// Only explicit `filter` nodes are gathered here, not `left_join`'s
/// optional join filter — the latter is a different clause (the OPTIONAL's
/// own constraint) and is not counted by [`crate::optimizer::analyze_filters`].
pub fn collect_filters(node: &AlgebraNode) -> Vec<&Expression> {
    let mut out = Vec::new();
    collect_filters_into(node, &mut out);
    out
}

fn collect_filters_into<'n>(node: &'n AlgebraNode, out: &mut Vec<&'n Expression>) {
    if let AlgebraNode::Filter { expr, .. } = node {
        out.push(expr);
    }
    for child in children(node) {
        collect_filters_into(child, out);
    }
}
