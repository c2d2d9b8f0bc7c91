//! SPARQL filter/extend expressions.
//!
//! Expressions are a tree distinct from [`crate::algebra::AlgebraNode`].
//! Filter push-down inspects expressions (their free variables, their
//! `and`-conjunct structure) but only ever rewrites algebra nodes — it
//! never rebuilds an expression.

use std::collections::BTreeSet;
use term_model::{ConcreteTerm, Variable};

/// A SPARQL filter/extend expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A variable reference.
    Variable(Variable),
    /// A constant term.
    Constant(ConcreteTerm),

    /// `a > b`
    Greater(Box<Expression>, Box<Expression>),
    /// `a < b`
    Less(Box<Expression>, Box<Expression>),
    /// `a = b`
    Equal(Box<Expression>, Box<Expression>),
    /// `a != b`
    NotEqual(Box<Expression>, Box<Expression>),
    /// `a >= b`
    GreaterEq(Box<Expression>, Box<Expression>),
    /// `a <= b`
    LessEq(Box<Expression>, Box<Expression>),

    /// `a && b`
    And(Box<Expression>, Box<Expression>),
    /// `a || b`
    Or(Box<Expression>, Box<Expression>),
    /// `!a`
    Not(Box<Expression>),

    /// `BOUND(?var)`
    Bound(Variable),

    /// `a + b`
    Add(Box<Expression>, Box<Expression>),
    /// `a - b`
    Sub(Box<Expression>, Box<Expression>),
    /// `a * b`
    Multiply(Box<Expression>, Box<Expression>),
    /// `a / b`
    Divide(Box<Expression>, Box<Expression>),

    /// A named function call, e.g. `CONTAINS(?s, "x")` or `STRLEN(?s)`.
    Function {
        /// The function name, as written in the query (e.g. `"CONTAINS"`).
        name: String,
        /// The call's arguments.
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Flattens the top-level conjuncts of an `and`-chain.
    ///
    /// `and(and(a, b), c)` and `and(a, and(b, c))` both yield `[a, b, c]`.
    /// A non-`and` expression yields itself as the sole conjunct.
    pub fn flatten_conjuncts(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        fn walk<'e>(e: &'e Expression, out: &mut Vec<&'e Expression>) {
            match e {
                Expression::And(l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                other => out.push(other),
            }
        }
        walk(self, &mut out);
        out
    }

    /// Rebuilds a right-associated `and`-chain from conjuncts. Returns
    /// `None` for an empty slice (meaning "no filter at all").
    pub fn conjoin(conjuncts: Vec<Expression>) -> Option<Expression> {
        let mut iter = conjuncts.into_iter().rev();
        let mut acc = iter.next()?;
        for e in iter {
            acc = Expression::And(Box::new(e), Box::new(acc));
        }
        Some(acc)
    }

    /// The set of variables textually appearing at this expression's leaves.
    pub fn free_variables(&self) -> BTreeSet<Variable> {
        let mut out = BTreeSet::new();
        self.collect_free_variables(&mut out);
        out
    }

    fn collect_free_variables(&self, out: &mut BTreeSet<Variable>) {
        match self {
            Expression::Variable(v) | Expression::Bound(v) => {
                out.insert(v.clone());
            }
            Expression::Constant(_) => {}
            Expression::Greater(l, r)
            | Expression::Less(l, r)
            | Expression::Equal(l, r)
            | Expression::NotEqual(l, r)
            | Expression::GreaterEq(l, r)
            | Expression::LessEq(l, r)
            | Expression::And(l, r)
            | Expression::Or(l, r)
            | Expression::Add(l, r)
            | Expression::Sub(l, r)
            | Expression::Multiply(l, r)
            | Expression::Divide(l, r) => {
                l.collect_free_variables(out);
                r.collect_free_variables(out);
            }
            Expression::Not(e) => e.collect_free_variables(out),
            Expression::Function { args, .. } => {
                for a in args {
                    a.collect_free_variables(out);
                }
            }
        }
    }
}

/// An aggregate descriptor appearing inside `group.aggregates`.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    /// `COUNT(expr)` or `COUNT(*)` when `expr` is `None`.
    Count {
        /// The counted expression, or `None` for `COUNT(*)`.
        expr: Option<Box<Expression>>,
        /// Whether `DISTINCT` was specified.
        distinct: bool,
    },
    /// `SUM(expr)`
    Sum(Box<Expression>, bool),
    /// `AVG(expr)`
    Avg(Box<Expression>, bool),
    /// `MIN(expr)`
    Min(Box<Expression>, bool),
    /// `MAX(expr)`
    Max(Box<Expression>, bool),
    /// `GROUP_CONCAT(expr)`
    GroupConcat(Box<Expression>, bool),
    /// `SAMPLE(expr)`
    Sample(Box<Expression>, bool),
}

impl Aggregate {
    /// The free variables of the aggregate's argument expression, if any.
    pub fn free_variables(&self) -> BTreeSet<Variable> {
        match self {
            Aggregate::Count { expr, .. } => expr.as_ref().map(|e| e.free_variables()).unwrap_or_default(),
            Aggregate::Sum(e, _)
            | Aggregate::Avg(e, _)
            | Aggregate::Min(e, _)
            | Aggregate::Max(e, _)
            | Aggregate::GroupConcat(e, _)
            | Aggregate::Sample(e, _) => e.free_variables(),
        }
    }
}
