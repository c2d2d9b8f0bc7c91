//! Owned RDF term and triple-pattern types.
//!
//! Values here are cheaply cloneable (`Arc<str>`-backed) and carry no
//! lifetime parameter, so a query planner can cache a [`TriplePattern`] or
//! a resolved [`Quad`] independent of any parser or request lifetime.
//!
//! The dictionary that maps these terms to and from [`TermId`]s is owned by
//! the storage collaborator; this crate only defines the wire shape both
//! sides agree on.

#![warn(missing_docs, rust_2018_idioms)]

use std::fmt;
use std::sync::Arc;

/// Distinguishes the three literal shapes SPARQL recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    /// A plain string literal with no datatype or language tag.
    Simple,
    /// A literal with an explicit datatype IRI (carried in `extra`).
    Typed,
    /// A literal with a language tag (carried in `extra`).
    Lang,
}

/// An RDF literal: a lexical form plus an optional datatype or language tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Literal {
    /// Which of the three literal shapes this is.
    pub kind: LiteralKind,
    /// The literal's lexical form.
    pub lexical: Arc<str>,
    /// Datatype IRI for `Typed`, language tag for `Lang`, absent for `Simple`.
    pub extra: Option<Arc<str>>,
}

impl Literal {
    /// A plain string literal.
    pub fn simple(lexical: impl Into<Arc<str>>) -> Self {
        Self {
            kind: LiteralKind::Simple,
            lexical: lexical.into(),
            extra: None,
        }
    }

    /// A literal with an explicit datatype IRI.
    pub fn typed(lexical: impl Into<Arc<str>>, datatype_iri: impl Into<Arc<str>>) -> Self {
        Self {
            kind: LiteralKind::Typed,
            lexical: lexical.into(),
            extra: Some(datatype_iri.into()),
        }
    }

    /// A literal with a language tag.
    pub fn lang(lexical: impl Into<Arc<str>>, language: impl Into<Arc<str>>) -> Self {
        Self {
            kind: LiteralKind::Lang,
            lexical: lexical.into(),
            extra: Some(language.into()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LiteralKind::Simple => write!(f, "\"{}\"", self.lexical),
            LiteralKind::Typed => write!(f, "\"{}\"^^<{}>", self.lexical, self.extra.as_deref().unwrap_or("")),
            LiteralKind::Lang => write!(f, "\"{}\"@{}", self.lexical, self.extra.as_deref().unwrap_or("")),
        }
    }
}

/// A SPARQL variable name, without the leading `?`/`$` sigil.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(Arc<str>);

impl Variable {
    /// Creates a variable with the given name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The variable's name, without the sigil.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// A concrete (non-variable) RDF term.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConcreteTerm {
    /// An IRI reference.
    NamedNode(Arc<str>),
    /// A blank node, identified by a scoped label.
    BlankNode(Arc<str>),
    /// A literal value.
    Literal(Literal),
}

impl ConcreteTerm {
    /// True for `BlankNode`. Scan-cost and cardinality rules treat blank
    /// nodes as unbound, since they carry no selectivity across a query.
    pub fn is_blank(&self) -> bool {
        matches!(self, ConcreteTerm::BlankNode(_))
    }
}

impl fmt::Display for ConcreteTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteTerm::NamedNode(iri) => write!(f, "<{iri}>"),
            ConcreteTerm::BlankNode(label) => write!(f, "_:{label}"),
            ConcreteTerm::Literal(lit) => write!(f, "{lit}"),
        }
    }
}

/// A dictionary identifier: a term already resolved by the storage
/// collaborator to a dense integer surrogate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub u64);

/// A term at a pattern position once it may have been dictionary-resolved.
///
/// The cardinality estimator accepts either shape: a textual term fresh
/// from a parser, or an already-resolved id from storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BoundValue {
    /// A term by its textual/structural representation.
    Term(ConcreteTerm),
    /// A term by its dictionary id.
    Id(TermId),
}

impl BoundValue {
    /// True only for [`BoundValue::Term`] wrapping a blank node; a resolved
    /// [`TermId`] carries no blank-node information at this layer.
    pub fn is_blank(&self) -> bool {
        matches!(self, BoundValue::Term(t) if t.is_blank())
    }
}

/// A single position within a [`TriplePattern`]: either a variable, or a
/// bound value that participates in the scan.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Position {
    /// An unbound variable.
    Variable(Variable),
    /// A bound term or dictionary id.
    Bound(BoundValue),
}

impl Position {
    /// The variable at this position, if any.
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Position::Variable(v) => Some(v),
            Position::Bound(_) => None,
        }
    }

    /// Structurally bound: not a variable. Note this still counts blank
    /// nodes as bound; callers that need the cardinality-estimator's
    /// "blank nodes are unbound" rule should also check [`Position::is_blank`].
    pub fn is_bound(&self) -> bool {
        !matches!(self, Position::Variable(_))
    }

    /// True for a bound position holding a blank node term.
    pub fn is_blank(&self) -> bool {
        matches!(self, Position::Bound(b) if b.is_blank())
    }
}

impl From<Variable> for Position {
    fn from(v: Variable) -> Self {
        Position::Variable(v)
    }
}

impl From<ConcreteTerm> for Position {
    fn from(t: ConcreteTerm) -> Self {
        Position::Bound(BoundValue::Term(t))
    }
}

impl From<TermId> for Position {
    fn from(id: TermId) -> Self {
        Position::Bound(BoundValue::Id(id))
    }
}

/// A (subject, predicate, object) triple pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    /// Subject position.
    pub subject: Position,
    /// Predicate position.
    pub predicate: Position,
    /// Object position.
    pub object: Position,
}

impl TriplePattern {
    /// Creates a triple pattern from its three positions.
    pub fn new(subject: impl Into<Position>, predicate: impl Into<Position>, object: impl Into<Position>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The deduplicated variables appearing anywhere in the pattern, in
    /// subject/predicate/object order of first appearance.
    pub fn variables(&self) -> Vec<Variable> {
        let mut seen = Vec::new();
        for pos in [&self.subject, &self.predicate, &self.object] {
            if let Some(var) = pos.as_variable() {
                if !seen.contains(var) {
                    seen.push(var.clone());
                }
            }
        }
        seen
    }
}

/// A graph term: either a fixed named graph, or a variable ranging over graphs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GraphTerm {
    /// A fixed named graph IRI.
    NamedNode(Arc<str>),
    /// A variable bound to the matched graph name.
    Variable(Variable),
}

/// A fully concrete quad, as materialized by `INSERT DATA`/`DELETE DATA`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Quad {
    /// Subject term.
    pub subject: ConcreteTerm,
    /// Predicate term.
    pub predicate: ConcreteTerm,
    /// Object term.
    pub object: ConcreteTerm,
    /// Named graph IRI, or `None` for the default graph.
    pub graph: Option<Arc<str>>,
}

/// A quad template: positions may be variables, to be instantiated against
/// a binding produced by evaluating a WHERE pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuadPattern {
    /// Subject position.
    pub subject: Position,
    /// Predicate position.
    pub predicate: Position,
    /// Object position.
    pub object: Position,
    /// Graph this quad belongs to; `None` is the default graph.
    pub graph: Option<GraphTerm>,
}

impl QuadPattern {
    /// True when every position and the graph (if any) is a concrete term,
    /// i.e. this pattern needs no binding to materialize into a [`Quad`].
    pub fn is_concrete(&self) -> bool {
        self.subject.as_variable().is_none()
            && self.predicate.as_variable().is_none()
            && self.object.as_variable().is_none()
            && !matches!(self.graph, Some(GraphTerm::Variable(_)))
    }
}
