//! Error kinds for the planning core.
//!
//! Every kind here is transport-independent: a caller across an RPC or FFI
//! boundary inspects the variant tag, while a human reads the `Display`
//! message. None of these are raised by panicking — validation and
//! compilation failures are recovered at the boundary of the module that
//! detects them.

use term_model::Variable;

/// A malformed algebra tree, detected by [`crate::algebra::validate`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AlgebraError {
    /// An algebra node referenced a tag no constructor in this crate produces.
    #[error("unknown algebra node tag: {0}")]
    UnknownTag(String),

    /// A node had the wrong number of algebra-node children for its tag.
    #[error("node {tag} expects {expected} children, found {found}")]
    WrongArity {
        /// The offending node's tag.
        tag: &'static str,
        /// How many children the tag requires.
        expected: usize,
        /// How many children were actually present.
        found: usize,
    },

    /// A `slice` node's offset was negative (represented here as a
    /// would-be-negative value, since [`crate::algebra::Slice`] stores an
    /// unsigned offset; this variant is raised by constructors that accept
    /// a signed offset from an external AST).
    #[error("slice offset must be non-negative, got {0}")]
    NegativeSliceOffset(i64),

    /// `bgp.patterns` was not a proper ordered sequence (e.g. constructed
    /// from a source that could not guarantee stable ordering).
    #[error("bgp patterns must form an ordered sequence")]
    UnorderedBgpPatterns,

    /// `values` had rows whose length did not match `variables.len()`.
    #[error("values row {row_index} has {found} cells, expected {expected}")]
    ValuesRowArityMismatch {
        /// Index of the offending row.
        row_index: usize,
        /// Required cell count (`variables.len()`).
        expected: usize,
        /// Actual cell count.
        found: usize,
    },

    /// A variable referenced by `project`/`group`/`order_by` was not in
    /// scope of its subtree.
    #[error("variable {0} is not in scope of its subtree")]
    OutOfScopeVariable(Variable),
}

/// Failure to turn a parsed AST into a [`crate::compiler::CompiledQuery`].
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A required AST field (`pattern`) was absent.
    #[error("AST compilation failed: missing required field `{0}`")]
    MissingField(&'static str),

    /// A field was present but shaped wrong for its query type (e.g. a
    /// CONSTRUCT template attached to an ASK query).
    #[error("AST compilation failed: field `{field}` has the wrong shape for a {query_type} query")]
    WrongShape {
        /// The offending field name.
        field: &'static str,
        /// The query type being compiled.
        query_type: &'static str,
    },

    /// The pattern itself failed algebra validation.
    #[error("AST compilation failed: pattern did not validate: {0}")]
    InvalidPattern(#[from] AlgebraError),

    /// `extract_pattern` was given something that is neither a raw AST nor
    /// an already-compiled query.
    #[error("AST compilation failed: input is not a compilable AST or CompiledQuery")]
    NotCompilable,
}

/// The only error the join enumerator can return; every other path
/// produces a plan.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationError {
    /// `enumerate` was called with zero triple patterns.
    #[error("cannot enumerate a join tree over zero patterns")]
    EmptyPatterns,

    /// The caller's cancellation token fired before a plan was produced.
    #[error("join enumeration was cancelled")]
    Cancelled,
}

/// Failure to execute a SPARQL UPDATE.
///
/// Every variant here is returned *before* any write batch is committed:
/// on any `UpdateError`, neither writes nor plan-cache invalidation occur.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The UPDATE's WHERE pattern failed algebra validation.
    #[error("update pattern failed validation: {0}")]
    InvalidPattern(#[from] AlgebraError),

    /// A DELETE/INSERT template referenced a variable that was unbound for
    /// a given solution and not otherwise resolvable to a concrete term.
    #[error("template references unbound variable {0}")]
    UnboundTemplateVariable(Variable),

    /// A quad handed to `INSERT DATA`/`DELETE DATA` contained a variable.
    #[error("INSERT DATA/DELETE DATA requires concrete quads, found a variable")]
    NonConcreteQuad,

    /// The storage collaborator rejected or failed to commit the write batch.
    #[error("storage write batch failed: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// An operation this executor does not (yet) implement, e.g. `LOAD`
    /// without `SILENT`.
    #[error("unsupported update operation: {0}")]
    Unsupported(String),
}
