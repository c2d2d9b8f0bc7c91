//! The AST compiler boundary (spec §4.2).
//!
//! A SPARQL text parser lives outside this crate; what it hands over is a
//! small untyped-ish AST shape that this module turns into a validated
//! [`CompiledQuery`]/[`AlgebraNode`] pair the rest of the planner can trust.
//! `compile` is the only place in this crate that treats its input as
//! adversarial: every other module assumes the algebra it's handed already
//! satisfies [`algebra::validate`].

use crate::algebra::{self, AlgebraNode};
use crate::error::CompileError;
use term_model::{GraphTerm, QuadPattern, Variable};

/// The kind of top-level query a [`QueryAst`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
    /// `SELECT`
    Select,
    /// `CONSTRUCT`
    Construct,
    /// `ASK`
    Ask,
    /// `DESCRIBE`
    Describe,
}

/// The untyped shape handed over by an external SPARQL text parser.
///
/// Exactly one of `select_vars`/`construct_template` is meaningful,
/// depending on `form`; `compile` is where that's checked.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAst {
    /// Which query form this is.
    pub form: QueryForm,
    /// The WHERE-clause algebra, already parsed into this crate's tree.
    pub pattern: Option<AlgebraNode>,
    /// `SELECT`'s projected variables (only meaningful for `Select`).
    pub select_vars: Option<Vec<Variable>>,
    /// `CONSTRUCT`'s template quads (only meaningful for `Construct`).
    pub construct_template: Option<Vec<QuadPattern>>,
    /// The active default/named graphs (`FROM`/`FROM NAMED`), if specified.
    pub dataset: Vec<GraphTerm>,
    /// The query's base IRI, if one was declared.
    pub base_iri: Option<String>,
}

/// The graph target of a `CLEAR`/`DROP` operation (spec §4.8:
/// `graph ∈ {all_graphs, all_named, default_graph, named_graph(iri)}`).
#[derive(Debug, Clone, PartialEq)]
pub enum GraphScope {
    /// Every graph, including the default graph.
    AllGraphs,
    /// Every named graph; the default graph is left untouched.
    AllNamed,
    /// The default graph only.
    DefaultGraph,
    /// One named graph.
    NamedGraph(GraphTerm),
}

/// One `UPDATE` operation (spec §4.8). Dataset clauses (`USING`, `WITH`)
/// are out of scope here — the AST is assumed already resolved to concrete
/// graph terms by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperation {
    /// `INSERT DATA { ... }`
    InsertData(Vec<QuadPattern>),
    /// `DELETE DATA { ... }`
    DeleteData(Vec<QuadPattern>),
    /// `DELETE { .. } INSERT { .. } WHERE { .. }`
    DeleteInsert {
        /// Templates removed for each WHERE solution.
        delete_template: Vec<QuadPattern>,
        /// Templates inserted for each WHERE solution.
        insert_template: Vec<QuadPattern>,
        /// The pattern solutions are drawn from.
        pattern: AlgebraNode,
    },
    /// `CLEAR [SILENT] GRAPH <g> | DEFAULT | NAMED | ALL`
    Clear {
        /// Which graph(s) to clear.
        target: GraphScope,
        /// Whether a missing graph should be silently ignored.
        silent: bool,
    },
    /// `LOAD <source> [INTO GRAPH <g>]`
    Load {
        /// The source document IRI.
        source: String,
        /// The destination graph, or `None` for the default graph.
        into: Option<GraphTerm>,
        /// Whether a failed load should be silently ignored.
        silent: bool,
    },
    /// `DROP [SILENT] GRAPH <g> | DEFAULT | NAMED | ALL` — a graph-lifecycle
    /// op (spec §4.8). In this crate's quad-only storage model (no separate
    /// graph catalog) it has the same physical effect as `Clear` over the
    /// same target: a graph that holds no quads is indistinguishable from
    /// one that never existed.
    Drop {
        /// Which graph(s) to drop.
        target: GraphScope,
        /// Whether a missing graph should be silently ignored.
        silent: bool,
    },
    /// `CREATE [SILENT] GRAPH <g>` — a graph-lifecycle op (spec §4.8). With
    /// no graph catalog to register against, this is an existence
    /// check/no-op: the graph will exist as soon as a quad references it.
    Create {
        /// The graph to create.
        graph: GraphTerm,
        /// Whether an already-existing graph should be silently ignored.
        silent: bool,
    },
}

/// An `UPDATE` request: a sequence of operations executed in order
/// (spec §4.8 notes the whole sequence still commits as one write batch).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAst {
    /// The operations to execute, in source order.
    pub operations: Vec<UpdateOperation>,
}

/// A validated query, ready for the optimizer and join enumerator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Which query form this is.
    pub query_type: QueryForm,
    /// The validated WHERE-clause algebra.
    pub pattern: AlgebraNode,
    /// `CONSTRUCT`'s template, if `query_type` is `Construct`.
    pub template: Option<Vec<QuadPattern>>,
    /// The active dataset, if any was declared.
    pub dataset: Vec<GraphTerm>,
    /// The query's base IRI, if one was declared.
    pub base_iri: Option<String>,
}

/// Compiles a parsed [`QueryAst`] into a [`CompiledQuery`], validating the
/// algebra and checking that the AST's optional fields match its `form`.
pub fn compile(ast: QueryAst) -> Result<CompiledQuery, CompileError> {
    let pattern = ast.pattern.ok_or(CompileError::MissingField("pattern"))?;
    algebra::validate(&pattern)?;

    match ast.form {
        QueryForm::Select => {
            let vars = ast.select_vars.ok_or(CompileError::MissingField("select_vars"))?;
            if ast.construct_template.is_some() {
                return Err(CompileError::WrongShape { field: "construct_template", query_type: "SELECT" });
            }
            let pattern = AlgebraNode::Project { child: Box::new(pattern), vars };
            algebra::validate(&pattern)?;
            Ok(CompiledQuery {
                query_type: QueryForm::Select,
                pattern,
                template: None,
                dataset: ast.dataset,
                base_iri: ast.base_iri,
            })
        }
        QueryForm::Construct => {
            let template = ast.construct_template.ok_or(CompileError::MissingField("construct_template"))?;
            if ast.select_vars.is_some() {
                return Err(CompileError::WrongShape { field: "select_vars", query_type: "CONSTRUCT" });
            }
            Ok(CompiledQuery {
                query_type: QueryForm::Construct,
                pattern,
                template: Some(template),
                dataset: ast.dataset,
                base_iri: ast.base_iri,
            })
        }
        QueryForm::Ask => {
            if ast.select_vars.is_some() || ast.construct_template.is_some() {
                return Err(CompileError::WrongShape { field: "select_vars/construct_template", query_type: "ASK" });
            }
            Ok(CompiledQuery {
                query_type: QueryForm::Ask,
                pattern,
                template: None,
                dataset: ast.dataset,
                base_iri: ast.base_iri,
            })
        }
        QueryForm::Describe => Ok(CompiledQuery {
            query_type: QueryForm::Describe,
            pattern,
            template: None,
            dataset: ast.dataset,
            base_iri: ast.base_iri,
        }),
    }
}

/// Extracts the WHERE-clause algebra from either a raw [`QueryAst`] or an
/// already-[`compile`]d [`CompiledQuery`] — the join enumerator and cache
/// only need the pattern, not the rest of either shape.
pub trait PatternSource {
    /// Returns the pattern, compiling first if necessary.
    fn extract_pattern(self) -> Result<AlgebraNode, CompileError>;
}

impl PatternSource for QueryAst {
    fn extract_pattern(self) -> Result<AlgebraNode, CompileError> {
        Ok(compile(self)?.pattern)
    }
}

impl PatternSource for CompiledQuery {
    fn extract_pattern(self) -> Result<AlgebraNode, CompileError> {
        Ok(self.pattern)
    }
}

/// Free-function form of [`PatternSource::extract_pattern`], for callers
/// that don't want to name the trait.
pub fn extract_pattern<T: PatternSource>(source: T) -> Result<AlgebraNode, CompileError> {
    source.extract_pattern()
}
