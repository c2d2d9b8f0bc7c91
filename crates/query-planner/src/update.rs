//! The UPDATE executor (spec §4.8).
//!
//! Every operation is turned into [`WriteOp`]s and gathered into a single
//! `Vec` *before* anything is committed. `execute` only calls
//! [`WriteSink::write_batch`] once, and only invalidates the plan cache
//! after that single call returns `Ok` — on any error along the way,
//! nothing has been written and the cache is untouched.

use crate::algebra::AlgebraNode;
use crate::cache::PlanCache;
use crate::error::UpdateError;
use crate::storage::{WriteOp, WriteSink};
use rustc_hash::FxHashMap;
use term_model::{ConcreteTerm, GraphTerm, Position, Quad, QuadPattern, Variable};

use crate::compiler::{GraphScope, UpdateOperation};

/// One evaluated WHERE-clause solution: a binding from variable to a
/// concrete term. Evaluating `pattern` itself is the evaluator's job
/// (out of scope here, spec §7); this executor only instantiates
/// templates against solutions it's handed.
pub type Solution = FxHashMap<Variable, ConcreteTerm>;

/// Instantiates `template` against `solution`, producing concrete quads.
///
/// Errors if any template position is a variable absent from `solution`.
fn instantiate_template(template: &[QuadPattern], solution: &Solution) -> Result<Vec<Quad>, UpdateError> {
    template.iter().map(|qp| instantiate_quad_pattern(qp, solution)).collect()
}

fn instantiate_quad_pattern(qp: &QuadPattern, solution: &Solution) -> Result<Quad, UpdateError> {
    let resolve = |pos: &Position| -> Result<ConcreteTerm, UpdateError> {
        match pos {
            Position::Bound(term_model::BoundValue::Term(t)) => Ok(t.clone()),
            Position::Bound(term_model::BoundValue::Id(_)) => Err(UpdateError::Unsupported(
                "templates must resolve to concrete terms before instantiation, not dictionary ids".to_string(),
            )),
            Position::Variable(v) => solution.get(v).cloned().ok_or_else(|| UpdateError::UnboundTemplateVariable(v.clone())),
        }
    };
    let graph = match &qp.graph {
        None => None,
        Some(GraphTerm::NamedNode(iri)) => Some(iri.clone()),
        Some(GraphTerm::Variable(v)) => match solution.get(v) {
            Some(ConcreteTerm::NamedNode(iri)) => Some(iri.clone()),
            Some(_) => return Err(UpdateError::Unsupported("graph variable bound to a non-IRI term".to_string())),
            None => return Err(UpdateError::UnboundTemplateVariable(v.clone())),
        },
    };
    Ok(Quad {
        subject: resolve(&qp.subject)?,
        predicate: resolve(&qp.predicate)?,
        object: resolve(&qp.object)?,
        graph,
    })
}

fn require_concrete(quads: &[QuadPattern]) -> Result<Vec<Quad>, UpdateError> {
    quads
        .iter()
        .map(|qp| {
            if !qp.is_concrete() {
                return Err(UpdateError::NonConcreteQuad);
            }
            // `is_concrete` already guarantees every field resolves without a solution.
            instantiate_quad_pattern(qp, &Solution::default())
        })
        .collect()
}

/// How to evaluate a `DELETE`/`INSERT ... WHERE` pattern into solutions.
/// The evaluator itself is out of scope (spec §7); this executor only
/// needs *a* way to obtain solutions for the pattern it validated.
pub trait PatternEvaluator {
    /// Evaluates `pattern` (already validated) to its solution sequence.
    fn evaluate(&self, pattern: &AlgebraNode) -> Result<Vec<Solution>, UpdateError>;
}

/// Fetches the quads of a `LOAD`'s source document. Parsing RDF from a URL
/// is out of scope of this crate (spec §4.8 names `load` as an operation
/// this executor dispatches, not as a document fetcher/parser it
/// implements); this trait is the boundary an embedding engine supplies,
/// the same role [`PatternEvaluator`] plays for WHERE-clause evaluation.
pub trait DocumentFetcher {
    /// Fetches and parses `source`, returning its quads.
    fn fetch(&self, source: &str) -> Result<Vec<Quad>, UpdateError>;
}

/// Resolves a [`GraphScope`] naming a single graph (not `AllGraphs`/
/// `AllNamed`) to the `Option<Arc<str>>` shape [`WriteOp::ClearGraph`]
/// expects.
fn resolve_single_graph(target: &GraphScope) -> Result<Option<std::sync::Arc<str>>, UpdateError> {
    match target {
        GraphScope::DefaultGraph => Ok(None),
        GraphScope::NamedGraph(GraphTerm::NamedNode(iri)) => Ok(Some(iri.clone())),
        GraphScope::NamedGraph(GraphTerm::Variable(_)) => {
            Err(UpdateError::Unsupported("CLEAR/DROP with a variable graph term requires prior resolution".to_string()))
        }
        GraphScope::AllGraphs | GraphScope::AllNamed => unreachable!("caller dispatches All* targets separately"),
    }
}

/// Gathers the [`WriteOp`]s for a `CLEAR`/`DROP` target, shared by both
/// operations since this crate's quad-only storage model has no graph
/// catalog distinct from quad membership.
fn gather_clear_like(target: &GraphScope) -> Result<Vec<WriteOp>, UpdateError> {
    match target {
        GraphScope::AllGraphs => Ok(vec![WriteOp::ClearAllGraphs]),
        GraphScope::AllNamed => Ok(vec![WriteOp::ClearAllNamed]),
        single => Ok(vec![WriteOp::ClearGraph(resolve_single_graph(single)?)]),
    }
}

/// Gathers the write batch for one [`UpdateOperation`], without committing
/// anything yet.
fn gather_ops(op: &UpdateOperation, evaluator: &dyn PatternEvaluator, fetcher: &dyn DocumentFetcher) -> Result<Vec<WriteOp>, UpdateError> {
    use crate::algebra;
    match op {
        UpdateOperation::InsertData(quads) => Ok(require_concrete(quads)?.into_iter().map(WriteOp::InsertQuad).collect()),
        UpdateOperation::DeleteData(quads) => Ok(require_concrete(quads)?.into_iter().map(WriteOp::RemoveQuad).collect()),
        UpdateOperation::DeleteInsert { delete_template, insert_template, pattern } => {
            algebra::validate(pattern)?;
            let solutions = evaluator.evaluate(pattern)?;
            let mut ops = Vec::new();
            for solution in &solutions {
                for quad in instantiate_template(delete_template, solution)? {
                    ops.push(WriteOp::RemoveQuad(quad));
                }
            }
            for solution in &solutions {
                for quad in instantiate_template(insert_template, solution)? {
                    ops.push(WriteOp::InsertQuad(quad));
                }
            }
            Ok(ops)
        }
        UpdateOperation::Clear { target, silent: _ } => gather_clear_like(target),
        UpdateOperation::Drop { target, silent: _ } => gather_clear_like(target),
        UpdateOperation::Create { graph, silent: _ } => match graph {
            GraphTerm::NamedNode(iri) => Ok(vec![WriteOp::EnsureGraphExists(iri.clone())]),
            GraphTerm::Variable(_) => Err(UpdateError::Unsupported("CREATE with a variable graph term requires prior resolution".to_string())),
        },
        UpdateOperation::Load { source, into, silent } => {
            let graph_name = match into {
                None => None,
                Some(GraphTerm::NamedNode(iri)) => Some(iri.clone()),
                Some(GraphTerm::Variable(_)) => {
                    return Err(UpdateError::Unsupported("LOAD with a variable destination graph requires prior resolution".to_string()))
                }
            };
            match fetcher.fetch(source) {
                Ok(quads) => Ok(quads
                    .into_iter()
                    .map(|q| WriteOp::InsertQuad(Quad { graph: graph_name.clone(), ..q }))
                    .collect()),
                Err(err) if *silent => {
                    let _ = err;
                    Ok(Vec::new())
                }
                Err(err) => Err(err),
            }
        }
    }
}

/// Executes a sequence of update operations as a single atomic write
/// batch, invalidating `cache` only once the batch has committed.
///
/// On any `Err`, the storage collaborator was never called and `cache` is
/// left untouched: no writes means no invalidation.
pub fn execute<V>(
    operations: &[UpdateOperation],
    evaluator: &dyn PatternEvaluator,
    fetcher: &dyn DocumentFetcher,
    sink: &dyn WriteSink,
    cache: &PlanCache<V>,
) -> Result<u64, UpdateError> {
    let mut batch = Vec::new();
    for op in operations {
        batch.extend(gather_ops(op, evaluator, fetcher)?);
    }

    let affected = sink.write_batch(batch)?;
    cache.invalidate_all();
    Ok(affected)
}
