//! Cost-based SPARQL query planning core.
//!
//! This crate owns the pipeline between a parsed query and a costed
//! physical plan: algebra representation, the AST compiler boundary,
//! cardinality estimation, the cost model, join-order enumeration, the
//! filter-push-down optimizer, the plan cache, and atomic UPDATE
//! execution. It does not parse SPARQL text, store triples, resolve a
//! term dictionary, evaluate a plan against data, orchestrate
//! transactions, or decide how telemetry is exported — those are all
//! external collaborators reached through the traits this crate defines
//! (see [`storage`] and [`telemetry`]).

#![warn(missing_docs, rust_2018_idioms)]

pub mod algebra;
pub mod cache;
pub mod cardinality;
pub mod compiler;
pub mod cost;
pub mod enumerator;
pub mod error;
pub mod expression;
pub mod optimizer;
pub mod storage;
pub mod telemetry;
pub mod update;

pub use algebra::AlgebraNode;
pub use cache::{CacheKey, CacheStats, PlanCache};
pub use compiler::{compile, CompiledQuery, QueryAst, QueryForm, UpdateAst, UpdateOperation};
pub use cost::{CostModelConfig, CostVector};
pub use enumerator::{enumerate, enumerate_with_cancellation, CancellationToken, Plan, PlanNode};
pub use error::{AlgebraError, CompileError, EnumerationError, UpdateError};
pub use optimizer::{optimize, OptimizerOptions};
pub use storage::{StatsSnapshot, StatisticsProvider, StorageError, WriteOp, WriteSink};
pub use telemetry::{Measurements, OperationKind, TelemetrySink, TracingTelemetrySink};

#[cfg(test)]
mod integration_smoke_test {
    use super::*;
    use term_model::{ConcreteTerm, TriplePattern, Variable};

    #[test]
    fn compile_optimize_and_enumerate_a_small_query_end_to_end() {
        let iri = |s: &str| ConcreteTerm::NamedNode(s.into());
        let pattern = AlgebraNode::Filter {
            expr: crate::expression::Expression::Greater(
                Box::new(crate::expression::Expression::Variable(Variable::new("age"))),
                Box::new(crate::expression::Expression::Constant(iri("http://ex/18"))),
            ),
            child: Box::new(AlgebraNode::Join {
                left: Box::new(AlgebraNode::Bgp(vec![TriplePattern::new(Variable::new("person"), iri("http://ex/age"), Variable::new("age"))])),
                right: Box::new(AlgebraNode::Bgp(vec![TriplePattern::new(Variable::new("person"), iri("http://ex/name"), Variable::new("name"))])),
            }),
        };

        let ast = QueryAst {
            form: QueryForm::Select,
            pattern: Some(pattern),
            select_vars: Some(vec![Variable::new("name")]),
            construct_template: None,
            dataset: vec![],
            base_iri: None,
        };
        let compiled = compile(ast).unwrap();

        let optimized = optimize(&compiled.pattern, OptimizerOptions::default());
        let bgps: Vec<TriplePattern> = algebra::collect_bgps(&optimized)
            .into_iter()
            .flat_map(|n| match n {
                AlgebraNode::Bgp(p) => p.clone(),
                _ => vec![],
            })
            .collect();

        let stats = StatsSnapshot::default();
        let config = CostModelConfig::default();
        let plan = enumerate(&bgps, &stats, &config).unwrap();
        assert!(plan.cardinality >= 1.0);

        let cache: PlanCache<Plan> = PlanCache::new(std::num::NonZeroUsize::new(16).unwrap());
        let key = CacheKey::normalize(&optimized);
        let cached = cache.get_or_compute(key, || plan.clone());
        assert_eq!(cached.cardinality, plan.cardinality);
    }
}
