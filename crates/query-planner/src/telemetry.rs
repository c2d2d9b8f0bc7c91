//! The telemetry boundary (spec §6.3).
//!
//! This crate never decides how events are exported (no metrics backend
//! dependency lives here); it only defines the shape of what it emits and
//! a default [`TracingTelemetrySink`] that turns that shape into
//! `tracing` spans/events, matching how the rest of this crate logs.

use std::time::Duration;

/// One of the two operation kinds this crate emits telemetry for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// A read query: compile → optimize → enumerate → (cached) plan.
    Query,
    /// An UPDATE: write-batch commit plus cache invalidation.
    Update,
}

impl OperationKind {
    fn event_namespace(self) -> &'static str {
        match self {
            OperationKind::Query => "triple_store.query",
            OperationKind::Update => "triple_store.update",
        }
    }
}

/// Measurements attached to a `stop` event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurements {
    /// Wall-clock duration of the operation.
    pub duration: Option<Duration>,
    /// Estimated or actual result cardinality, if known.
    pub cardinality: Option<f64>,
    /// Number of cache hits contributing to this operation.
    pub cache_hits: Option<u64>,
}

/// The boundary the planning core uses to report lifecycle events,
/// independent of whatever metrics/tracing backend the embedding
/// application actually wires up.
pub trait TelemetrySink: Send + Sync {
    /// An operation began.
    fn start(&self, kind: OperationKind, plan_id: &str);
    /// An operation finished successfully.
    fn stop(&self, kind: OperationKind, plan_id: &str, measurements: Measurements);
    /// An operation failed.
    fn exception(&self, kind: OperationKind, plan_id: &str, error: &str);
}

/// The default [`TelemetrySink`], logging every event as a `tracing` span
/// event at the same target convention the rest of this crate uses.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn start(&self, kind: OperationKind, plan_id: &str) {
        tracing::info!(event = %format!("[{}, start]", kind.event_namespace()), plan_id);
    }

    fn stop(&self, kind: OperationKind, plan_id: &str, measurements: Measurements) {
        tracing::info!(
            event = %format!("[{}, stop]", kind.event_namespace()),
            plan_id,
            duration_ms = measurements.duration.map(|d| d.as_secs_f64() * 1000.0),
            cardinality = measurements.cardinality,
            cache_hits = measurements.cache_hits,
        );
    }

    fn exception(&self, kind: OperationKind, plan_id: &str, error: &str) {
        tracing::warn!(event = %format!("[{}, exception]", kind.event_namespace()), plan_id, error);
    }
}
