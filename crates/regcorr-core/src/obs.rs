//! Structured observability hooks for regression run lifecycle events.
//!
//! Events are emitted at `info!` level under a run-scoped span; filter with
//! `RUST_LOG`.

use tracing::{info, warn};

/// Span tagging every event of one run with its name.
///
/// Attach with `tracing::Instrument` so the run future stays `Send`:
///
/// ```ignore
/// pipeline.run().instrument(run_span("main_site-a")).await
/// ```
pub fn run_span(run_name: &str) -> tracing::Span {
    tracing::info_span!("regcorr.run", run_name = %run_name)
}

/// Emit event: run started.
pub fn emit_run_started(run_name: &str, root_a: &str, root_b: &str, worker_count: usize) {
    info!(
        event = "run.started",
        run_name = %run_name,
        root_a = %root_a,
        root_b = %root_b,
        worker_count = worker_count,
    );
}

/// Emit event: a stage was loaded from its checkpoint.
pub fn emit_checkpoint_hit(key: &str) {
    info!(event = "checkpoint.hit", key = %key);
}

/// Emit event: a stage was computed and checkpointed.
pub fn emit_checkpoint_stored(key: &str) {
    info!(event = "checkpoint.stored", key = %key);
}

/// Emit event: a stored outcome set was computed from a different match set.
pub fn emit_checkpoint_stale(key: &str, stored: &str, current: &str) {
    warn!(
        event = "checkpoint.stale",
        key = %key,
        stored_digest = %stored,
        current_digest = %current,
    );
}

/// Emit event: indexes matched.
pub fn emit_matched(pairs: usize, missing_in_a: usize, missing_in_b: usize) {
    info!(
        event = "match.completed",
        pairs = pairs,
        missing_in_a = missing_in_a,
        missing_in_b = missing_in_b,
    );
}

/// Emit event: correlation pool drained.
pub fn emit_correlated(total: usize, failures: usize, sub_optimal: usize, duration_ms: u64) {
    info!(
        event = "correlation.completed",
        total = total,
        failures = failures,
        sub_optimal = sub_optimal,
        duration_ms = duration_ms,
    );
}

/// Emit event: a category matched no aggregation group and was dropped.
pub fn emit_category_unassigned(category: &str) {
    warn!(event = "aggregate.unassigned", category = %category);
}

/// Emit event: run finished.
pub fn emit_run_finished(run_name: &str, duration_ms: u64, pairs: usize, failures: usize) {
    info!(
        event = "run.finished",
        run_name = %run_name,
        duration_ms = duration_ms,
        pairs = pairs,
        failures = failures,
    );
}

/// Emit event: the report sink rejected the report (warning level).
pub fn emit_report_error(run_name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "report.error", run_name = %run_name, error = %error);
}
