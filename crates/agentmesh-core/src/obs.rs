//! Structured lifecycle events for coordination runs.
//!
//! Events are emitted at `info!` (failures and plan findings at `warn!`) with
//! an `event` field so they can be filtered, e.g.
//! `AGENTMESH_LOG=agentmesh_core=info`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped span on the current thread.
///
/// For synchronous code only; async code should attach [`run_span`] with
/// `tracing::Instrument` instead, since an entered span must not be held
/// across `.await`.
///
/// ```ignore
/// let _span = RunSpan::enter("plan-1");
/// // events logged here carry run_id = "plan-1"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// Span tagging every event of one run with its id.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("agentmesh.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, tool_calls: usize) {
    info!(event = "coord.run_started", run_id = %run_id, tool_calls = tool_calls);
}

pub fn emit_plan_built(run_id: &str, levels: usize, total_tasks: usize, estimated_secs: f64) {
    info!(
        event = "coord.plan_built",
        run_id = %run_id,
        levels = levels,
        total_tasks = total_tasks,
        estimated_secs = estimated_secs,
    );
}

pub fn emit_plan_warning(run_id: &str, warning: &dyn std::fmt::Display) {
    warn!(event = "coord.plan_warning", run_id = %run_id, warning = %warning);
}

pub fn emit_level_started(run_id: &str, level: u32, ready: usize, waiting: usize) {
    info!(
        event = "coord.level_started",
        run_id = %run_id,
        level = level,
        ready = ready,
        waiting = waiting,
    );
}

/// Emit event: an attempt failed and the task will be retried.
pub fn emit_task_retrying(task_id: &str, tool: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "coord.task_retrying",
        task_id = %task_id,
        tool = %tool,
        attempt = attempt,
        error = %error,
    );
}

pub fn emit_task_failed(task_id: &str, tool: &str, retries: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "coord.task_failed",
        task_id = %task_id,
        tool = %tool,
        retries = retries,
        error = %error,
    );
}

/// Emit event: a task was never ready and did not run.
pub fn emit_task_skipped(task_id: &str, tool: &str) {
    warn!(event = "coord.task_skipped", task_id = %task_id, tool = %tool);
}

pub fn emit_validation_rejected(task_id: &str, tool: &str) {
    warn!(event = "coord.validation_rejected", task_id = %task_id, tool = %tool);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, succeeded: usize, failed: usize) {
    info!(
        event = "coord.run_finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        succeeded = succeeded,
        failed = failed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_enter() {
        let _span = RunSpan::enter("test-run-id");
        emit_run_started("test-run-id", 0);
    }
}
