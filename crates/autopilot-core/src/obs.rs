//! Structured observability hooks for Autopilot run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via [`run_span`]
//! - Emission functions for key lifecycle events: run start/finish, agent
//!   start/finish/failure, and rollbacks
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use tracing::{info, warn};

use crate::domain::{AgentStatus, FixOutcome, RunSummary};

/// Span tagging everything emitted during a run with its run_id.
///
/// Attach it to the run future with `tracing::Instrument` so the span
/// follows the task across await points.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("autopilot.run", run_id = %run_id)
}

/// Emit event: run started with the selected agents.
pub fn emit_run_started(run_id: &str, agents: &[String]) {
    info!(event = "run.started", run_id = %run_id, agents = ?agents);
}

/// Emit event: run finished with its summary.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, summary: &RunSummary) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        status = ?summary.status,
        pass = summary.pass,
        failed_agents = summary.failed_agents.len(),
        rollback_failed_agents = summary.rollback_failed_agents.len(),
    );
}

/// Emit event: run cancelled between agents.
pub fn emit_run_cancelled(run_id: &str, completed: usize, remaining: usize) {
    warn!(
        event = "run.cancelled",
        run_id = %run_id,
        completed = completed,
        remaining = remaining,
    );
}

/// Emit event: agent started.
pub fn emit_agent_started(agent_name: &str) {
    info!(event = "agent.started", agent = %agent_name);
}

/// Emit event: agent completed with a report.
pub fn emit_agent_finished(agent_name: &str, status: AgentStatus, findings: usize, changes: usize) {
    info!(
        event = "agent.finished",
        agent = %agent_name,
        status = ?status,
        findings = findings,
        changes_applied = changes,
    );
}

/// Emit event: agent failed to produce a report (warning level).
pub fn emit_agent_failed(agent_name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "agent.failed", agent = %agent_name, error = %error);
}

/// Emit event: a fix was reverted.
pub fn emit_fix_rolled_back(agent_name: &str, outcome: FixOutcome, rollback_ok: bool) {
    warn!(
        event = "agent.rolled_back",
        agent = %agent_name,
        outcome = ?outcome,
        rollback_ok = rollback_ok,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
    }
}
