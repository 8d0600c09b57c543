//! Verify-before-keep safety gate.
//!
//! All agents mutate the workspace through [`guarded_fix`]: the fix runs,
//! the test suite runs, and anything short of a clean pass restores the
//! workspace with the agent's [`RollbackPlan`]. [`enforce_verified`] is the
//! orchestrator's after-the-fact check on reports that claim changes.

use tracing::{info, warn};

use crate::agent::AgentContext;
use crate::domain::{AgentReport, FixOutcome, Phase};
use crate::git;
use crate::obs;

/// What to run to return the workspace to its pre-fix state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackPlan {
    /// Paths returned to their committed state, one restore per path.
    pub paths: Vec<String>,
    /// Run after the checkout (e.g. dependency reinstall).
    pub reinstall_command: Option<String>,
}

impl RollbackPlan {
    pub fn new(paths: Vec<String>, reinstall_command: Option<String>) -> Self {
        Self {
            paths,
            reinstall_command,
        }
    }

    /// Commands in execution order.
    pub fn commands(&self) -> Vec<String> {
        self.paths
            .iter()
            .map(|path| git::restore_command(path))
            .chain(self.reinstall_command.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.reinstall_command.is_none()
    }
}

/// Execute `plan`. Returns whether every command succeeded; later commands
/// still run when an earlier one fails.
pub async fn rollback(ctx: &AgentContext, plan: &RollbackPlan) -> bool {
    let mut all_ok = true;
    for command in plan.commands() {
        match ctx.run_command(&command).await {
            Ok(result) if result.exit_success => {}
            Ok(result) => {
                warn!(command = %command, stderr = %result.stderr.trim(), "Rollback command failed");
                all_ok = false;
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Rollback command could not run");
                all_ok = false;
            }
        }
    }
    all_ok
}

/// FIX_ATTEMPT → VERIFY → (ROLLBACK), recorded into `report`.
///
/// The test suite always runs after the fix attempt. The fix is kept only
/// when both the fixer and the tests succeed; a runner error in either step
/// counts as a failure. A plan with paths needs a git work tree; without one
/// the fix is not attempted at all.
pub async fn guarded_fix(
    ctx: &AgentContext,
    fix_command: &str,
    plan: &RollbackPlan,
    report: &mut AgentReport,
) -> FixOutcome {
    if !plan.paths.is_empty() && !git::is_git_repo(ctx.runner(), &ctx.run_options()).await {
        warn!(
            agent = %report.agent_name,
            root = %ctx.project_root().display(),
            "Not a git work tree; skipping fix that could not be rolled back"
        );
        report.fix_outcome = Some(FixOutcome::Skipped);
        return FixOutcome::Skipped;
    }

    info!(agent = %report.agent_name, command = %fix_command, "Attempting fix");
    let fixer_ok = match ctx.run_command(fix_command).await {
        Ok(result) => result.exit_success,
        Err(e) => {
            warn!(agent = %report.agent_name, error = %e, "Fixer could not run");
            false
        }
    };
    report.record(Phase::FixAttempt, fixer_ok);

    let verify_ok = match ctx.run_tests().await {
        Ok(result) => result.exit_success,
        Err(e) => {
            warn!(agent = %report.agent_name, error = %e, "Test suite could not run");
            false
        }
    };
    report.record(Phase::Verify, verify_ok);

    let outcome = match (fixer_ok, verify_ok) {
        (true, true) => FixOutcome::Applied,
        (false, _) => FixOutcome::FixerFailed,
        (true, false) => FixOutcome::VerifyFailed,
    };

    if outcome == FixOutcome::Applied {
        info!(agent = %report.agent_name, "Fix verified; keeping change");
        report.changes_applied.push(fix_command.to_string());
    } else {
        let rollback_ok = rollback(ctx, plan).await;
        report.record(Phase::Rollback, rollback_ok);
        report.rolled_back = true;
        report.rollback_failed |= !rollback_ok;
        obs::emit_fix_rolled_back(&report.agent_name, outcome, rollback_ok);
    }

    report.fix_outcome = Some(outcome);
    outcome
}

/// Re-check a finished report's kept changes.
///
/// When `changes_applied` is not backed by a passing verify, the test suite
/// runs now; if it fails the plan is executed and the report is rewritten as
/// rolled back. Returns `true` when the report was touched.
pub async fn enforce_verified(
    ctx: &AgentContext,
    plan: &RollbackPlan,
    report: &mut AgentReport,
) -> bool {
    if report.verified_before_keep() {
        return false;
    }

    warn!(
        agent = %report.agent_name,
        changes = report.changes_applied.len(),
        "Changes reported without a passing verify; verifying now"
    );

    let verify_ok = matches!(ctx.run_tests().await, Ok(r) if r.exit_success);
    report.record(Phase::Verify, verify_ok);
    if verify_ok {
        return true;
    }

    let rollback_ok = rollback(ctx, plan).await;
    report.record(Phase::Rollback, rollback_ok);
    report.changes_applied.clear();
    report.rolled_back = true;
    report.rollback_failed |= !rollback_ok;
    report.fix_outcome = Some(FixOutcome::VerifyFailed);
    obs::emit_fix_rolled_back(&report.agent_name, FixOutcome::VerifyFailed, rollback_ok);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentStatus;
    use crate::fakes::ScriptedRunner;
    use crate::runner::CommandResult;
    use std::sync::Arc;

    fn plan() -> RollbackPlan {
        RollbackPlan::new(
            vec!["package.json".to_string()],
            Some("npm install".to_string()),
        )
    }

    fn ctx(runner: Arc<ScriptedRunner>) -> AgentContext {
        AgentContext::new("/repo", "npm test", runner)
    }

    const IN_WORK_TREE: &str = "git rev-parse --is-inside-work-tree";

    #[test]
    fn plan_commands_in_order() {
        let plan = RollbackPlan::new(
            vec!["package.json".to_string(), "package-lock.json".to_string()],
            Some("npm install".to_string()),
        );
        assert_eq!(
            plan.commands(),
            vec![
                git::restore_command("package.json"),
                git::restore_command("package-lock.json"),
                "npm install".to_string()
            ]
        );
        assert!(RollbackPlan::default().commands().is_empty());
        assert!(RollbackPlan::default().is_empty());
    }

    #[tokio::test]
    async fn applied_when_fix_and_tests_pass() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut report = AgentReport::new("lint");
        let outcome = guarded_fix(&ctx(runner.clone()), "eslint --fix", &plan(), &mut report).await;

        assert_eq!(outcome, FixOutcome::Applied);
        assert_eq!(report.changes_applied, vec!["eslint --fix".to_string()]);
        assert!(!report.rolled_back);
        assert!(report.verified_before_keep());
        assert_eq!(runner.calls(), vec![IN_WORK_TREE, "eslint --fix", "npm test"]);
    }

    #[tokio::test]
    async fn fixer_failure_still_verifies_then_rolls_back() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("eslint", CommandResult::failure("eslint --fix", "crash"));
        let mut report = AgentReport::new("lint");
        let outcome = guarded_fix(&ctx(runner.clone()), "eslint --fix", &plan(), &mut report).await;

        assert_eq!(outcome, FixOutcome::FixerFailed);
        assert!(report.rolled_back);
        assert!(report.changes_applied.is_empty());
        assert_eq!(
            runner.calls(),
            vec![
                IN_WORK_TREE.to_string(),
                "eslint --fix".to_string(),
                "npm test".to_string(),
                git::restore_command("package.json"),
                "npm install".to_string()
            ]
        );
        assert!(!report.rollback_failed);
    }

    #[tokio::test]
    async fn failed_restore_is_recorded() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npm test", CommandResult::failure("npm test", "1 failing"));
        runner.respond("if git ls-files", CommandResult::failure("", "fatal: bad path"));
        let mut report = AgentReport::new("lint");
        let outcome = guarded_fix(&ctx(runner.clone()), "eslint --fix", &plan(), &mut report).await;

        assert_eq!(outcome, FixOutcome::VerifyFailed);
        assert!(report.rolled_back);
        assert!(report.rollback_failed);
        assert_eq!(report.status(), AgentStatus::RollbackFailed);
        assert_eq!(
            report.trace.last().map(|s| (s.phase, s.success)),
            Some((Phase::Rollback, false))
        );
        assert!(runner.was_called("npm install"));
    }

    #[tokio::test]
    async fn no_fix_outside_a_work_tree() {
        let runner = Arc::new(ScriptedRunner::new().outside_work_tree());
        let mut report = AgentReport::new("lint");
        let outcome = guarded_fix(&ctx(runner.clone()), "eslint --fix", &plan(), &mut report).await;

        assert_eq!(outcome, FixOutcome::Skipped);
        assert_eq!(report.fix_outcome, Some(FixOutcome::Skipped));
        assert!(!report.rolled_back);
        assert!(report.trace.is_empty());
        assert_eq!(runner.calls(), vec![IN_WORK_TREE]);
    }

    #[tokio::test]
    async fn plan_without_paths_needs_no_work_tree() {
        let runner = Arc::new(ScriptedRunner::new().outside_work_tree());
        let mut report = AgentReport::new("fmt");
        let plan = RollbackPlan::new(Vec::new(), None);
        let outcome = guarded_fix(&ctx(runner.clone()), "cargo fmt", &plan, &mut report).await;

        assert_eq!(outcome, FixOutcome::Applied);
        assert_eq!(runner.calls(), vec!["cargo fmt", "npm test"]);
    }

    #[tokio::test]
    async fn runner_error_during_verify_counts_as_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_with_not_found("npm test");
        let mut report = AgentReport::new("lint");
        let outcome = guarded_fix(&ctx(runner), "eslint --fix", &plan(), &mut report).await;

        assert_eq!(outcome, FixOutcome::VerifyFailed);
        assert!(report.rolled_back);
        assert_eq!(report.fix_outcome, Some(FixOutcome::VerifyFailed));
    }

    #[tokio::test]
    async fn enforce_verified_rolls_back_unverified_changes() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npm test", CommandResult::failure("npm test", "1 failing"));
        let mut report = AgentReport::new("rogue");
        report.changes_applied.push("rewrote everything".to_string());

        assert!(enforce_verified(&ctx(runner.clone()), &plan(), &mut report).await);
        assert!(report.rolled_back);
        assert!(report.changes_applied.is_empty());
        assert!(runner.calls().contains(&"npm install".to_string()));
    }

    #[tokio::test]
    async fn enforce_verified_leaves_verified_reports_alone() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut report = AgentReport::new("clean");
        assert!(!enforce_verified(&ctx(runner.clone()), &plan(), &mut report).await);
        assert!(runner.calls().is_empty());
    }
}
