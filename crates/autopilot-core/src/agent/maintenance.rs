//! Command-driven maintenance agents (lint --fix, formatters, codemods).

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Agent, AgentContext};
use crate::config::MaintenanceConfig;
use crate::domain::{AgentReport, Phase, Result};
use crate::safety::{self, RollbackPlan};

/// `CHECK → (FIX_ATTEMPT → VERIFY → ROLLBACK?) → REPORT`
///
/// Without a check command the fix is always attempted.
#[derive(Debug, Clone)]
pub struct MaintenanceAgent {
    config: MaintenanceConfig,
    description: String,
}

impl MaintenanceAgent {
    pub fn new(config: MaintenanceConfig) -> Self {
        let description = format!("Runs `{}` behind the test suite", config.fix_command);
        Self {
            config,
            description,
        }
    }

    /// `Some(true)` when the check passed and there is nothing to do.
    async fn check(&self, ctx: &AgentContext, report: &mut AgentReport) -> Option<bool> {
        let command = self.config.check_command.as_deref()?;
        let clean = match ctx.run_command(command).await {
            Ok(result) => result.exit_success,
            Err(e) => {
                warn!(agent = %self.config.name, error = %e, "Check command could not run");
                false
            }
        };
        report.record(Phase::Check, clean);
        Some(clean)
    }
}

#[async_trait]
impl Agent for MaintenanceAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn rollback_plan(&self) -> RollbackPlan {
        RollbackPlan::new(
            self.config.rollback_paths.clone(),
            self.config.install_command.clone(),
        )
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReport> {
        let mut report = AgentReport::new(&self.config.name);

        if self.check(ctx, &mut report).await == Some(true) {
            info!(agent = %self.config.name, "Check passed; nothing to fix");
        } else {
            safety::guarded_fix(ctx, &self.config.fix_command, &self.rollback_plan(), &mut report)
                .await;
        }

        report.record(Phase::Report, true);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentStatus, FixOutcome};
    use crate::fakes::ScriptedRunner;
    use crate::runner::CommandResult;
    use std::sync::Arc;

    fn lint(check: Option<&str>) -> MaintenanceAgent {
        MaintenanceAgent::new(MaintenanceConfig {
            name: "lint".to_string(),
            check_command: check.map(str::to_string),
            fix_command: "npx eslint . --fix".to_string(),
            rollback_paths: vec!["src".to_string()],
            install_command: None,
        })
    }

    #[tokio::test]
    async fn passing_check_skips_fix() {
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = AgentContext::new("/repo", "npm test", runner.clone());

        let report = lint(Some("npx eslint .")).run(&ctx).await.unwrap();

        assert_eq!(runner.calls(), vec!["npx eslint ."]);
        assert_eq!(report.status(), AgentStatus::Clean);
        assert!(report.fix_outcome.is_none());
    }

    #[tokio::test]
    async fn failing_check_triggers_guarded_fix() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npx eslint . --fix", CommandResult::success("", ""));
        runner.respond("npx eslint .", CommandResult::failure("", "3 problems"));
        let ctx = AgentContext::new("/repo", "npm test", runner.clone());

        let report = lint(Some("npx eslint .")).run(&ctx).await.unwrap();

        assert_eq!(report.fix_outcome, Some(FixOutcome::Applied));
        assert_eq!(report.changes_applied, vec!["npx eslint . --fix".to_string()]);
        assert!(report.verified_before_keep());
    }

    #[tokio::test]
    async fn broken_fixer_rolls_back_its_paths() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npx eslint . --fix", CommandResult::failure("", "parser crashed"));
        let ctx = AgentContext::new("/repo", "npm test", runner.clone());

        let report = lint(None).run(&ctx).await.unwrap();

        assert_eq!(report.fix_outcome, Some(FixOutcome::FixerFailed));
        assert!(report.rolled_back);
        assert!(runner.was_called(&crate::git::restore_command("src")));
    }
}
