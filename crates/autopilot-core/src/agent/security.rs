//! Security agent: dependency audit, guarded auto-fix, secret and
//! anti-pattern scans.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::audit::parse_audit_output;
use super::{Agent, AgentContext, SECURITY_AGENT_NAME};
use crate::config::{AutopilotConfig, SecurityConfig};
use crate::domain::{AgentReport, Finding, Phase, Result, Vulnerability};
use crate::safety::{self, RollbackPlan};
use crate::scanner::{anti_pattern_rule_set, secret_rule_set, PatternScanner, RuleSet};

/// `AUDIT → (FIX_ATTEMPT → VERIFY → ROLLBACK?) → SCAN_SECRETS → SCAN_PATTERNS → REPORT`
#[derive(Debug, Clone)]
pub struct SecurityAgent {
    config: SecurityConfig,
    scanner: Arc<PatternScanner>,
    secrets: Arc<RuleSet>,
    anti_patterns: Arc<RuleSet>,
}

impl SecurityAgent {
    pub fn new(
        config: SecurityConfig,
        scanner: PatternScanner,
        secrets: RuleSet,
        anti_patterns: RuleSet,
    ) -> Self {
        Self {
            config,
            scanner: Arc::new(scanner),
            secrets: Arc::new(secrets),
            anti_patterns: Arc::new(anti_patterns),
        }
    }

    /// Compile rule sets and skip list from the loaded configuration.
    pub fn from_config(config: &AutopilotConfig) -> Result<Self> {
        Ok(Self::new(
            config.security.clone(),
            PatternScanner::from_patterns(&config.skip)?,
            secret_rule_set(&config.secrets)?,
            anti_pattern_rule_set(&config.anti_patterns)?,
        ))
    }

    async fn audit(&self, ctx: &AgentContext, report: &mut AgentReport) -> Vec<Vulnerability> {
        let result = match ctx.run_command(&self.config.audit_command).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Audit command could not run; continuing without audit");
                report.record(Phase::Audit, false);
                return Vec::new();
            }
        };

        // npm exits non-zero whenever vulnerabilities exist, so the exit
        // status says nothing about whether the output is usable.
        match parse_audit_output(&result.stdout) {
            Ok(vulnerabilities) => {
                report.record(Phase::Audit, true);
                vulnerabilities
            }
            Err(e) => {
                warn!(error = %e, "Audit output unparseable; continuing without audit");
                report.record(Phase::Audit, false);
                Vec::new()
            }
        }
    }

    async fn scan(
        &self,
        ctx: &AgentContext,
        rule_set: &Arc<RuleSet>,
        phase: Phase,
        report: &mut AgentReport,
    ) -> Vec<Finding> {
        let scanner = Arc::clone(&self.scanner);
        let rules = Arc::clone(rule_set);
        let root: PathBuf = ctx.project_root().to_path_buf();

        let joined =
            tokio::task::spawn_blocking(move || scanner.scan_with_stats(&root, &rules)).await;

        match joined {
            Ok((findings, stats)) => {
                info!(
                    rule_set = %rule_set.name,
                    files_scanned = stats.files_scanned,
                    unreadable = stats.unreadable,
                    findings = findings.len(),
                    "Scan complete"
                );
                report.record(phase, true);
                findings
            }
            Err(e) => {
                warn!(rule_set = %rule_set.name, error = %e, "Scan task aborted");
                report.record(phase, false);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Agent for SecurityAgent {
    fn name(&self) -> &str {
        SECURITY_AGENT_NAME
    }

    fn description(&self) -> &str {
        "Dependency audit with verified auto-fix, secret and anti-pattern scanning"
    }

    fn rollback_plan(&self) -> RollbackPlan {
        RollbackPlan::new(
            self.config.rollback_paths.clone(),
            Some(self.config.install_command.clone()),
        )
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReport> {
        let mut report = AgentReport::new(SECURITY_AGENT_NAME);

        let vulnerabilities = self.audit(ctx, &mut report).await;
        let fixable = vulnerabilities.iter().filter(|v| v.fix_available).count();
        info!(
            vulnerabilities = vulnerabilities.len(),
            fixable = fixable,
            "Dependency audit finished"
        );
        report.vulnerabilities = vulnerabilities;

        if fixable > 0 {
            safety::guarded_fix(ctx, &self.config.fix_command, &self.rollback_plan(), &mut report)
                .await;
        }

        let mut findings = self
            .scan(ctx, &self.secrets, Phase::ScanSecrets, &mut report)
            .await;
        findings.extend(
            self.scan(ctx, &self.anti_patterns, Phase::ScanPatterns, &mut report)
                .await,
        );
        report.findings = findings;

        report.record(Phase::Report, true);
        info!(
            secrets = report.secret_findings().count(),
            anti_patterns = report.anti_pattern_findings().count(),
            changes_applied = report.changes_applied.len(),
            rolled_back = report.rolled_back,
            "Security report assembled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FixOutcome, Severity};
    use crate::fakes::ScriptedRunner;
    use crate::runner::CommandResult;
    use std::fs;
    use tempfile::TempDir;

    const HIGH_FIXABLE: &str = r#"{"vulnerabilities": {
        "lodash": {"name": "lodash", "severity": "high", "fixAvailable": true}
    }}"#;

    const CRITICAL_UNFIXABLE: &str = r#"{"vulnerabilities": {
        "minimist": {"name": "minimist", "severity": "critical", "fixAvailable": false}
    }}"#;

    fn agent() -> SecurityAgent {
        SecurityAgent::from_config(&AutopilotConfig::default()).unwrap()
    }

    fn audit_result(json: &str) -> CommandResult {
        // npm audit exits 1 when it finds anything.
        CommandResult::failure("npm audit --json", "").with_stdout(json)
    }

    #[tokio::test]
    async fn failed_verify_rolls_back_and_keeps_vulnerability() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npm audit --json", audit_result(HIGH_FIXABLE));
        runner.respond("npm test", CommandResult::failure("npm test", "2 failing"));
        let ctx = AgentContext::new(dir.path(), "npm test", runner.clone());

        let report = agent().run(&ctx).await.unwrap();

        assert!(report.rolled_back);
        assert!(report.changes_applied.is_empty());
        assert_eq!(report.fix_outcome, Some(FixOutcome::VerifyFailed));
        assert_eq!(report.vulnerabilities.len(), 1);
        assert_eq!(report.vulnerabilities[0].severity, Severity::High);
        assert!(runner.was_called("npm audit fix"));
        assert!(runner.was_called(&crate::git::restore_command("package.json")));
        assert!(runner.was_called(&crate::git::restore_command("package-lock.json")));
        assert!(runner.was_called("npm install"));
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn unfixable_vulnerability_never_attempts_fix() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npm audit --json", audit_result(CRITICAL_UNFIXABLE));
        let ctx = AgentContext::new(dir.path(), "npm test", runner.clone());

        let report = agent().run(&ctx).await.unwrap();

        assert!(!runner.was_called("npm audit fix"));
        assert!(!runner.was_called("npm test"));
        assert!(report.changes_applied.is_empty());
        assert!(!report.rolled_back);
        assert_eq!(report.vulnerabilities[0].severity, Severity::Critical);
        assert!(!report.trace.iter().any(|s| s.phase == Phase::FixAttempt));
    }

    #[tokio::test]
    async fn verified_fix_is_recorded_as_applied() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npm audit --json", audit_result(HIGH_FIXABLE));
        let ctx = AgentContext::new(dir.path(), "npm test", runner);

        let report = agent().run(&ctx).await.unwrap();

        assert_eq!(report.changes_applied, vec!["npm audit fix".to_string()]);
        assert!(report.verified_before_keep());
        assert!(report.passed());
    }

    #[tokio::test]
    async fn unparseable_audit_still_scans() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.js"), "const password = \"abc123\";\n").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npm audit", CommandResult::failure("npm audit", "npm ERR! code ENOLOCK"));
        let ctx = AgentContext::new(dir.path(), "npm test", runner);

        let report = agent().run(&ctx).await.unwrap();

        assert!(report.vulnerabilities.is_empty());
        assert_eq!(report.trace[0].phase, Phase::Audit);
        assert!(!report.trace[0].success);
        assert_eq!(report.secret_findings().count(), 1);
        assert_eq!(report.findings[0].rule_name, "Password");
    }

    #[tokio::test]
    async fn missing_audit_tool_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail_with_not_found("npm");
        let ctx = AgentContext::new(dir.path(), "npm test", runner);

        let report = agent().run(&ctx).await.unwrap();
        assert!(report.vulnerabilities.is_empty());
        assert_eq!(report.trace.last().map(|s| s.phase), Some(Phase::Report));
    }

    #[tokio::test]
    async fn anti_patterns_are_reported_separately() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.js"), "eval(input);\n").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("npm audit --json", audit_result(r#"{"vulnerabilities": {}}"#));
        let ctx = AgentContext::new(dir.path(), "npm test", runner);

        let report = agent().run(&ctx).await.unwrap();
        assert_eq!(report.secret_findings().count(), 0);
        assert_eq!(report.anti_pattern_findings().count(), 1);
    }
}
