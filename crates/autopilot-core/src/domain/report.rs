//! Agent and run reports.
//!
//! An [`AgentReport`] is built by exactly one agent invocation. The
//! orchestrator folds the reports, in invocation order, into a [`RunReport`],
//! which is the only artifact handed across the core/dashboard boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::finding::{Finding, FindingKind, Severity, Vulnerability};

/// Step of the agent state machine, as recorded in the execution trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Audit,
    Check,
    FixAttempt,
    Verify,
    Rollback,
    ScanSecrets,
    ScanPatterns,
    Report,
}

/// One executed step and whether it succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub phase: Phase,
    pub success: bool,
}

/// Why a guarded fix ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixOutcome {
    /// Fixer succeeded and the test suite passed afterwards.
    Applied,
    /// Fixer succeeded but the test suite failed; the change was rolled back.
    VerifyFailed,
    /// Fixer exited non-zero or could not run; the workspace was rolled back.
    FixerFailed,
    /// Not attempted: the rollback paths could not be restored because the
    /// project root is not a git work tree.
    Skipped,
}

/// Coarse per-agent status. Keeps "clean", "issues", "rolled back",
/// "rollback failed" and "failed to run" apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Clean,
    IssuesFound,
    RolledBack,
    /// A rollback ran but did not restore the workspace.
    RollbackFailed,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Clean => "clean",
            AgentStatus::IssuesFound => "issues_found",
            AgentStatus::RolledBack => "rolled_back",
            AgentStatus::RollbackFailed => "rollback_failed",
            AgentStatus::Failed => "failed",
        }
    }
}

/// Result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent_name: String,
    pub changes_applied: Vec<String>,
    pub findings: Vec<Finding>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub rolled_back: bool,
    /// Set when a rollback command failed; the workspace may still hold the
    /// reverted change.
    #[serde(default)]
    pub rollback_failed: bool,
    pub fix_outcome: Option<FixOutcome>,
    pub trace: Vec<TraceStep>,
}

impl AgentReport {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            changes_applied: Vec::new(),
            findings: Vec::new(),
            vulnerabilities: Vec::new(),
            rolled_back: false,
            rollback_failed: false,
            fix_outcome: None,
            trace: Vec::new(),
        }
    }

    /// Append a step to the execution trace.
    pub fn record(&mut self, phase: Phase, success: bool) {
        self.trace.push(TraceStep { phase, success });
    }

    pub fn secret_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::Secret)
    }

    pub fn anti_pattern_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::AntiPattern)
    }

    /// True when any finding or vulnerability is critical.
    pub fn has_critical(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity == Severity::Critical)
            || self
                .vulnerabilities
                .iter()
                .any(|v| v.severity == Severity::Critical)
    }

    pub fn critical_vulnerabilities(&self) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .count()
    }

    /// `pass := !rolled_back && !rollback_failed && no critical findings`.
    pub fn passed(&self) -> bool {
        !self.rolled_back && !self.rollback_failed && !self.has_critical()
    }

    pub fn status(&self) -> AgentStatus {
        if self.rollback_failed {
            AgentStatus::RollbackFailed
        } else if self.rolled_back {
            AgentStatus::RolledBack
        } else if self.findings.is_empty() && self.vulnerabilities.is_empty() {
            AgentStatus::Clean
        } else {
            AgentStatus::IssuesFound
        }
    }

    /// Whether every kept change is backed by a passing verify.
    ///
    /// Holds trivially when nothing was applied. Otherwise the trace must
    /// contain a successful `Verify` after the last `FixAttempt` (or anywhere,
    /// if no fix attempt was traced).
    pub fn verified_before_keep(&self) -> bool {
        if self.changes_applied.is_empty() {
            return true;
        }
        let from = self
            .trace
            .iter()
            .rposition(|s| s.phase == Phase::FixAttempt)
            .unwrap_or(0);
        self.trace[from..]
            .iter()
            .any(|s| s.phase == Phase::Verify && s.success)
    }
}

/// How one selected agent ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AgentOutcome {
    Completed { report: AgentReport },
    Failed { error: String },
}

/// One entry of a run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_name: String,
    #[serde(flatten)]
    pub outcome: AgentOutcome,
}

impl AgentRecord {
    pub fn completed(report: AgentReport) -> Self {
        Self {
            agent_name: report.agent_name.clone(),
            outcome: AgentOutcome::Completed { report },
        }
    }

    pub fn failed(agent_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            outcome: AgentOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn report(&self) -> Option<&AgentReport> {
        match &self.outcome {
            AgentOutcome::Completed { report } => Some(report),
            AgentOutcome::Failed { .. } => None,
        }
    }

    pub fn status(&self) -> AgentStatus {
        match &self.outcome {
            AgentOutcome::Completed { report } => report.status(),
            AgentOutcome::Failed { .. } => AgentStatus::Failed,
        }
    }
}

/// Overall run status, shared with remote workflow runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

/// Aggregate, immutable result of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub git_sha: Option<String>,
    /// Digest of the effective configuration the run used.
    pub config_digest: String,
    /// Set when the run was cancelled before every selected agent ran.
    pub partial: bool,
    /// Agent records in invocation order.
    pub records: Vec<AgentRecord>,
}

impl RunReport {
    pub fn get(&self, agent_name: &str) -> Option<&AgentRecord> {
        self.records.iter().find(|r| r.agent_name == agent_name)
    }

    pub fn reports(&self) -> impl Iterator<Item = &AgentReport> {
        self.records.iter().filter_map(AgentRecord::report)
    }

    pub fn failed_agents(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, AgentOutcome::Failed { .. }))
            .map(|r| r.agent_name.as_str())
            .collect()
    }

    /// Counts the dashboard needs for rendering and a pass/fail decision.
    pub fn summary(&self) -> RunSummary {
        let mut vulnerabilities_by_severity = BTreeMap::new();
        let mut secret_findings = 0;
        let mut anti_pattern_findings = 0;
        let mut critical_findings = 0;
        let mut critical_vulnerabilities = 0;
        let mut changes_applied = Vec::new();
        let mut rolled_back_agents = Vec::new();
        let mut rollback_failed_agents = Vec::new();

        for report in self.reports() {
            for vuln in &report.vulnerabilities {
                *vulnerabilities_by_severity.entry(vuln.severity).or_insert(0) += 1;
            }
            secret_findings += report.secret_findings().count();
            anti_pattern_findings += report.anti_pattern_findings().count();
            critical_findings += report
                .findings
                .iter()
                .filter(|f| f.severity == Severity::Critical)
                .count();
            critical_vulnerabilities += report.critical_vulnerabilities();
            changes_applied.extend(report.changes_applied.iter().cloned());
            if report.rolled_back {
                rolled_back_agents.push(report.agent_name.clone());
            }
            if report.rollback_failed {
                rollback_failed_agents.push(report.agent_name.clone());
            }
        }

        let failed_agents: Vec<String> =
            self.failed_agents().into_iter().map(str::to_string).collect();
        let pass = !self.partial
            && failed_agents.is_empty()
            && self.reports().all(AgentReport::passed);

        let status = if self.partial {
            RunStatus::Cancelled
        } else if pass {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        RunSummary {
            status,
            agents_total: self.records.len(),
            failed_agents,
            rolled_back_agents,
            rollback_failed_agents,
            vulnerabilities_by_severity,
            secret_findings,
            anti_pattern_findings,
            critical_findings,
            critical_vulnerabilities,
            changes_applied,
            pass,
        }
    }
}

/// Dashboard-facing counts derived from a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub agents_total: usize,
    pub failed_agents: Vec<String>,
    pub rolled_back_agents: Vec<String>,
    /// Agents whose rollback did not complete; their workspace needs a look.
    pub rollback_failed_agents: Vec<String>,
    pub vulnerabilities_by_severity: BTreeMap<Severity, usize>,
    pub secret_findings: usize,
    pub anti_pattern_findings: usize,
    /// Critical scan findings (secrets and anti-patterns).
    pub critical_findings: usize,
    /// Critical audit vulnerabilities; these fail `pass` like critical findings.
    pub critical_vulnerabilities: usize,
    pub changes_applied: Vec<String>,
    pub pass: bool,
}
