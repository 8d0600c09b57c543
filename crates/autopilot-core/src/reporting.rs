use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::{AgentOutcome, RunReport};

/// Write the run report as pretty JSON (dashboard and CI artifact).
pub fn write_run_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a markdown summary for PR comments and check output.
pub fn render_run_report_md(report: &RunReport) -> String {
    let summary = report.summary();
    let mut out = String::new();

    out.push_str("# Autopilot Run Report\n\n");
    out.push_str(&format!(
        "- run: `{}`\n- status: {}\n- pass: {}\n",
        report.run_id,
        summary.status.as_str(),
        if summary.pass { "yes" } else { "no" }
    ));
    if let Some(sha) = &report.git_sha {
        out.push_str(&format!("- commit: `{}`\n", sha));
    }
    if report.partial {
        out.push_str("- partial: cancelled before all agents ran\n");
    }
    out.push('\n');

    out.push_str("## Summary\n");
    let vulns: Vec<String> = summary
        .vulnerabilities_by_severity
        .iter()
        .rev()
        .map(|(severity, count)| format!("{} {}", count, severity))
        .collect();
    out.push_str(&format!(
        "- vulnerabilities: {}\n- secrets: {}\n- anti-patterns: {}\n- critical findings: {}\n- critical vulnerabilities: {}\n\n",
        if vulns.is_empty() {
            "0".to_string()
        } else {
            vulns.join(", ")
        },
        summary.secret_findings,
        summary.anti_pattern_findings,
        summary.critical_findings,
        summary.critical_vulnerabilities
    ));

    out.push_str("## Agents\n");
    out.push_str("| agent | status | findings | changes |\n|---|---|---|---|\n");
    for record in &report.records {
        let (findings, changes) = record
            .report()
            .map(|r| (r.findings.len(), r.changes_applied.len()))
            .unwrap_or((0, 0));
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            record.agent_name,
            record.status().as_str(),
            findings,
            changes
        ));
    }
    out.push('\n');

    let secrets: Vec<_> = report.reports().flat_map(|r| r.secret_findings()).collect();
    if !secrets.is_empty() {
        out.push_str("### Secrets\n");
        for f in secrets {
            out.push_str(&format!("- `{}:{}` {} ({})\n", f.file, f.line, f.rule_name, f.severity));
        }
        out.push('\n');
    }

    let patterns: Vec<_> = report
        .reports()
        .flat_map(|r| r.anti_pattern_findings())
        .collect();
    if !patterns.is_empty() {
        out.push_str("### Anti-patterns\n");
        for f in patterns {
            out.push_str(&format!("- `{}:{}` {} ({})\n", f.file, f.line, f.rule_name, f.severity));
        }
        out.push('\n');
    }

    if !summary.changes_applied.is_empty() {
        out.push_str("### Applied Changes\n");
        for change in &summary.changes_applied {
            out.push_str(&format!("- `{}`\n", change));
        }
        out.push('\n');
    }

    if !summary.rollback_failed_agents.is_empty() {
        out.push_str("### Rollback Failures\n");
        for agent in &summary.rollback_failed_agents {
            out.push_str(&format!(
                "- {}: workspace may still hold the reverted change\n",
                agent
            ));
        }
        out.push('\n');
    }

    let failures: Vec<_> = report
        .records
        .iter()
        .filter_map(|r| match &r.outcome {
            AgentOutcome::Failed { error } => Some((r.agent_name.as_str(), error.as_str())),
            AgentOutcome::Completed { .. } => None,
        })
        .collect();
    if !failures.is_empty() {
        out.push_str("### Failed Agents\n");
        for (agent, error) in failures {
            out.push_str(&format!("- {}: {}\n", agent, error));
        }
        out.push('\n');
    }

    out
}

/// Write the markdown summary.
pub fn write_run_report_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_run_report_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AgentRecord, AgentReport, Finding, FindingKind, Severity, Vulnerability,
    };
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    fn sample() -> RunReport {
        let mut security = AgentReport::new("security");
        security.vulnerabilities.push(Vulnerability {
            package: "lodash".to_string(),
            severity: Severity::High,
            fix_available: true,
        });
        security.findings.push(Finding {
            file: "config.js".to_string(),
            rule_name: "Password".to_string(),
            line: 1,
            excerpt: "const password = \"abc123\";".to_string(),
            severity: Severity::High,
            kind: FindingKind::Secret,
        });
        security.changes_applied.push("npm audit fix".to_string());

        let at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        RunReport {
            run_id: "run-1".to_string(),
            started_at: at,
            finished_at: at,
            git_sha: Some("abc123".to_string()),
            config_digest: "d".to_string(),
            partial: false,
            records: vec![
                AgentRecord::completed(security),
                AgentRecord::failed("lint", "eslint: command not found"),
            ],
        }
    }

    #[test]
    fn markdown_lists_agents_findings_and_failures() {
        let md = render_run_report_md(&sample());

        assert!(md.starts_with("# Autopilot Run Report\n\n- run: `run-1`\n- status: failed\n- pass: no\n"));
        assert!(md.contains("- vulnerabilities: 1 high\n- secrets: 1\n"));
        assert!(md.contains("| security | issues_found | 1 | 1 |\n"));
        assert!(md.contains("| lint | failed | 0 | 0 |\n"));
        assert!(md.contains("- `config.js:1` Password (high)\n"));
        assert!(md.contains("### Applied Changes\n- `npm audit fix`\n"));
        assert!(md.contains("- lint: eslint: command not found\n"));
        assert!(md.contains("- critical findings: 0\n- critical vulnerabilities: 0\n"));
        assert!(!md.contains("### Anti-patterns"));
        assert!(!md.contains("### Rollback Failures"));
    }

    #[test]
    fn markdown_flags_failed_rollbacks() {
        let mut lint = AgentReport::new("lint");
        lint.rolled_back = true;
        lint.rollback_failed = true;
        let mut report = sample();
        report.records = vec![AgentRecord::completed(lint)];

        let md = render_run_report_md(&report);
        assert!(md.contains("| lint | rollback_failed | 0 | 0 |\n"));
        assert!(md.contains("### Rollback Failures\n- lint: "));
    }

    #[test]
    fn json_artifact_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run_report.json");
        let report = sample();

        write_run_report_json(&path, &report).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["records"][1]["outcome"], "failed");
        assert_eq!(value["records"][0]["report"]["agent_name"], "security");

        let parsed: RunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn markdown_is_written_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run_report.md");
        write_run_report_md(&path, &sample()).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("## Agents"));
    }
}
