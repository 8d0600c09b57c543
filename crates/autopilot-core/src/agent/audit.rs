//! Dependency audit output parsing.
//!
//! Understands `npm audit --json` in both the npm 7+ shape (a
//! `vulnerabilities` map) and the npm 6 shape (an `advisories` map).

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::domain::{Severity, Vulnerability};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuditReport {
    Modern {
        vulnerabilities: BTreeMap<String, ModernVulnerability>,
    },
    Legacy {
        advisories: BTreeMap<String, LegacyAdvisory>,
    },
}

#[derive(Debug, Deserialize)]
struct ModernVulnerability {
    #[serde(default)]
    name: Option<String>,
    severity: String,
    #[serde(rename = "fixAvailable", default)]
    fix_available: Option<FixAvailable>,
}

/// npm reports either `true`/`false` or an object describing the fix.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixAvailable {
    Flag(bool),
    Details(serde_json::Value),
}

impl FixAvailable {
    fn is_available(&self) -> bool {
        match self {
            FixAvailable::Flag(flag) => *flag,
            FixAvailable::Details(_) => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyAdvisory {
    module_name: String,
    severity: String,
    #[serde(default)]
    patched_versions: Option<String>,
}

/// Parse audit JSON into vulnerabilities sorted by package name.
///
/// Unknown severity labels are reported as `Low`.
pub fn parse_audit_output(stdout: &str) -> Result<Vec<Vulnerability>, serde_json::Error> {
    let report: AuditReport = serde_json::from_str(stdout)?;

    let mut vulnerabilities: Vec<Vulnerability> = match report {
        AuditReport::Modern { vulnerabilities } => vulnerabilities
            .into_iter()
            .map(|(key, v)| Vulnerability {
                package: v.name.unwrap_or(key),
                severity: Severity::from_label(&v.severity).unwrap_or(Severity::Low),
                fix_available: v.fix_available.is_some_and(|f| f.is_available()),
            })
            .collect(),
        AuditReport::Legacy { advisories } => advisories
            .into_values()
            .map(|a| Vulnerability {
                package: a.module_name,
                severity: Severity::from_label(&a.severity).unwrap_or(Severity::Low),
                fix_available: a
                    .patched_versions
                    .is_some_and(|p| !p.trim().is_empty() && p.trim() != "<0.0.0"),
            })
            .collect(),
    };

    vulnerabilities.sort_by(|a, b| a.package.cmp(&b.package));
    Ok(vulnerabilities)
}
