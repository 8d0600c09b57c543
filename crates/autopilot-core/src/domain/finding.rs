//! Rules, findings and vulnerabilities.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::{AutopilotError, Result};

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a severity label as emitted by audit tools.
    ///
    /// npm reports `info` and `moderate`; those fold into `Low` and `Medium`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "info" | "low" => Some(Severity::Low),
            "moderate" | "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which family of rule produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Secret,
    AntiPattern,
}

/// A named pattern. Immutable once compiled.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub pattern: Regex,
    pub severity: Option<Severity>,
}

impl Rule {
    /// Compile a rule from its configured pattern.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        severity: Option<Severity>,
    ) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| AutopilotError::InvalidRule {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name,
            pattern,
            severity,
        })
    }
}

/// One rule match at a specific file and line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Path relative to the scanned root, `/`-separated.
    pub file: String,
    pub rule_name: String,
    /// 1-based line number.
    pub line: usize,
    pub excerpt: String,
    pub severity: Severity,
    pub kind: FindingKind,
}

/// A dependency vulnerability reported by the audit step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub package: String,
    pub severity: Severity,
    pub fix_available: bool,
}
