//! Static configuration for an Autopilot run.
//!
//! Loaded once from TOML (`autopilot.toml`) and read-only afterwards. Every
//! field is optional in the file; omitted rule lists and extension lists fall
//! back to the built-in defaults in [`crate::scanner::rules`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{AutopilotError, Result, Severity};

/// Default config file name looked up in the project root.
pub const DEFAULT_CONFIG_FILE: &str = "autopilot.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    /// Root of the project the agents operate on.
    pub project_root: PathBuf,

    /// Command that runs the project's test suite (the safety gate).
    pub test_command: String,

    /// Default per-command timeout; 0 disables it.
    pub command_timeout_secs: u64,

    /// Path patterns excluded from scanning: exact names or `*` globs.
    pub skip: Vec<String>,

    pub secrets: RuleSetConfig,
    pub anti_patterns: RuleSetConfig,
    pub security: SecurityConfig,

    /// Additional command-driven maintenance agents.
    pub maintenance: Vec<MaintenanceConfig>,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            test_command: "npm test".to_string(),
            command_timeout_secs: 900,
            skip: default_skip_list(),
            secrets: RuleSetConfig::default(),
            anti_patterns: RuleSetConfig::default(),
            security: SecurityConfig::default(),
            maintenance: Vec::new(),
        }
    }
}

fn default_skip_list() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "dist",
        "build",
        "coverage",
        ".next",
        "target",
        "package-lock.json",
        "*.min.js",
        "*.map",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// One rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Overrides for one rule set. `None` means "use the built-in default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSetConfig {
    pub rules: Option<Vec<RuleConfig>>,
    pub extensions: Option<Vec<String>>,
    pub include_env_files: Option<bool>,
    pub default_severity: Option<Severity>,
    /// Substrings that mark a line as safe (line-oriented sets only).
    pub safe_markers: Option<Vec<String>>,
}

/// Commands used by the security agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub audit_command: String,
    pub fix_command: String,
    pub install_command: String,
    /// Files the fixer may touch; restored on rollback.
    pub rollback_paths: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            audit_command: "npm audit --json".to_string(),
            fix_command: "npm audit fix".to_string(),
            install_command: "npm install".to_string(),
            rollback_paths: vec!["package.json".to_string(), "package-lock.json".to_string()],
        }
    }
}

/// A command-driven maintenance agent (lint --fix, formatter, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub name: String,

    /// Runs first; a passing check means there is nothing to fix.
    #[serde(default)]
    pub check_command: Option<String>,

    pub fix_command: String,

    /// Paths returned to their committed state on rollback.
    pub rollback_paths: Vec<String>,

    /// Run after the paths are restored during rollback, if set.
    #[serde(default)]
    pub install_command: Option<String>,
}

impl AutopilotConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AutopilotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.test_command.trim().is_empty() {
            return Err(AutopilotError::InvalidConfig(
                "test_command must not be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        names.insert(crate::agent::SECURITY_AGENT_NAME);
        for agent in &self.maintenance {
            if agent.name.trim().is_empty() {
                return Err(AutopilotError::InvalidConfig(
                    "maintenance agent name must not be empty".to_string(),
                ));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(AutopilotError::InvalidConfig(format!(
                    "duplicate agent name: {}",
                    agent.name
                )));
            }
            if agent.fix_command.trim().is_empty() {
                return Err(AutopilotError::InvalidConfig(format!(
                    "maintenance agent {} has an empty fix_command",
                    agent.name
                )));
            }
        }

        Ok(())
    }

    /// SHA-256 of the effective configuration, hex encoded.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AutopilotConfig::default();
        assert_eq!(config.test_command, "npm test");
        assert!(config.skip.contains(&"node_modules".to_string()));
        assert_eq!(config.security.audit_command, "npm audit --json");
        assert!(config.secrets.rules.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AutopilotConfig::from_toml_str(
            r#"
            test_command = "pnpm test"
            skip = ["vendor"]

            [secrets]
            safe_markers = ["dummy"]

            [[secrets.rules]]
            name = "Slack Token"
            pattern = "xox[bp]-[0-9A-Za-z-]+"
            severity = "high"

            [[maintenance]]
            name = "lint"
            fix_command = "npx eslint --fix ."
            rollback_paths = ["src"]

            [github]
            owner = "ignored-here"
            "#,
        )
        .expect("parse config");

        assert_eq!(config.test_command, "pnpm test");
        assert_eq!(config.skip, vec!["vendor".to_string()]);
        assert_eq!(config.security, SecurityConfig::default());
        let rules = config.secrets.rules.as_ref().expect("rules");
        assert_eq!(rules[0].severity, Some(Severity::High));
        assert!(config.anti_patterns.rules.is_none());
        assert_eq!(config.maintenance[0].name, "lint");
        assert!(config.maintenance[0].check_command.is_none());
    }

    #[test]
    fn test_duplicate_agent_names_rejected() {
        let err = AutopilotConfig::from_toml_str(
            r#"
            [[maintenance]]
            name = "security"
            fix_command = "true"
            rollback_paths = []
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate agent name"));
    }

    #[test]
    fn test_empty_test_command_rejected() {
        let err = AutopilotConfig::from_toml_str("test_command = \"  \"").unwrap_err();
        assert!(matches!(err, AutopilotError::InvalidConfig(_)));
    }

    #[test]
    fn test_digest_is_stable_and_sensitive() {
        let a = AutopilotConfig::default();
        let b = AutopilotConfig::default();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);

        let mut c = AutopilotConfig::default();
        c.test_command = "cargo test".to_string();
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            AutopilotConfig::load_or_default(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, AutopilotConfig::default());
    }
}
