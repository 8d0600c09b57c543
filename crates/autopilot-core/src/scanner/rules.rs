//! Built-in rule sets and their compilation from configuration.

use crate::config::{RuleConfig, RuleSetConfig};
use crate::domain::{FindingKind, Result, Rule, Severity};
use crate::scanner::{RuleSet, ScanMode};

const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "mjs", "cjs", "vue", "svelte", "py", "rb", "go", "rs", "java", "php",
];

const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "properties", "xml", "env", "sh",
];

/// Substrings that suppress a secret match on the same line:
/// environment-variable access and obvious sample values.
const DEFAULT_SAFE_MARKERS: &[&str] = &[
    "process.env",
    "import.meta.env",
    "os.environ",
    "std::env",
    "example",
    "placeholder",
];

fn rule(name: &str, pattern: &str, severity: Option<Severity>) -> RuleConfig {
    RuleConfig {
        name: name.to_string(),
        pattern: pattern.to_string(),
        severity,
    }
}

/// Default secret rules, in report order.
pub fn default_secret_rules() -> Vec<RuleConfig> {
    vec![
        rule(
            "API Key",
            r#"(?i)api[_-]?key\s*[:=]\s*['"][A-Za-z0-9_\-]{16,}['"]"#,
            Some(Severity::High),
        ),
        rule("AWS Access Key", r"\bAKIA[0-9A-Z]{16}\b", Some(Severity::Critical)),
        rule(
            "Password",
            r#"(?i)password\s*[:=]\s*['"][^'"\s]{4,}['"]"#,
            Some(Severity::High),
        ),
        rule(
            "Private Key",
            r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
            Some(Severity::Critical),
        ),
        rule("GitHub Token", r"\bgh[pousr]_[A-Za-z0-9]{36}\b", Some(Severity::Critical)),
        rule(
            "Generic Secret",
            r#"(?i)(?:client_secret|secret_key|secret)\s*[:=]\s*['"][^'"\s]{8,}['"]"#,
            None,
        ),
        rule(
            "JWT",
            r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}",
            Some(Severity::Medium),
        ),
    ]
}

/// Default anti-pattern rules, in report order.
pub fn default_anti_pattern_rules() -> Vec<RuleConfig> {
    vec![
        rule("Eval Usage", r"\beval\s*\(", Some(Severity::High)),
        rule("Function Constructor", r"\bnew\s+Function\s*\(", Some(Severity::High)),
        rule(
            "Dangerous innerHTML",
            r"dangerouslySetInnerHTML|\.innerHTML\s*=",
            Some(Severity::Medium),
        ),
        rule("Document Write", r"\bdocument\.write\s*\(", Some(Severity::Medium)),
        rule("Hardcoded HTTP URL", r#"['"]http://[^'"\s]+['"]"#, Some(Severity::Low)),
        rule("Console Log", r"\bconsole\.log\s*\(", Some(Severity::Low)),
    ]
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn compile_rules(configs: &[RuleConfig]) -> Result<Vec<Rule>> {
    configs
        .iter()
        .map(|c| Rule::new(c.name.clone(), &c.pattern, c.severity))
        .collect()
}

/// Compile the secret rule set, applying overrides from `config`.
pub fn secret_rule_set(config: &RuleSetConfig) -> Result<RuleSet> {
    let rules = match &config.rules {
        Some(rules) => compile_rules(rules)?,
        None => compile_rules(&default_secret_rules())?,
    };
    let extensions = config.extensions.clone().unwrap_or_else(|| {
        let mut exts = to_strings(SOURCE_EXTENSIONS);
        exts.extend(to_strings(CONFIG_EXTENSIONS));
        exts
    });

    Ok(RuleSet {
        name: "secrets".to_string(),
        kind: FindingKind::Secret,
        mode: ScanMode::LineOriented,
        rules,
        extensions,
        include_env_files: config.include_env_files.unwrap_or(true),
        default_severity: config.default_severity.unwrap_or(Severity::High),
        safe_markers: config
            .safe_markers
            .clone()
            .unwrap_or_else(|| to_strings(DEFAULT_SAFE_MARKERS)),
    })
}

/// Compile the anti-pattern rule set, applying overrides from `config`.
pub fn anti_pattern_rule_set(config: &RuleSetConfig) -> Result<RuleSet> {
    let rules = match &config.rules {
        Some(rules) => compile_rules(rules)?,
        None => compile_rules(&default_anti_pattern_rules())?,
    };

    Ok(RuleSet {
        name: "anti_patterns".to_string(),
        kind: FindingKind::AntiPattern,
        mode: ScanMode::WholeFile,
        rules,
        extensions: config
            .extensions
            .clone()
            .unwrap_or_else(|| to_strings(SOURCE_EXTENSIONS)),
        include_env_files: config.include_env_files.unwrap_or(false),
        default_severity: config.default_severity.unwrap_or(Severity::Medium),
        safe_markers: config.safe_markers.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_sets_compile() {
        let secrets = secret_rule_set(&RuleSetConfig::default()).unwrap();
        assert_eq!(secrets.mode, ScanMode::LineOriented);
        assert_eq!(secrets.rules.len(), default_secret_rules().len());
        assert!(secrets.extensions.contains(&"env".to_string()));
        assert!(secrets.include_env_files);

        let patterns = anti_pattern_rule_set(&RuleSetConfig::default()).unwrap();
        assert_eq!(patterns.mode, ScanMode::WholeFile);
        assert!(!patterns.extensions.contains(&"json".to_string()));
        assert!(patterns.safe_markers.is_empty());
    }

    #[test]
    fn configured_rules_replace_defaults() {
        let config = RuleSetConfig {
            rules: Some(vec![rule("Slack Token", r"xox[bp]-[0-9A-Za-z-]+", None)]),
            default_severity: Some(Severity::Critical),
            ..RuleSetConfig::default()
        };
        let set = secret_rule_set(&config).unwrap();
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].name, "Slack Token");
        assert_eq!(set.severity_of(&set.rules[0]), Severity::Critical);
    }

    #[test]
    fn invalid_configured_rule_is_an_error() {
        let config = RuleSetConfig {
            rules: Some(vec![rule("Broken", "[a-", None)]),
            ..RuleSetConfig::default()
        };
        assert!(anti_pattern_rule_set(&config).is_err());
    }

    #[test]
    fn password_rule_matches_quoted_assignment() {
        let set = secret_rule_set(&RuleSetConfig::default()).unwrap();
        let password = set.rules.iter().find(|r| r.name == "Password").unwrap();
        assert!(password.pattern.is_match(r#"const password = "abc123";"#));
        assert!(!password.pattern.is_match("const password = getPassword();"));
    }

    #[test]
    fn default_anti_pattern_names() {
        let names: Vec<String> = default_anti_pattern_rules()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "Eval Usage",
                "Function Constructor",
                "Dangerous innerHTML",
                "Document Write",
                "Hardcoded HTTP URL",
                "Console Log",
            ]
        );
    }
}
