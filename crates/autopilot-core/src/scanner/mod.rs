//! Pattern scanner.
//!
//! Walks a project tree and matches file contents against a [`RuleSet`].
//! The scanner never writes to disk and never fails on an unreadable entry:
//! such entries are skipped and the walk carries on, so partial results are
//! normal.
//!
//! The walk uses an explicit worklist of directories rather than recursion,
//! which bounds stack depth on deep trees. Findings are sorted by file path,
//! then line, so repeated scans of an unchanged tree are identical.

pub mod rules;
pub mod skip;

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{Finding, FindingKind, Result, Rule, Severity};

pub use rules::{anti_pattern_rule_set, secret_rule_set};
pub use skip::SkipList;

/// Excerpts longer than this are truncated.
const MAX_EXCERPT_CHARS: usize = 120;

/// Env files with this exact name are never scanned.
const ENV_EXAMPLE_FILE: &str = ".env.example";

/// How a rule set is applied to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Every non-comment line is tested against every rule; one finding per
    /// matching (line, rule) pair.
    LineOriented,
    /// A rule matches if it occurs anywhere in the file; at most one finding
    /// per (file, rule) pair, reported at the first occurrence.
    WholeFile,
}

/// A compiled, ordered set of rules plus the files it applies to.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub name: String,
    pub kind: FindingKind,
    pub mode: ScanMode,
    pub rules: Vec<Rule>,
    /// Lower-case file extensions (without dot) this set inspects.
    pub extensions: Vec<String>,
    /// Also inspect `.env` and `.env.*` files.
    pub include_env_files: bool,
    /// Severity for rules that do not carry their own.
    pub default_severity: Severity,
    /// Lines containing any of these substrings are ignored.
    pub safe_markers: Vec<String>,
}

impl RuleSet {
    pub fn severity_of(&self, rule: &Rule) -> Severity {
        rule.severity.unwrap_or(self.default_severity)
    }

    /// Whether a file named `name` is in scope for this set.
    pub fn applies_to(&self, name: &str) -> bool {
        if name == ENV_EXAMPLE_FILE {
            return false;
        }
        if self.include_env_files && (name == ".env" || name.starts_with(".env.")) {
            return true;
        }
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

/// Counters from one scan, used for progress logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files that passed the skip list.
    pub files_visited: usize,
    /// Files in scope for the rule set and read successfully.
    pub files_scanned: usize,
    /// Directories or files that could not be read.
    pub unreadable: usize,
}

/// Scans project trees with a fixed skip list.
#[derive(Debug, Clone, Default)]
pub struct PatternScanner {
    skip: SkipList,
}

impl PatternScanner {
    pub fn new(skip: SkipList) -> Self {
        Self { skip }
    }

    /// Build a scanner from raw skip patterns.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Ok(Self::new(SkipList::new(patterns)?))
    }

    /// Scan `root` with one rule set.
    pub fn scan(&self, root: &Path, rule_set: &RuleSet) -> Vec<Finding> {
        self.scan_with_stats(root, rule_set).0
    }

    /// Scan `root` with several rule sets, concatenating findings in set order.
    pub fn scan_all(&self, root: &Path, rule_sets: &[RuleSet]) -> Vec<Finding> {
        rule_sets
            .iter()
            .flat_map(|set| self.scan(root, set))
            .collect()
    }

    /// Scan `root` and also return walk statistics.
    pub fn scan_with_stats(&self, root: &Path, rule_set: &RuleSet) -> (Vec<Finding>, ScanStats) {
        let mut stats = ScanStats::default();
        let mut findings = Vec::new();

        for (rel_path, path) in self.collect_files(root, &mut stats) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if !rule_set.applies_to(&name) {
                continue;
            }

            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    debug!(file = %rel_path, error = %e, "Skipping unreadable file");
                    stats.unreadable += 1;
                    continue;
                }
            };
            stats.files_scanned += 1;

            match rule_set.mode {
                ScanMode::LineOriented => {
                    scan_lines(&rel_path, &content, rule_set, &mut findings)
                }
                ScanMode::WholeFile => scan_whole(&rel_path, &content, rule_set, &mut findings),
            }
        }

        // Stable sort keeps rule order within a line.
        findings.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        (findings, stats)
    }

    /// Breadth-first walk returning `(relative path, absolute path)` for
    /// every regular file not excluded by the skip list.
    fn collect_files(&self, root: &Path, stats: &mut ScanStats) -> Vec<(String, PathBuf)> {
        let mut files = Vec::new();
        let mut worklist = VecDeque::from([root.to_path_buf()]);

        while let Some(dir) = worklist.pop_front() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                    stats.unreadable += 1;
                    continue;
                }
            };

            let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                let rel_path = relative_path(root, &path);

                if self.skip.is_skipped(&name, &rel_path) {
                    continue;
                }

                // file_type() does not follow symlinks; links are never walked.
                let Ok(file_type) = entry.file_type() else {
                    stats.unreadable += 1;
                    continue;
                };
                if file_type.is_dir() {
                    worklist.push_back(path);
                } else if file_type.is_file() {
                    stats.files_visited += 1;
                    files.push((rel_path, path));
                }
            }
        }

        files
    }
}

/// Convenience wrapper: compile `skip` and scan `root` with every rule set.
pub fn scan<S: AsRef<str>>(root: &Path, rule_sets: &[RuleSet], skip: &[S]) -> Result<Vec<Finding>> {
    Ok(PatternScanner::from_patterns(skip)?.scan_all(root, rule_sets))
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with('#')
}

fn excerpt(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= MAX_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(MAX_EXCERPT_CHARS).collect();
        cut.push('…');
        cut
    }
}

fn scan_lines(file: &str, content: &str, rule_set: &RuleSet, out: &mut Vec<Finding>) {
    for (idx, line) in content.lines().enumerate() {
        if is_comment(line) {
            continue;
        }
        if rule_set.safe_markers.iter().any(|m| line.contains(m.as_str())) {
            continue;
        }
        for rule in &rule_set.rules {
            if rule.pattern.is_match(line) {
                out.push(Finding {
                    file: file.to_string(),
                    rule_name: rule.name.clone(),
                    line: idx + 1,
                    excerpt: excerpt(line),
                    severity: rule_set.severity_of(rule),
                    kind: rule_set.kind,
                });
            }
        }
    }
}

fn scan_whole(file: &str, content: &str, rule_set: &RuleSet, out: &mut Vec<Finding>) {
    for rule in &rule_set.rules {
        if let Some(m) = rule.pattern.find(content) {
            let line_start = content[..m.start()].rfind('\n').map_or(0, |i| i + 1);
            let line_end = content[m.start()..]
                .find('\n')
                .map_or(content.len(), |i| m.start() + i);
            out.push(Finding {
                file: file.to_string(),
                rule_name: rule.name.clone(),
                line: content[..m.start()].matches('\n').count() + 1,
                excerpt: excerpt(&content[line_start..line_end]),
                severity: rule_set.severity_of(rule),
                kind: rule_set.kind,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSetConfig;

    fn secrets() -> RuleSet {
        secret_rule_set(&RuleSetConfig::default()).unwrap()
    }

    fn patterns() -> RuleSet {
        anti_pattern_rule_set(&RuleSetConfig::default()).unwrap()
    }

    #[test]
    fn applies_to_respects_extensions_and_env_files() {
        let set = secrets();
        assert!(set.applies_to("config.js"));
        assert!(set.applies_to("settings.JSON"));
        assert!(set.applies_to(".env"));
        assert!(set.applies_to(".env.local"));
        assert!(!set.applies_to(".env.example"));
        assert!(!set.applies_to("logo.png"));
        assert!(!set.applies_to("Makefile"));

        let anti = patterns();
        assert!(anti.applies_to("app.tsx"));
        assert!(!anti.applies_to(".env"));
        assert!(!anti.applies_to("package.json"));
    }

    #[test]
    fn comment_lines_are_recognised() {
        assert!(is_comment("   // const password = \"x\""));
        assert!(is_comment("# password: hunter22"));
        assert!(!is_comment("const a = 1; // trailing"));
    }

    #[test]
    fn line_scan_yields_one_finding_per_rule() {
        let mut out = Vec::new();
        let line = r#"const creds = { password: "hunter22", secret: "abcdefghij" };"#;
        scan_lines("a.js", line, &secrets(), &mut out);
        let names: Vec<_> = out.iter().map(|f| f.rule_name.as_str()).collect();
        assert_eq!(names, vec!["Password", "Generic Secret"]);
        assert!(out.iter().all(|f| f.line == 1));
    }

    #[test]
    fn whole_file_scan_reports_first_occurrence_once() {
        let mut out = Vec::new();
        let content = "let a = 1;\nconsole.log(a);\nconsole.log(a);\n";
        scan_whole("a.js", content, &patterns(), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_name, "Console Log");
        assert_eq!(out[0].line, 2);
        assert_eq!(out[0].excerpt, "console.log(a);");
        assert_eq!(out[0].kind, FindingKind::AntiPattern);
    }

    #[test]
    fn excerpt_is_truncated_on_char_boundary() {
        let long = "é".repeat(200);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), MAX_EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, Path::new("/repo/src/lib/config.js")),
            "src/lib/config.js"
        );
    }
}
