//! Skip-list matching for the directory walk.

use regex::Regex;

use crate::domain::{AutopilotError, Result};

#[derive(Debug, Clone)]
enum SkipEntry {
    Exact(String),
    Glob(Regex),
}

/// Compiled skip list.
///
/// An entry without `*` matches an entry name or relative path exactly. An
/// entry with `*` is a glob where `*` stands for any run of characters
/// (including none); everything else is literal.
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    entries: Vec<SkipEntry>,
}

impl SkipList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let entries = patterns
            .iter()
            .map(|p| compile_entry(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Whether the entry with file `name` at `rel_path` is excluded.
    pub fn is_skipped(&self, name: &str, rel_path: &str) -> bool {
        self.entries.iter().any(|entry| match entry {
            SkipEntry::Exact(exact) => exact == name || exact == rel_path,
            SkipEntry::Glob(re) => re.is_match(name) || re.is_match(rel_path),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compile_entry(pattern: &str) -> Result<SkipEntry> {
    if !pattern.contains('*') {
        return Ok(SkipEntry::Exact(pattern.to_string()));
    }
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map(SkipEntry::Glob)
        .map_err(|e| AutopilotError::InvalidConfig(format!("bad skip pattern {pattern}: {e}")))
}
