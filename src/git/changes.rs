//! Working-tree change detection.
//!
//! Combines three sources (staged diff, unstaged diff, untracked listing)
//! into one normalized list of change records, deduplicated by path with
//! precedence staged > unstaged > untracked. Files matching the ignore rules
//! or detected as binary are recorded with their exclusion reason and skipped
//! by everything downstream.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

use super::{fail, git};

/// How many leading bytes the binary probe reads.
const PROBE_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Untracked,
}

impl ChangeKind {
    /// Map a `--name-status` status column to a change kind. Copies and other
    /// exotic statuses read as modifications.
    pub fn from_status(status: &str) -> ChangeKind {
        match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('D') => ChangeKind::Deleted,
            Some('R') => ChangeKind::Renamed,
            Some('?') => ChangeKind::Untracked,
            _ => ChangeKind::Modified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Untracked => "untracked",
        }
    }

    pub fn from_label(label: &str) -> Option<ChangeKind> {
        match label {
            "added" => Some(ChangeKind::Added),
            "modified" => Some(ChangeKind::Modified),
            "deleted" => Some(ChangeKind::Deleted),
            "renamed" => Some(ChangeKind::Renamed),
            "untracked" => Some(ChangeKind::Untracked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    Ignored,
    Binary,
}

#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub path: String,
    pub kind: ChangeKind,
    pub excluded: Option<ExcludeReason>,
}

impl ChangeRecord {
    pub fn new(path: String, kind: ChangeKind) -> Self {
        Self {
            path,
            kind,
            excluded: None,
        }
    }

    /// Whether the record participates in diffing and summarization.
    pub fn is_included(&self) -> bool {
        self.excluded.is_none()
    }
}

/// Detect all working-tree changes in the repository.
///
/// An empty result means a clean tree; that is not an error.
pub fn detect_changes(repo: &Path) -> Result<Vec<ChangeRecord>> {
    let staged = git(repo, &["diff", "--cached", "--name-status"])?;
    if !staged.success() {
        return Err(fail("failed to read staged changes", &staged));
    }
    let unstaged = git(repo, &["diff", "--name-status"])?;
    if !unstaged.success() {
        return Err(fail("failed to read unstaged changes", &unstaged));
    }
    let untracked = git(repo, &["ls-files", "--others", "--exclude-standard"])?;
    if !untracked.success() {
        return Err(fail("failed to list untracked files", &untracked));
    }

    let mut records: Vec<ChangeRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (path, kind) in parse_name_status(&staged.stdout) {
        if seen.insert(path.clone()) {
            records.push(ChangeRecord::new(path, kind));
        }
    }
    for (path, kind) in parse_name_status(&unstaged.stdout) {
        if seen.insert(path.clone()) {
            records.push(ChangeRecord::new(path, kind));
        }
    }
    for line in untracked.stdout.lines() {
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        if seen.insert(path.to_string()) {
            records.push(ChangeRecord::new(path.to_string(), ChangeKind::Untracked));
        }
    }

    let rules = IgnoreRules::load(repo);
    for record in &mut records {
        if rules.is_ignored(&record.path) {
            record.excluded = Some(ExcludeReason::Ignored);
        } else if record.kind != ChangeKind::Deleted && is_binary(&repo.join(&record.path)) {
            record.excluded = Some(ExcludeReason::Binary);
        }
    }

    Ok(records)
}

/// Parse `--name-status` output into `(path, kind)` pairs.
///
/// Renames carry two path fields; the post-rename path is the one that exists
/// at the new ref, so that is the one kept.
pub(crate) fn parse_name_status(output: &str) -> Vec<(String, ChangeKind)> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let mut fields = line.split('\t');
        let Some(status) = fields.next() else {
            continue;
        };
        let status = status.trim();
        if status.is_empty() {
            continue;
        }
        if let Some(path) = fields.last() {
            if !path.is_empty() {
                entries.push((path.to_string(), ChangeKind::from_status(status)));
            }
        }
    }
    entries
}

/// Ignore rules loaded from the repository's `.gitignore`.
///
/// Three pattern forms are honored: plain globs matched against the relative
/// path, directory patterns ending in `/` matching everything beneath, and
/// bare basename patterns matched against the file name. `.git/` is always
/// excluded.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    pub fn load(repo: &Path) -> Self {
        let mut patterns = vec![".git/".to_string()];
        if let Ok(raw) = std::fs::read_to_string(repo.join(".gitignore")) {
            for line in raw.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                patterns.push(line.to_string());
            }
        }
        Self { patterns }
    }

    pub fn from_patterns(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        for pattern in &self.patterns {
            if let Some(dir) = pattern.strip_suffix('/') {
                if path == dir || path.starts_with(&format!("{}/", dir)) {
                    return true;
                }
                if matches_glob(&format!("{}*", pattern), path) {
                    return true;
                }
            } else if matches_glob(pattern, path) {
                return true;
            } else if !pattern.contains('/') {
                let basename = Path::new(path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(path);
                if matches_glob(pattern, basename) {
                    return true;
                }
            }
        }
        false
    }
}

fn matches_glob(pattern: &str, text: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(text))
        .unwrap_or(false)
}

/// Content probe: a file is binary when a UTF-8 decode of its first chunk
/// fails. A char split at the probe boundary is not evidence of binary data,
/// and an unreadable file is treated as text (deleted files have nothing to
/// probe).
pub fn is_binary(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut buf = [0u8; PROBE_BYTES];
    let Ok(n) = file.read(&mut buf) else {
        return false;
    };
    match std::str::from_utf8(&buf[..n]) {
        Ok(_) => false,
        Err(e) => e.error_len().is_some(),
    }
}
