//! Changed-files manifest.
//!
//! A tabular artifact (columns: file path, status) written to the repository
//! root for the duration of one pipeline run and deleted at the end. The
//! synthesis stage reads the manifest back rather than reusing in-memory
//! state, so a missing or malformed manifest is a fatal pipeline error.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ShipmateError};
use crate::git::{ChangeKind, ChangeRecord};

pub const MANIFEST_FILE: &str = "shipmate-manifest.csv";
const HEADER: &str = "File Path,Status";

pub fn manifest_path(repo_root: &Path) -> PathBuf {
    repo_root.join(MANIFEST_FILE)
}

/// Write the manifest listing all included change records, repository-relative.
pub fn write_manifest(repo_root: &Path, records: &[ChangeRecord]) -> Result<PathBuf> {
    let mut lines = vec![HEADER.to_string()];
    for record in records.iter().filter(|r| r.is_included()) {
        lines.push(format!(
            "{},{}",
            escape(&record.path),
            escape(record.kind.label())
        ));
    }
    let path = manifest_path(repo_root);
    fs::write(&path, lines.join("\n") + "\n")?;
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub status: Option<String>,
}

pub fn read_manifest(repo_root: &Path) -> Result<Vec<ManifestEntry>> {
    let path = manifest_path(repo_root);
    if !path.exists() {
        return Err(ShipmateError::ManifestNotFound(path));
    }
    let raw = fs::read_to_string(&path)?;
    parse_manifest(&raw)
}

pub(crate) fn parse_manifest(raw: &str) -> Result<Vec<ManifestEntry>> {
    let mut lines = raw.lines();
    match lines.next() {
        Some(header) if header.trim() == HEADER => {}
        Some(other) => {
            return Err(ShipmateError::ManifestMalformed(format!(
                "unexpected header: {}",
                other
            )))
        }
        None => return Err(ShipmateError::ManifestMalformed("empty file".to_string())),
    }

    let mut entries = Vec::new();
    for (index, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_row(line)
            .map_err(|e| ShipmateError::ManifestMalformed(format!("line {}: {}", index + 2, e)))?;
        let mut fields = fields.into_iter();
        let path = match fields.next() {
            Some(path) if !path.is_empty() => path,
            _ => {
                return Err(ShipmateError::ManifestMalformed(format!(
                    "line {}: missing file path",
                    index + 2
                )))
            }
        };
        let status = fields.next().filter(|s| !s.is_empty());
        entries.push(ManifestEntry { path, status });
    }
    Ok(entries)
}

/// Delete the manifest if present. Returns whether a file was removed.
pub fn remove_manifest(repo_root: &Path) -> Result<bool> {
    let path = manifest_path(repo_root);
    if path.exists() {
        fs::remove_file(&path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Map manifest entries back to change records for diff extraction. A row
/// without a status column reads as a modification.
pub fn entries_to_records(entries: &[ManifestEntry]) -> Vec<ChangeRecord> {
    entries
        .iter()
        .map(|entry| {
            let kind = entry
                .status
                .as_deref()
                .and_then(ChangeKind::from_label)
                .unwrap_or(ChangeKind::Modified);
            ChangeRecord::new(entry.path.clone(), kind)
        })
        .collect()
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_row(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' if field.is_empty() => in_quotes = true,
                ',' => fields.push(std::mem::take(&mut field)),
                _ => field.push(c),
            }
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}
