//! Per-file diff artifacts.
//!
//! For each change record, file content is read at a "before" ref and an
//! "after" ref; absence at a ref is expected and encodes addition or
//! deletion. The rendered artifact is the text handed to the message
//! synthesizer.

use std::path::Path;

use crate::error::Result;
use crate::output;

use super::{show_file, ChangeRecord};

pub const ORIGINAL_MARKER: &str = "===== ORIGINAL CONTENT =====";
pub const NEW_MARKER: &str = "===== NEW CONTENT =====";
pub const NEW_FILE_MARKER: &str = "===== NEW FILE =====";
pub const DELETED_MARKER: &str = "===== FILE DELETED =====";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    New,
    Deleted,
    Modified,
}

impl DiffKind {
    pub fn label(&self) -> &'static str {
        match self {
            DiffKind::New => "new",
            DiffKind::Deleted => "deleted",
            DiffKind::Modified => "modified",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffArtifact {
    pub path: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl DiffArtifact {
    /// The artifact kind, derived from which sides exist.
    pub fn kind(&self) -> DiffKind {
        match (&self.before, &self.after) {
            (Some(_), Some(_)) => DiffKind::Modified,
            (Some(_), None) => DiffKind::Deleted,
            (None, _) => DiffKind::New,
        }
    }

    /// Render the concatenated text form: both sections in fixed order
    /// (original before new) for modifications, a synthetic marker for
    /// additions and deletions.
    pub fn render(&self) -> String {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => format!(
                "{}\n\n{}\n\n{}\n\n{}",
                ORIGINAL_MARKER, before, NEW_MARKER, after
            ),
            (Some(before), None) => {
                format!("{}\n\n{}\n\n{}", ORIGINAL_MARKER, before, DELETED_MARKER)
            }
            (None, Some(after)) => format!("{}\n\n{}", NEW_FILE_MARKER, after),
            (None, None) => String::new(),
        }
    }
}

/// Build diff artifacts for all included records between two refs.
///
/// A file absent at both refs is skipped with a warning; one bad file never
/// aborts the batch.
pub fn extract(
    repo: &Path,
    records: &[ChangeRecord],
    before_ref: &str,
    after_ref: &str,
) -> Result<Vec<DiffArtifact>> {
    let mut artifacts = Vec::new();
    for record in records.iter().filter(|r| r.is_included()) {
        let before = show_file(repo, before_ref, &record.path)?;
        let after = show_file(repo, after_ref, &record.path)?;
        if before.is_none() && after.is_none() {
            output::print_warning(&format!(
                "Skipping '{}': not present at '{}' or '{}'",
                record.path, before_ref, after_ref
            ));
            continue;
        }
        artifacts.push(DiffArtifact {
            path: record.path.clone(),
            before,
            after,
        });
    }
    Ok(artifacts)
}
