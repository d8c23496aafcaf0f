//! Isolation branch management.
//!
//! Captures the working tree onto a dedicated branch so it can be diffed
//! against the original state: stage, stash, branch, re-apply, commit,
//! return. Each forward step records a compensating action; on failure the
//! recorded actions run in reverse order, so the repository lands back on the
//! original branch with the original tree.

use std::path::Path;

use crate::error::Result;
use crate::output;

use super::{
    branch_exists, current_branch, fail, git, local_branch_exists, rev_parse,
};

const STASH_MESSAGE: &str = "shipmate: working tree snapshot";

/// Compensating actions, recorded as forward steps succeed.
enum Undo {
    /// Restore the working tree from the stash entry pushed by `isolate`.
    PopStash,
    /// Discard the re-applied tree on the new branch; the stash still holds
    /// the changes at this point.
    DiscardWorkingTree,
    ReturnTo(String),
    DeleteBranch(String),
}

/// Derive a branch name for `ticket` that is unused at this moment.
///
/// Collision policy: `T`, then `T-2`, `T-3`, … (plain increment; an existing
/// suffixed name is never re-derived). Both local and origin branches count
/// as collisions.
pub fn unique_branch_name(repo: &Path, ticket: &str) -> Result<String> {
    if !branch_exists(repo, ticket)? {
        return Ok(ticket.to_string());
    }
    for n in 2u32.. {
        let candidate = format!("{}-{}", ticket, n);
        if !branch_exists(repo, &candidate)? {
            return Ok(candidate);
        }
    }
    unreachable!("collision counter exhausted");
}

/// Snapshot all working-tree changes into a new branch derived from `ticket`
/// and return its name, leaving the original branch checked out with a clean
/// tree. The snapshot commit carries a placeholder message, amended later
/// once the synthesized message exists.
pub fn isolate(repo: &Path, ticket: &str) -> Result<String> {
    let original = current_branch(repo)?;
    let mut undo: Vec<Undo> = Vec::new();
    let mut committed_branch: Option<String> = None;

    match run_isolation(repo, ticket, &original, &mut undo, &mut committed_branch) {
        Ok(branch) => Ok(branch),
        Err(e) => {
            output::print_step("Rollback", "Undoing isolation steps");
            if let Some(branch) = committed_branch {
                // The snapshot commit exists; the saga stack no longer
                // describes the repository state.
                rollback(repo, &branch, &original);
            } else {
                unwind(repo, undo);
            }
            Err(e)
        }
    }
}

fn run_isolation(
    repo: &Path,
    ticket: &str,
    original: &str,
    undo: &mut Vec<Undo>,
    committed_branch: &mut Option<String>,
) -> Result<String> {
    // Staged
    let out = git(repo, &["add", "-A"])?;
    if !out.success() {
        return Err(fail("failed to stage changes", &out));
    }

    // Stashed
    let out = git(repo, &["stash", "push", "-m", STASH_MESSAGE])?;
    if !out.success() {
        return Err(fail("failed to stash changes", &out));
    }
    undo.push(Undo::PopStash);

    // NewBranchActive
    let branch = unique_branch_name(repo, ticket)?;
    let out = git(repo, &["checkout", "-b", &branch])?;
    if !out.success() {
        return Err(fail(&format!("failed to create branch '{}'", branch), &out));
    }
    undo.push(Undo::DeleteBranch(branch.clone()));
    undo.push(Undo::ReturnTo(original.to_string()));

    // ChangesReapplied
    let out = git(repo, &["stash", "apply"])?;
    if !out.success() {
        return Err(fail("failed to re-apply stashed changes", &out));
    }
    undo.push(Undo::DiscardWorkingTree);

    // Committed
    let out = git(repo, &["add", "-A"])?;
    if !out.success() {
        return Err(fail("failed to stage re-applied changes", &out));
    }
    let placeholder = format!("Initial commit for {}", branch);
    let out = git(repo, &["commit", "-m", &placeholder])?;
    if !out.success() {
        return Err(fail("failed to commit changes", &out));
    }
    *committed_branch = Some(branch.clone());

    // OriginalRestored
    let out = git(repo, &["checkout", original])?;
    if !out.success() {
        return Err(fail(
            &format!("failed to return to branch '{}'", original),
            &out,
        ));
    }
    let out = git(repo, &["stash", "drop"])?;
    if !out.success() {
        // The snapshot is safely committed; a stale stash entry is not worth
        // failing the pipeline over.
        output::print_warning(&format!("Failed to drop stash entry: {}", out.error_text()));
    }

    Ok(branch)
}

fn unwind(repo: &Path, undo: Vec<Undo>) {
    for action in undo.into_iter().rev() {
        let result = match action {
            Undo::PopStash => git(repo, &["stash", "pop"]),
            Undo::DiscardWorkingTree => git(repo, &["reset", "--hard", "HEAD"]),
            Undo::ReturnTo(branch) => git(repo, &["checkout", &branch]),
            Undo::DeleteBranch(branch) => git(repo, &["branch", "-D", &branch]),
        };
        match result {
            Ok(out) if out.success() => {}
            Ok(out) => output::print_error(&format!("Rollback step failed: {}", out.error_text())),
            Err(e) => output::print_error(&format!("Rollback step failed: {}", e)),
        }
    }
}

/// Undo a completed isolation: carry the snapshot commit back onto the
/// original branch (or restore the tree from the stash when no commit was
/// made), then delete the isolation branch.
///
/// Best-effort by design: failures are reported but never propagate, and
/// calling this after the branch is already gone is a no-op.
pub fn rollback(repo: &Path, branch: &str, original: &str) {
    let exists = match local_branch_exists(repo, branch) {
        Ok(exists) => exists,
        Err(e) => {
            output::print_error(&format!("Rollback aborted: {}", e));
            return;
        }
    };
    if !exists {
        output::print_warning(&format!(
            "Branch {} does not exist. No rollback needed.",
            branch
        ));
        return;
    }

    let has_commit = match (rev_parse(repo, branch), rev_parse(repo, original)) {
        (Ok(branch_tip), Ok(original_tip)) => branch_tip != original_tip,
        _ => false,
    };

    if !restore_branch(repo, original) {
        return;
    }

    if has_commit {
        output::print_info("Commit found on isolation branch. Cherry-picking onto the original branch.");
        match git(repo, &["cherry-pick", branch]) {
            Ok(out) if out.success() => {
                output::print_success("Successfully cherry-picked commit onto the original branch.")
            }
            Ok(out) => {
                output::print_error(&format!("Failed to cherry-pick commit: {}", out.error_text()));
                output::print_warning("You may need to merge the changes manually.");
            }
            Err(e) => output::print_error(&format!("Failed to cherry-pick commit: {}", e)),
        }
    } else {
        output::print_info("No commit on isolation branch. Restoring changes from stash.");
        match git(repo, &["stash", "pop"]) {
            Ok(out) if out.success() => {
                output::print_success("Successfully restored changes to the original branch.")
            }
            Ok(out) => {
                output::print_error(&format!("Failed to restore stash: {}", out.error_text()));
                output::print_warning("You may need to resolve conflicts manually.");
            }
            Err(e) => output::print_error(&format!("Failed to restore stash: {}", e)),
        }
    }

    match git(repo, &["branch", "-D", branch]) {
        Ok(out) if out.success() => {
            output::print_success(&format!("Deleted branch {}.", branch));
        }
        Ok(out) => output::print_error(&format!(
            "Failed to delete branch {}: {}",
            branch,
            out.error_text()
        )),
        Err(e) => output::print_error(&format!("Failed to delete branch {}: {}", branch, e)),
    }
}

fn restore_branch(repo: &Path, original: &str) -> bool {
    match git(repo, &["checkout", original]) {
        Ok(out) if out.success() => true,
        Ok(out) => {
            output::print_error(&format!(
                "Failed to switch to branch {}: {}",
                original,
                out.error_text()
            ));
            false
        }
        Err(e) => {
            output::print_error(&format!("Failed to switch to branch {}: {}", original, e));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{init_repo, run_git};
    use super::super::{current_branch, local_branch_exists, rev_parse, show_file};
    use super::*;
    use std::fs;

    #[test]
    fn unique_name_without_collision() {
        let dir = init_repo();
        assert_eq!(unique_branch_name(dir.path(), "PROJ-42").unwrap(), "PROJ-42");
    }

    #[test]
    fn unique_name_increments_past_collisions() {
        let dir = init_repo();
        let repo = dir.path();
        run_git(repo, &["branch", "PROJ-42"]);
        assert_eq!(unique_branch_name(repo, "PROJ-42").unwrap(), "PROJ-42-2");
        run_git(repo, &["branch", "PROJ-42-2"]);
        assert_eq!(unique_branch_name(repo, "PROJ-42").unwrap(), "PROJ-42-3");
    }

    #[test]
    fn isolate_snapshots_changes_and_restores_original() {
        let dir = init_repo();
        let repo = dir.path();

        fs::write(repo.join("README.md"), "# demo\nedited\n").unwrap();
        fs::write(repo.join("new_file.txt"), "fresh\n").unwrap();

        let branch = isolate(repo, "PROJ-7").unwrap();
        assert_eq!(branch, "PROJ-7");

        // back on the original branch with a clean tree
        assert_eq!(current_branch(repo).unwrap(), "main");
        let status = git(repo, &["status", "--porcelain"]).unwrap();
        assert_eq!(status.stdout_trimmed(), "");

        // the snapshot branch holds both changes
        assert_eq!(
            show_file(repo, &branch, "README.md").unwrap().as_deref(),
            Some("# demo\nedited\n")
        );
        assert_eq!(
            show_file(repo, &branch, "new_file.txt").unwrap().as_deref(),
            Some("fresh\n")
        );
    }

    #[test]
    fn isolate_picks_free_name_when_ticket_branch_exists() {
        let dir = init_repo();
        let repo = dir.path();
        run_git(repo, &["branch", "PROJ-9"]);

        fs::write(repo.join("change.txt"), "data\n").unwrap();
        let branch = isolate(repo, "PROJ-9").unwrap();
        assert_eq!(branch, "PROJ-9-2");
    }

    #[test]
    fn rollback_cherry_picks_snapshot_commit() {
        let dir = init_repo();
        let repo = dir.path();

        fs::write(repo.join("README.md"), "# demo\nrolled\n").unwrap();
        let branch = isolate(repo, "PROJ-11").unwrap();

        rollback(repo, &branch, "main");

        assert_eq!(current_branch(repo).unwrap(), "main");
        assert!(!local_branch_exists(repo, &branch).unwrap());
        // the snapshot commit now lives on main
        assert_eq!(
            show_file(repo, "HEAD", "README.md").unwrap().as_deref(),
            Some("# demo\nrolled\n")
        );
    }

    #[test]
    fn rollback_is_idempotent_when_branch_missing() {
        let dir = init_repo();
        let repo = dir.path();
        let tip_before = rev_parse(repo, "HEAD").unwrap();

        rollback(repo, "never-created", "main");

        assert_eq!(current_branch(repo).unwrap(), "main");
        assert_eq!(rev_parse(repo, "HEAD").unwrap(), tip_before);
    }
}
