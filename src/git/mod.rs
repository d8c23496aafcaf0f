//! Git operations.
//!
//! Everything goes through the external `git` binary via [`crate::cmd`]; no
//! library bindings. Functions take the repository path explicitly so the
//! pipeline and tests can operate on any checkout without touching the
//! process working directory.

pub mod changes;
pub mod diff;
pub mod isolate;

pub use changes::{detect_changes, ChangeKind, ChangeRecord, ExcludeReason, IgnoreRules};
pub use diff::{extract, DiffArtifact, DiffKind};
pub use isolate::{isolate, rollback, unique_branch_name};

use std::path::{Path, PathBuf};

use crate::cmd::{self, CmdOutput};
use crate::error::{Result, ShipmateError};

pub(crate) fn git(repo: &Path, args: &[&str]) -> Result<CmdOutput> {
    cmd::run_in(repo, "git", args)
}

pub(crate) fn fail(context: &str, out: &CmdOutput) -> ShipmateError {
    ShipmateError::Git(format!("{}: {}", context, out.error_text()))
}

/// Check if the current directory is inside a git repository.
pub fn is_git_repo() -> bool {
    cmd::run("git", &["rev-parse", "--git-dir"])
        .map(|o| o.success())
        .unwrap_or(false)
}

/// Root of the repository containing the current directory.
pub fn repo_root() -> Result<PathBuf> {
    let out = cmd::run("git", &["rev-parse", "--show-toplevel"])?;
    if !out.success() {
        return Err(ShipmateError::NotAGitRepo);
    }
    Ok(PathBuf::from(out.stdout_trimmed()))
}

/// Get the current branch name.
pub fn current_branch(repo: &Path) -> Result<String> {
    let out = git(repo, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if !out.success() {
        return Err(fail("failed to determine current branch", &out));
    }
    Ok(out.stdout_trimmed().to_string())
}

/// Check if a branch exists, locally or on origin.
pub fn branch_exists(repo: &Path, branch: &str) -> Result<bool> {
    if local_branch_exists(repo, branch)? {
        return Ok(true);
    }
    let remote = git(
        repo,
        &[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{}", branch),
        ],
    )?;
    Ok(remote.success())
}

pub fn local_branch_exists(repo: &Path, branch: &str) -> Result<bool> {
    let out = git(
        repo,
        &[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{}", branch),
        ],
    )?;
    Ok(out.success())
}

pub fn checkout(repo: &Path, branch: &str) -> Result<()> {
    let out = git(repo, &["checkout", branch])?;
    if !out.success() {
        return Err(fail(
            &format!("failed to checkout branch '{}'", branch),
            &out,
        ));
    }
    Ok(())
}

pub fn delete_branch(repo: &Path, branch: &str) -> Result<()> {
    let out = git(repo, &["branch", "-D", branch])?;
    if !out.success() {
        return Err(fail(&format!("failed to delete branch '{}'", branch), &out));
    }
    Ok(())
}

/// Resolve a ref to its commit hash.
pub fn rev_parse(repo: &Path, refname: &str) -> Result<String> {
    let out = git(repo, &["rev-parse", refname])?;
    if !out.success() {
        return Err(fail(&format!("failed to resolve '{}'", refname), &out));
    }
    Ok(out.stdout_trimmed().to_string())
}

/// Merge base between two refs.
pub fn merge_base(repo: &Path, a: &str, b: &str) -> Result<String> {
    let out = git(repo, &["merge-base", a, b])?;
    if !out.success() {
        return Err(fail(
            &format!("failed to find merge base of '{}' and '{}'", a, b),
            &out,
        ));
    }
    Ok(out.stdout_trimmed().to_string())
}

/// File content at a point in time (`<ref>:<path>`).
///
/// Absence at the ref is an expected outcome, not an error: it encodes
/// file addition or deletion for the diff extractor.
pub fn show_file(repo: &Path, refname: &str, path: &str) -> Result<Option<String>> {
    let out = git(repo, &["show", &format!("{}:{}", refname, path)])?;
    if out.success() {
        Ok(Some(out.stdout))
    } else {
        Ok(None)
    }
}

/// Rewrite the message of the latest commit on the current branch.
pub fn amend_commit(repo: &Path, message: &str) -> Result<()> {
    let out = git(repo, &["commit", "--amend", "-m", message])?;
    if !out.success() {
        return Err(fail("failed to amend commit message", &out));
    }
    Ok(())
}

/// Default branch of the origin remote.
///
/// Reads the `origin/HEAD` symbolic ref; when that is unset (common in fresh
/// clones and local-only repositories) probes `main`, `master`, `dev`.
pub fn default_branch(repo: &Path) -> Result<String> {
    let out = git(repo, &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])?;
    if out.success() {
        if let Some(name) = out.stdout_trimmed().strip_prefix("origin/") {
            if !name.is_empty() {
                return Ok(name.to_string());
            }
        }
    }
    for candidate in ["main", "master", "dev"] {
        let probe = git(repo, &["rev-parse", "--verify", "--quiet", candidate])?;
        if probe.success() {
            return Ok(candidate.to_string());
        }
    }
    Err(ShipmateError::Git(
        "could not determine the default branch".to_string(),
    ))
}

/// Parent branch of `branch`: the configured upstream merge ref if present,
/// the remote default branch otherwise.
pub fn parent_branch(repo: &Path, branch: &str) -> Result<String> {
    let out = git(
        repo,
        &["config", "--get", &format!("branch.{}.merge", branch)],
    )?;
    if out.success() {
        let merge_ref = out.stdout_trimmed();
        if let Some(name) = merge_ref.strip_prefix("refs/heads/") {
            if !name.is_empty() && name != branch {
                return Ok(name.to_string());
            }
        }
    }
    default_branch(repo)
}

/// URL of the origin remote.
pub fn remote_url(repo: &Path) -> Result<String> {
    let out = git(repo, &["config", "--get", "remote.origin.url"])?;
    if !out.success() {
        return Err(fail("failed to read remote.origin.url", &out));
    }
    Ok(out.stdout_trimmed().to_string())
}

/// Extract `(owner, repo)` from a remote URL.
///
/// GitHub https, ssh and scp-like forms are parsed strictly; any other
/// remote (another host, a local bare repository) falls back to the last
/// two path segments.
pub fn parse_remote(url: &str) -> Option<(String, String)> {
    let normalized = url.trim().trim_end_matches('/').trim_end_matches(".git");

    let github_path = normalized
        .strip_prefix("https://github.com/")
        .or_else(|| normalized.strip_prefix("http://github.com/"))
        .or_else(|| normalized.strip_prefix("ssh://git@github.com/"))
        .or_else(|| normalized.strip_prefix("git@github.com:"));

    if let Some(path) = github_path {
        let mut parts = path.split('/');
        let owner = parts.next()?.trim();
        let repo = parts.next()?.trim();
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        return Some((owner.to_string(), repo.to_string()));
    }
    if normalized.contains("github.com") {
        return None;
    }

    let tail = normalized
        .rsplit_once(':')
        .map(|(_, tail)| tail)
        .unwrap_or(normalized);
    let segments: Vec<&str> = tail.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    Some((
        segments[segments.len() - 2].to_string(),
        segments[segments.len() - 1].to_string(),
    ))
}

/// Check if a path is ignored. A failing check (including a broken `git`
/// invocation) reads as "not ignored"; exclusion is advisory.
pub fn check_ignored(repo: &Path, path: &str) -> bool {
    git(repo, &["check-ignore", "-q", path])
        .map(|o| o.success())
        .unwrap_or(false)
}

/// Result type for push operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    Success,
    AlreadyUpToDate,
    Error(String),
}

/// Push a branch to origin with upstream tracking.
///
/// A rejected non-fast-forward push (the isolation branch was re-created
/// since the last run) is retried once with `--force-with-lease`.
pub fn push_branch(repo: &Path, branch: &str) -> Result<PushResult> {
    let out = git(repo, &["push", "--set-upstream", "origin", branch])?;

    if out.success() {
        // git reports this on stderr
        if out.stderr.contains("Everything up-to-date") {
            return Ok(PushResult::AlreadyUpToDate);
        }
        return Ok(PushResult::Success);
    }

    let error_msg = out.error_text().to_string();
    if error_msg.contains("non-fast-forward")
        || error_msg.contains("rejected")
        || error_msg.contains("failed to push")
    {
        let force = git(
            repo,
            &[
                "push",
                "--force-with-lease",
                "--set-upstream",
                "origin",
                branch,
            ],
        )?;
        if force.success() {
            return Ok(PushResult::Success);
        }
        return Ok(PushResult::Error(format!(
            "failed to push branch (even with --force-with-lease): {}",
            force.error_text()
        )));
    }

    Ok(PushResult::Error(error_msg))
}


#[cfg(test)]
mod tests {
    use super::testutil::{commit_file, init_repo, run_git};
    use super::*;

    #[test]
    fn current_branch_reports_main() {
        let dir = init_repo();
        assert_eq!(current_branch(dir.path()).unwrap(), "main");
    }

    #[test]
    fn branch_existence_checks() {
        let dir = init_repo();
        let repo = dir.path();
        assert!(branch_exists(repo, "main").unwrap());
        assert!(!branch_exists(repo, "feature-x").unwrap());
        run_git(repo, &["branch", "feature-x"]);
        assert!(local_branch_exists(repo, "feature-x").unwrap());
    }

    #[test]
    fn show_file_reads_content_at_ref() {
        let dir = init_repo();
        let repo = dir.path();
        commit_file(repo, "a.txt", "first\n", "add a");
        let content = show_file(repo, "HEAD", "a.txt").unwrap();
        assert_eq!(content.as_deref(), Some("first\n"));
        assert!(show_file(repo, "HEAD", "missing.txt").unwrap().is_none());
    }

    #[test]
    fn merge_base_of_diverged_branches() {
        let dir = init_repo();
        let repo = dir.path();
        let base = rev_parse(repo, "HEAD").unwrap();
        run_git(repo, &["checkout", "-b", "topic"]);
        commit_file(repo, "t.txt", "topic\n", "topic work");
        checkout(repo, "main").unwrap();
        commit_file(repo, "m.txt", "main\n", "main work");
        assert_eq!(merge_base(repo, "topic", "main").unwrap(), base);
    }

    #[test]
    fn default_branch_falls_back_to_probing() {
        let dir = init_repo();
        assert_eq!(default_branch(dir.path()).unwrap(), "main");
    }

    #[test]
    fn parent_branch_reads_merge_config() {
        let dir = init_repo();
        let repo = dir.path();
        run_git(repo, &["checkout", "-b", "feature-y"]);
        run_git(repo, &["config", "branch.feature-y.merge", "refs/heads/main"]);
        assert_eq!(parent_branch(repo, "feature-y").unwrap(), "main");
    }

    #[test]
    fn parse_remote_forms() {
        assert_eq!(
            parse_remote("https://github.com/acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_remote("git@github.com:acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_remote("ssh://git@github.com/acme/widgets"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(parse_remote("https://github.com/acme"), None);
    }

    #[test]
    fn parse_remote_generic_fallback() {
        assert_eq!(
            parse_remote("https://gitlab.example/acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            parse_remote("git@host.example:team/project.git"),
            Some(("team".to_string(), "project".to_string()))
        );
        assert_eq!(
            parse_remote("/srv/mirrors/widgets.git"),
            Some(("mirrors".to_string(), "widgets".to_string()))
        );
    }

    #[test]
    fn amend_rewrites_latest_message() {
        let dir = init_repo();
        let repo = dir.path();
        commit_file(repo, "b.txt", "data\n", "placeholder");
        amend_commit(repo, "real message").unwrap();
        let out = git(repo, &["log", "-1", "--pretty=%B"]).unwrap();
        assert_eq!(out.stdout_trimmed(), "real message");
    }

    #[test]
    fn check_ignored_respects_gitignore() {
        let dir = init_repo();
        let repo = dir.path();
        std::fs::write(repo.join(".gitignore"), "*.log\n").unwrap();
        assert!(check_ignored(repo, "debug.log"));
        assert!(!check_ignored(repo, "src.rs"));
    }
}
