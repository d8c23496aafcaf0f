//! The change-capture-and-message-synthesis pipeline.
//!
//! Control flow: detect changes → isolate onto a snapshot branch → extract
//! per-file diffs → summarize each file → fold into one commit message →
//! amend the snapshot commit → optionally push and open a pull request.
//! Every run ends with the original branch checked out and the manifest and
//! scratch directory removed, success or not; failures after isolation
//! additionally roll the snapshot back.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cmd;
use crate::config::Config;
use crate::error::{Result, ShipmateError};
use crate::gh::GithubClient;
use crate::git::{self, ChangeRecord, DiffArtifact, ExcludeReason, PushResult};
use crate::jira::JiraClient;
use crate::llm::{CommitMessage, Synthesizer};
use crate::manifest;
use crate::output;
use crate::progress::Spinner;

/// Scratch directory under the repository root; holds one diff artifact and
/// one summary file per changed file for the duration of a run.
pub const SCRATCH_DIR: &str = ".shipmate-scratch";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Ticket/branch identifier for this unit of work.
    pub ticket: String,
    pub create_pr: bool,
    /// Base branch for the pull request; the original branch when unset.
    pub base: Option<String>,
    /// Repository to operate on; the repository containing the current
    /// directory when unset.
    pub repo: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ReviewOptions {
    /// Branch to open the pull request into; the remote default branch when
    /// unset.
    pub base: Option<String>,
    pub create_pr: bool,
    pub repo: Option<PathBuf>,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    /// Clean tree: no branch created, nothing published. Exits zero.
    NothingToDo,
    Completed {
        branch: String,
        message: CommitMessage,
        pr_url: Option<String>,
    },
}

/// Process-wide state for one invocation. Created at pipeline start,
/// discarded at pipeline end; the cleanup pass uses it to know what to
/// delete and where to return to.
pub struct PipelineContext {
    pub repo_root: PathBuf,
    pub original_branch: String,
    pub work_branch: Option<String>,
    pub records: Vec<ChangeRecord>,
    pub summaries: Vec<String>,
}

/// Run the full capture-and-synthesis pipeline for one ticket.
pub fn run_pipeline(config: &Config, opts: &PipelineOptions) -> Result<PipelineOutcome> {
    output::print_step("1", "Initializing pipeline");
    let repo_root = resolve_repo_path(&opts.repo)?;
    let original_branch = git::current_branch(&repo_root)?;
    output::print_info(&format!("Starting from branch: {}", original_branch));

    output::print_step("2", "Detecting changes");
    let records = git::detect_changes(&repo_root)?;
    report_exclusions(&records);
    let included = records.iter().filter(|r| r.is_included()).count();
    if included == 0 {
        output::print_info("No changes detected in the working tree. Nothing to do.");
        return Ok(PipelineOutcome::NothingToDo);
    }
    output::print_success(&format!("Detected {} changed file(s).", included));

    let mut ctx = PipelineContext {
        repo_root,
        original_branch,
        work_branch: None,
        records,
        summaries: Vec::new(),
    };

    let result = capture_and_synthesize(config, opts, &mut ctx);

    if let Err(e) = &result {
        output::print_error(&format!("Pipeline failed: {}", e));
        if let Some(branch) = ctx.work_branch.clone() {
            output::print_step("Rollback", "Rolling back changes");
            git::rollback(&ctx.repo_root, &branch, &ctx.original_branch);
        }
    }
    // Success with a published PR leaves the snapshot on the remote only;
    // without a PR the local branch stays for the caller to use.
    let delete_branch = result.is_ok() && opts.create_pr;
    cleanup(&ctx, delete_branch);

    result
}

fn capture_and_synthesize(
    config: &Config,
    opts: &PipelineOptions,
    ctx: &mut PipelineContext,
) -> Result<PipelineOutcome> {
    let synthesizer = Synthesizer::new(config.require_llm()?)?;

    output::print_step("3", &format!("Isolating changes for '{}'", opts.ticket));
    let branch = git::isolate(&ctx.repo_root, &opts.ticket)?;
    ctx.work_branch = Some(branch.clone());
    output::print_success(&format!("Changes captured on branch '{}'.", branch));

    // Written after isolation so the snapshot commit never contains it; the
    // manifest lives untracked on the original branch until cleanup.
    output::print_step("4", "Writing change manifest");
    let manifest_file = manifest::write_manifest(&ctx.repo_root, &ctx.records)?;
    output::print_success(&format!("Manifest written: {}", manifest_file.display()));

    output::print_step("5", "Extracting per-file diffs");
    let entries = manifest::read_manifest(&ctx.repo_root)?;
    let records = manifest::entries_to_records(&entries);
    let artifacts = git::extract(&ctx.repo_root, &records, &ctx.original_branch, &branch)?;
    let scratch = ensure_scratch(&ctx.repo_root)?;
    write_artifacts(&scratch, &artifacts)?;

    output::print_step("6", "Summarizing changes");
    summarize_files(&synthesizer, &artifacts, &scratch, &mut ctx.summaries)?;

    output::print_step("7", "Generating combined commit message");
    let ticket_context = fetch_ticket_context(config, &opts.ticket);
    let spinner = Spinner::new("Combining summaries");
    let combined = synthesizer.summarize_all(&ctx.summaries, ticket_context.as_deref());
    spinner.finish();
    let message = combined?;
    fs::write(scratch.join("final_commit_message.txt"), &message.body)?;
    output::print_success("Commit message generated:");
    println!("{}", message.body);

    output::print_step("8", "Updating commit message");
    amend_snapshot_message(&ctx.repo_root, &branch, &ctx.original_branch, &message)?;

    let pr_url = if opts.create_pr {
        output::print_step("9", "Creating pull request");
        Some(publish_snapshot(config, opts, ctx, &message)?)
    } else {
        None
    };

    let branch = ctx.work_branch.clone().unwrap_or(branch);
    Ok(PipelineOutcome::Completed {
        branch,
        message,
        pr_url,
    })
}

/// Branch review mode: summarize the current branch's accumulated commits
/// against its merge base with the parent branch, then open a pull request
/// for the branch itself. No isolation branch is involved.
pub fn run_review(config: &Config, opts: &ReviewOptions) -> Result<PipelineOutcome> {
    output::print_step("1", "Initializing branch review");
    let repo_root = resolve_repo_path(&opts.repo)?;
    let current = git::current_branch(&repo_root)?;
    let parent = git::parent_branch(&repo_root, &current)?;
    let merge_base = git::merge_base(&repo_root, &current, &parent)?;
    output::print_info(&format!(
        "Comparing '{}' against its merge base with '{}'",
        current, parent
    ));

    output::print_step("2", "Collecting changed files");
    let diff = git::git(&repo_root, &["diff", "--name-status", &merge_base])?;
    if !diff.success() {
        return Err(ShipmateError::Git(format!(
            "failed to diff against merge base: {}",
            diff.error_text()
        )));
    }
    let mut records = Vec::new();
    for (path, kind) in git::changes::parse_name_status(&diff.stdout) {
        let mut record = ChangeRecord::new(path, kind);
        if git::check_ignored(&repo_root, &record.path) {
            record.excluded = Some(ExcludeReason::Ignored);
        }
        records.push(record);
    }
    report_exclusions(&records);
    let included = records.iter().filter(|r| r.is_included()).count();
    if included == 0 {
        output::print_info("No changes since the merge base. Nothing to do.");
        return Ok(PipelineOutcome::NothingToDo);
    }
    output::print_success(&format!("Found {} changed file(s).", included));

    let mut ctx = PipelineContext {
        repo_root,
        original_branch: current.clone(),
        work_branch: None,
        records,
        summaries: Vec::new(),
    };

    let result = review_and_publish(config, opts, &mut ctx, &merge_base, &current);
    if let Err(e) = &result {
        output::print_error(&format!("Branch review failed: {}", e));
    }
    cleanup(&ctx, false);
    result
}

fn review_and_publish(
    config: &Config,
    opts: &ReviewOptions,
    ctx: &mut PipelineContext,
    merge_base: &str,
    branch: &str,
) -> Result<PipelineOutcome> {
    let synthesizer = Synthesizer::new(config.require_llm()?)?;

    output::print_step("3", "Writing change manifest");
    manifest::write_manifest(&ctx.repo_root, &ctx.records)?;

    output::print_step("4", "Extracting per-file diffs");
    let entries = manifest::read_manifest(&ctx.repo_root)?;
    let records = manifest::entries_to_records(&entries);
    let artifacts = git::extract(&ctx.repo_root, &records, merge_base, "HEAD")?;
    let scratch = ensure_scratch(&ctx.repo_root)?;
    write_artifacts(&scratch, &artifacts)?;

    output::print_step("5", "Summarizing changes");
    summarize_files(&synthesizer, &artifacts, &scratch, &mut ctx.summaries)?;

    output::print_step("6", "Generating combined commit message");
    let ticket_context = fetch_ticket_context(config, branch);
    let spinner = Spinner::new("Combining summaries");
    let combined = synthesizer.summarize_all(&ctx.summaries, ticket_context.as_deref());
    spinner.finish();
    let message = combined?;
    fs::write(scratch.join("final_commit_message.txt"), &message.body)?;
    output::print_success("Summary generated:");
    println!("{}", message.body);

    let pr_url = if opts.create_pr {
        output::print_step("7", "Creating pull request");
        let base = match &opts.base {
            Some(base) => base.clone(),
            None => match config.default_base.clone() {
                Some(base) => base,
                None => git::default_branch(&ctx.repo_root)?,
            },
        };
        publish_current_branch(config, &ctx.repo_root, branch, &message, &base)?
    } else {
        None
    };

    Ok(PipelineOutcome::Completed {
        branch: branch.to_string(),
        message,
        pr_url,
    })
}

fn resolve_repo_path(repo: &Option<PathBuf>) -> Result<PathBuf> {
    match repo {
        Some(path) => {
            let out = cmd::run_in(path, "git", &["rev-parse", "--show-toplevel"])?;
            if !out.success() {
                return Err(ShipmateError::NotAGitRepo);
            }
            Ok(PathBuf::from(out.stdout_trimmed()))
        }
        None => {
            if !git::is_git_repo() {
                return Err(ShipmateError::NotAGitRepo);
            }
            git::repo_root()
        }
    }
}

fn report_exclusions(records: &[ChangeRecord]) {
    for record in records {
        match record.excluded {
            Some(ExcludeReason::Ignored) => {
                output::print_warning(&format!("Ignoring file: {}", record.path))
            }
            Some(ExcludeReason::Binary) => {
                output::print_warning(&format!("Skipping binary file: {}", record.path))
            }
            None => {}
        }
    }
}

fn ensure_scratch(repo_root: &Path) -> Result<PathBuf> {
    let scratch = repo_root.join(SCRATCH_DIR);
    fs::create_dir_all(&scratch)?;
    Ok(scratch)
}

fn write_artifacts(scratch: &Path, artifacts: &[DiffArtifact]) -> Result<()> {
    for (index, artifact) in artifacts.iter().enumerate() {
        let file = scratch.join(format!("{}_{}.txt", artifact.kind().label(), index + 1));
        fs::write(&file, artifact.render())?;
    }
    Ok(())
}

/// Summarize each artifact in detection order. A failed request skips that
/// file with a warning; the surviving summaries feed the combine step.
fn summarize_files(
    synthesizer: &Synthesizer,
    artifacts: &[DiffArtifact],
    scratch: &Path,
    summaries: &mut Vec<String>,
) -> Result<()> {
    let total = artifacts.len();
    for (index, artifact) in artifacts.iter().enumerate() {
        let spinner = Spinner::new(&format!(
            "Summarizing {} ({}/{})",
            artifact.path,
            index + 1,
            total
        ));
        let result = synthesizer.summarize_file(artifact);
        spinner.finish();
        match result {
            Ok(summary) => {
                let file = scratch.join(format!(
                    "{}_{}_summary.txt",
                    artifact.kind().label(),
                    index + 1
                ));
                fs::write(&file, &summary)?;
                summaries.push(summary);
            }
            Err(e) => output::print_warning(&format!("Skipping '{}': {}", artifact.path, e)),
        }
    }
    Ok(())
}

/// Fetch issue context for the combine instruction. Missing configuration or
/// a failed lookup degrades to no context, never to a pipeline error.
fn fetch_ticket_context(config: &Config, ticket: &str) -> Option<String> {
    let jira_config = config.jira.as_ref()?;
    let client = match JiraClient::new(jira_config) {
        Ok(client) => client,
        Err(e) => {
            output::print_warning(&format!("Issue tracker unavailable: {}", e));
            return None;
        }
    };
    match client.fetch_ticket(ticket) {
        Ok(ticket_context) => {
            output::print_info(&format!("Issue context: {}", ticket_context.summary_line()));
            Some(ticket_context.summary_line())
        }
        Err(e) => {
            output::print_warning(&format!("Could not fetch issue '{}': {}", ticket, e));
            None
        }
    }
}

/// Replace the placeholder message on the snapshot commit, returning to the
/// original branch even when amending fails.
fn amend_snapshot_message(
    repo: &Path,
    branch: &str,
    original: &str,
    message: &CommitMessage,
) -> Result<()> {
    git::checkout(repo, branch)?;
    let amended = git::amend_commit(repo, &message.body);
    let restored = git::checkout(repo, original);
    amended?;
    restored?;
    output::print_success("Commit message updated.");
    Ok(())
}

fn publish_snapshot(
    config: &Config,
    opts: &PipelineOptions,
    ctx: &mut PipelineContext,
    message: &CommitMessage,
) -> Result<String> {
    let github = GithubClient::new(config.require_github()?)?;
    let remote = git::remote_url(&ctx.repo_root)?;
    let (owner, repo_name) = git::parse_remote(&remote).ok_or_else(|| {
        ShipmateError::Config(format!(
            "could not determine owner/repo from remote '{}'",
            remote
        ))
    })?;

    let branch = ctx
        .work_branch
        .clone()
        .ok_or_else(|| ShipmateError::Git("no working branch to publish".to_string()))?;
    let branch = ensure_publishable_head(&github, ctx, &owner, &repo_name, &opts.ticket, branch)?;
    ctx.work_branch = Some(branch.clone());

    output::print_info(&format!("Pushing branch {} to origin...", branch));
    match git::push_branch(&ctx.repo_root, &branch)? {
        PushResult::Success => output::print_success("Branch pushed."),
        PushResult::AlreadyUpToDate => output::print_info("Branch already up to date on origin."),
        PushResult::Error(e) => {
            return Err(ShipmateError::Git(format!(
                "failed to push branch '{}': {}",
                branch, e
            )))
        }
    }

    let base = opts
        .base
        .clone()
        .or_else(|| config.default_base.clone())
        .unwrap_or_else(|| ctx.original_branch.clone());
    let title = format!("[{}] {}", opts.ticket, message.title);
    let url = github.create_pull_request(&owner, &repo_name, &title, &message.body, &branch, &base)?;
    output::print_success(&format!("Pull request created: {}", url));
    Ok(url)
}

/// An open pull request for the head branch means this ticket was already
/// published once; move the snapshot to the next free name (same collision
/// policy as branch creation) instead of erroring.
fn ensure_publishable_head(
    github: &GithubClient,
    ctx: &PipelineContext,
    owner: &str,
    repo_name: &str,
    ticket: &str,
    current: String,
) -> Result<String> {
    if !github.pr_exists(owner, repo_name, &current)? {
        return Ok(current);
    }
    output::print_warning(&format!(
        "An open pull request already exists for '{}'. Picking a new branch name.",
        current
    ));
    for n in 2u32.. {
        let candidate = format!("{}-{}", ticket, n);
        if candidate == current
            || git::branch_exists(&ctx.repo_root, &candidate)?
            || github.pr_exists(owner, repo_name, &candidate)?
        {
            continue;
        }
        let out = git::git(&ctx.repo_root, &["branch", "-m", &current, &candidate])?;
        if !out.success() {
            return Err(ShipmateError::Git(format!(
                "failed to rename branch '{}' to '{}': {}",
                current,
                candidate,
                out.error_text()
            )));
        }
        output::print_info(&format!("Renamed branch '{}' to '{}'.", current, candidate));
        return Ok(candidate);
    }
    unreachable!("collision counter exhausted");
}

/// Publish the branch the user is already on (review mode). An existing open
/// pull request is reported and left alone; the user's branch is never
/// renamed.
fn publish_current_branch(
    config: &Config,
    repo_root: &Path,
    branch: &str,
    message: &CommitMessage,
    base: &str,
) -> Result<Option<String>> {
    let github = GithubClient::new(config.require_github()?)?;
    let remote = git::remote_url(repo_root)?;
    let (owner, repo_name) = git::parse_remote(&remote).ok_or_else(|| {
        ShipmateError::Config(format!(
            "could not determine owner/repo from remote '{}'",
            remote
        ))
    })?;

    if github.pr_exists(&owner, &repo_name, branch)? {
        output::print_warning(&format!(
            "An open pull request already exists for '{}'. Skipping creation.",
            branch
        ));
        return Ok(None);
    }

    output::print_info(&format!("Pushing branch {} to origin...", branch));
    match git::push_branch(repo_root, branch)? {
        PushResult::Success => output::print_success("Branch pushed."),
        PushResult::AlreadyUpToDate => output::print_info("Branch already up to date on origin."),
        PushResult::Error(e) => {
            return Err(ShipmateError::Git(format!(
                "failed to push branch '{}': {}",
                branch, e
            )))
        }
    }

    let title = format!("[{}] {}", branch, message.title);
    let url = github.create_pull_request(&owner, &repo_name, &title, &message.body, branch, base)?;
    output::print_success(&format!("Pull request created: {}", url));
    Ok(Some(url))
}

/// Delete the run's temporary artifacts and make sure the original branch is
/// checked out again. Runs on every exit path; failures are reported, never
/// propagated.
fn cleanup(ctx: &PipelineContext, delete_branch: bool) {
    output::print_step("Cleanup", "Removing temporary artifacts");

    match manifest::remove_manifest(&ctx.repo_root) {
        Ok(true) => output::print_success("Removed change manifest."),
        Ok(false) => {}
        Err(e) => output::print_error(&format!("Failed to remove manifest: {}", e)),
    }

    let scratch = ctx.repo_root.join(SCRATCH_DIR);
    if scratch.exists() {
        match fs::remove_dir_all(&scratch) {
            Ok(()) => output::print_success("Removed scratch directory."),
            Err(e) => output::print_error(&format!("Failed to remove scratch directory: {}", e)),
        }
    }

    match git::current_branch(&ctx.repo_root) {
        Ok(current) if current != ctx.original_branch => {
            match git::checkout(&ctx.repo_root, &ctx.original_branch) {
                Ok(()) => output::print_success(&format!(
                    "Returned to original branch: {}",
                    ctx.original_branch
                )),
                Err(e) => output::print_error(&format!(
                    "Failed to return to branch {}: {}",
                    ctx.original_branch, e
                )),
            }
        }
        Ok(_) => {}
        Err(e) => output::print_error(&format!("Failed to determine current branch: {}", e)),
    }

    if delete_branch {
        if let Some(branch) = &ctx.work_branch {
            match git::delete_branch(&ctx.repo_root, branch) {
                Ok(()) => output::print_success(&format!("Deleted local branch {}.", branch)),
                Err(e) => output::print_error(&format!("Failed to delete branch {}: {}", branch, e)),
            }
        }
    }
}
