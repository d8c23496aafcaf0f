//! shipmate CLI entry point.
//!
//! Parses command-line arguments and dispatches to the pipeline.

use clap::{CommandFactory, Parser, Subcommand};
use shipmate::completion::{print_completion_script, ShellType, SUPPORTED_SHELLS};
use shipmate::config::Config;
use shipmate::jira::{JiraClient, TicketContext};
use shipmate::output::{self, print_error, print_header};
use shipmate::pipeline::{run_pipeline, run_review, PipelineOptions, PipelineOutcome, ReviewOptions};
use shipmate::progress::Spinner;
use shipmate::ShipmateError;

#[derive(Parser)]
#[command(name = "shipmate")]
#[command(
    version,
    about = "CLI automation for ticket-driven commits and pull requests",
    arg_required_else_help = true,
    after_help = "EXAMPLES:
    # Capture working-tree changes for a ticket and synthesize a commit message
    shipmate PROJ-142
    shipmate run PROJ-142

    # Also push the snapshot branch and open a pull request
    shipmate PROJ-142 --pr

    # Summarize the current branch's commits and open a PR into main
    shipmate review --pr --base main

    # Look up an issue in the tracker
    shipmate ticket PROJ-142

CONFIGURATION:
    Secrets come from the environment: LLM_ENDPOINT / LLM_TOKEN,
    JIRA_BASE_URL / JIRA_EMAIL / JIRA_API_TOKEN, GITHUB_TOKEN.
    Endpoints and defaults may also live in ~/.config/shipmate/config.toml."
)]
struct Cli {
    /// Ticket/branch identifier (shorthand for `run <TICKET>`)
    ticket: Option<String>,

    /// Push the snapshot branch and open a pull request
    #[arg(long)]
    pr: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture working-tree changes and synthesize a commit message
    #[command(after_help = "EXAMPLES:
    shipmate run PROJ-142             # Snapshot branch + commit message
    shipmate run PROJ-142 --pr        # Also push and open a pull request
    shipmate run PROJ-142 --pr --base develop

BEHAVIOR:
    Changes are captured onto a branch named after the ticket (PROJ-142,
    then PROJ-142-2, PROJ-142-3 on collision). The original branch is
    checked out again when the run ends, success or failure.")]
    Run {
        /// Ticket/branch identifier for this unit of work
        ticket: String,

        /// Push the snapshot branch and open a pull request
        #[arg(long)]
        pr: bool,

        /// Base branch for the pull request (defaults to the current branch)
        #[arg(long)]
        base: Option<String>,
    },

    /// Summarize the current branch's commits against its parent branch
    #[command(after_help = "EXAMPLES:
    shipmate review                   # Summary of merge-base..HEAD
    shipmate review --pr              # Also open a PR into the default branch
    shipmate review --pr --base main

BEHAVIOR:
    The parent branch comes from branch.<name>.merge when configured,
    the remote default branch otherwise. No snapshot branch is created;
    the pull request is opened for the branch you are on.")]
    Review {
        /// Push the current branch and open a pull request
        #[arg(long)]
        pr: bool,

        /// Base branch for the pull request (defaults to the remote default branch)
        #[arg(long)]
        base: Option<String>,
    },

    /// Look up an issue in the tracker and print its details
    Ticket {
        /// Issue key, e.g. PROJ-142
        key: String,
    },

    /// Output shell completion script to stdout (hidden utility command)
    #[command(hide = true)]
    Completions {
        /// Shell type to generate completions for (bash, zsh, or fish)
        shell: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Completions need neither a git repo nor configuration.
    if let Some(Commands::Completions { shell }) = &cli.command {
        match ShellType::from_name(shell) {
            Ok(shell_type) => {
                print_completion_script(shell_type, &mut Cli::command(), "shipmate");
                return;
            }
            Err(e) => {
                print_error(&format!(
                    "{}\nSupported shells: {}",
                    e,
                    SUPPORTED_SHELLS.join(", ")
                ));
                std::process::exit(1);
            }
        }
    }

    let config = match Config::resolve() {
        Ok(config) => config,
        Err(e) => {
            print_error(&e.to_string());
            std::process::exit(1);
        }
    };

    print_header();

    let result = match (cli.ticket, cli.command) {
        // Positional ticket argument takes precedence
        (Some(ticket), _) => capture_command(&config, ticket, cli.pr, None),

        (None, Some(Commands::Run { ticket, pr, base })) => {
            capture_command(&config, ticket, pr, base)
        }

        (None, Some(Commands::Review { pr, base })) => review_command(&config, pr, base),

        (None, Some(Commands::Ticket { key })) => ticket_command(&config, &key),

        // Completions already handled above
        (None, Some(Commands::Completions { .. })) => unreachable!(),

        // arg_required_else_help leaves only flag-only invocations here
        (None, None) => Err(ShipmateError::Config(
            "a ticket/branch identifier is required; see `shipmate --help`".to_string(),
        )),
    };

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn capture_command(
    config: &Config,
    ticket: String,
    pr: bool,
    base: Option<String>,
) -> shipmate::Result<()> {
    let opts = PipelineOptions {
        ticket,
        create_pr: pr,
        base,
        repo: None,
    };
    report_outcome(run_pipeline(config, &opts)?);
    Ok(())
}

fn review_command(config: &Config, pr: bool, base: Option<String>) -> shipmate::Result<()> {
    let opts = ReviewOptions {
        base,
        create_pr: pr,
        repo: None,
    };
    report_outcome(run_review(config, &opts)?);
    Ok(())
}

fn report_outcome(outcome: PipelineOutcome) {
    match outcome {
        PipelineOutcome::NothingToDo => {}
        PipelineOutcome::Completed { branch, pr_url, .. } => match pr_url {
            Some(url) => output::print_success(&format!("Done. Pull request: {}", url)),
            None => output::print_success(&format!("Done. Branch: {}", branch)),
        },
    }
}

fn ticket_command(config: &Config, key: &str) -> shipmate::Result<()> {
    let jira_config = config.jira.as_ref().ok_or_else(|| {
        ShipmateError::Config(
            "issue tracker not configured (set JIRA_BASE_URL, JIRA_EMAIL and JIRA_API_TOKEN)"
                .to_string(),
        )
    })?;
    let client = JiraClient::new(jira_config)?;

    let spinner = Spinner::new(&format!("Fetching {}", key));
    let ticket = client.fetch_ticket(key);
    spinner.finish();

    print!("{}", format_ticket(&ticket?));
    Ok(())
}

fn format_ticket(ticket: &TicketContext) -> String {
    use shipmate::output::{BOLD, CYAN, GRAY, RESET};

    let issue = &ticket.issue;
    let mut out = format!(
        "{BOLD}{CYAN}{}{RESET} {} {GRAY}[{}]{RESET}\n\n{}\n",
        issue.key, issue.title, issue.status, issue.description
    );

    if !ticket.subtasks.is_empty() {
        out.push_str(&format!("\n{BOLD}Subtasks:{RESET}\n"));
        for sub in &ticket.subtasks {
            out.push_str(&format!(
                "  - {} {} {GRAY}[{}]{RESET}\n",
                sub.key, sub.title, sub.status
            ));
        }
    }

    if !ticket.linked.is_empty() {
        out.push_str(&format!("\n{BOLD}Linked issues:{RESET}\n"));
        for link in &ticket.linked {
            out.push_str(&format!(
                "  - {}: {} {}\n",
                link.relationship, link.issue.key, link.issue.title
            ));
        }
    }

    out
}
