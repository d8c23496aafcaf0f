//! Shell command execution.
//!
//! All version-control and system operations go through this module: commands
//! are spawned, their output captured, and a structured result returned. A
//! non-zero exit is not an error at this layer; callers inspect the exit
//! code and decide. Only spawn-level failures (binary missing, I/O) propagate.

use std::path::Path;
use std::process::Command;

use crate::error::Result;

/// Captured output of one external command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with surrounding whitespace removed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Non-empty stderr, falling back to stdout. Used when reporting failures:
    /// some tools print their error text to stdout.
    pub fn error_text(&self) -> &str {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim()
        } else {
            err
        }
    }
}

/// Run a command in the current working directory.
pub fn run(program: &str, args: &[&str]) -> Result<CmdOutput> {
    let output = Command::new(program).args(args).output()?;
    Ok(to_cmd_output(output))
}

/// Run a command with an explicit working directory.
pub fn run_in(dir: &Path, program: &str, args: &[&str]) -> Result<CmdOutput> {
    let output = Command::new(program).args(args).current_dir(dir).output()?;
    Ok(to_cmd_output(output))
}

fn to_cmd_output(output: std::process::Output) -> CmdOutput {
    CmdOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        // A process killed by a signal has no exit code; -1 marks that case.
        exit_code: output.status.code().unwrap_or(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = run("sh", &["-c", "echo hello"]).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_trimmed(), "hello");
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let out = run("sh", &["-c", "exit 3"]).unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 3);
    }

    #[test]
    fn captures_stderr() {
        let out = run("sh", &["-c", "echo oops >&2; exit 1"]).unwrap();
        assert_eq!(out.error_text(), "oops");
    }

    #[test]
    fn error_text_falls_back_to_stdout() {
        let out = run("sh", &["-c", "echo visible; exit 1"]).unwrap();
        assert_eq!(out.error_text(), "visible");
    }

    #[test]
    fn missing_binary_is_an_error() {
        assert!(run("shipmate-no-such-binary", &[]).is_err());
    }

    #[test]
    fn run_in_respects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_in(dir.path(), "sh", &["-c", "pwd"]).unwrap();
        let reported = std::fs::canonicalize(out.stdout_trimmed()).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(reported, expected);
    }
}
