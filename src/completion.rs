//! Shell completion script generation.
//!
//! Backs the hidden `completions` subcommand: the script for the requested
//! shell is written to stdout so users can pipe it wherever their shell
//! expects it.

use clap::Command;
use clap_complete::{generate, Shell};

use crate::error::{Result, ShipmateError};

pub const SUPPORTED_SHELLS: &[&str] = &["bash", "zsh", "fish"];

/// Supported shell types for completion scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
}

impl ShellType {
    pub fn from_name(name: &str) -> Result<ShellType> {
        match name {
            "bash" => Ok(ShellType::Bash),
            "zsh" => Ok(ShellType::Zsh),
            "fish" => Ok(ShellType::Fish),
            other => Err(ShipmateError::ShellCompletion(format!(
                "Unsupported shell: '{}'",
                other
            ))),
        }
    }

    fn to_clap_shell(self) -> Shell {
        match self {
            ShellType::Bash => Shell::Bash,
            ShellType::Zsh => Shell::Zsh,
            ShellType::Fish => Shell::Fish,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Fish => "fish",
        }
    }
}

impl std::fmt::Display for ShellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Generate a completion script for the given CLI definition.
pub fn generate_completion_script(shell: ShellType, cmd: &mut Command, bin_name: &str) -> String {
    let mut buf = Vec::new();
    generate(shell.to_clap_shell(), cmd, bin_name, &mut buf);
    String::from_utf8(buf).unwrap_or_default()
}

pub fn print_completion_script(shell: ShellType, cmd: &mut Command, bin_name: &str) {
    print!("{}", generate_completion_script(shell, cmd, bin_name));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_cli() -> Command {
        Command::new("shipmate")
            .subcommand(Command::new("run").arg(clap::Arg::new("ticket")))
            .subcommand(Command::new("review"))
            .subcommand(Command::new("ticket").arg(clap::Arg::new("key")))
    }

    #[test]
    fn from_name_accepts_supported_shells() {
        assert_eq!(ShellType::from_name("bash").unwrap(), ShellType::Bash);
        assert_eq!(ShellType::from_name("zsh").unwrap(), ShellType::Zsh);
        assert_eq!(ShellType::from_name("fish").unwrap(), ShellType::Fish);
    }

    #[test]
    fn from_name_rejects_unknown_shell() {
        match ShellType::from_name("tcsh") {
            Err(ShipmateError::ShellCompletion(msg)) => assert!(msg.contains("tcsh")),
            other => panic!("expected ShellCompletion error, got {:?}", other),
        }
    }

    #[test]
    fn name_round_trips() {
        for shell in [ShellType::Bash, ShellType::Zsh, ShellType::Fish] {
            assert_eq!(ShellType::from_name(shell.name()).unwrap(), shell);
            assert_eq!(format!("{}", shell), shell.name());
        }
    }

    #[test]
    fn bash_script_covers_subcommands() {
        let script = generate_completion_script(ShellType::Bash, &mut toy_cli(), "shipmate");
        assert!(script.contains("shipmate"));
        assert!(script.contains("run"));
        assert!(script.contains("review"));
        assert!(script.contains("ticket"));
    }

    #[test]
    fn zsh_script_has_compdef_header() {
        let script = generate_completion_script(ShellType::Zsh, &mut toy_cli(), "shipmate");
        assert!(script.contains("#compdef shipmate"));
    }

    #[test]
    fn fish_script_uses_complete() {
        let script = generate_completion_script(ShellType::Fish, &mut toy_cli(), "shipmate");
        assert!(script.contains("complete"));
        assert!(script.contains("shipmate"));
    }
}
