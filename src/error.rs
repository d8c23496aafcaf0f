use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShipmateError {
    #[error("Not inside a git repository")]
    NotAGitRepo,

    #[error("Git error: {0}")]
    Git(String),

    #[error("Manifest file not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Malformed manifest: {0}")]
    ManifestMalformed(String),

    #[error("Summary generation failed: {0}")]
    Synthesis(String),

    #[error("Combined summary generation failed: {0}")]
    CombineFailed(String),

    #[error("Pull request creation failed (HTTP {status}): {body}")]
    PublishFailed { status: u16, body: String },

    #[error("Issue lookup failed: {0}")]
    Jira(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shell completion error: {0}")]
    ShellCompletion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ShipmateError>;
