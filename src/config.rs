//! Runtime configuration.
//!
//! Endpoints and defaults come from an optional TOML file under
//! `~/.config/shipmate/config.toml`; secrets come from environment variables:
//!
//! - `LLM_ENDPOINT` / `LLM_TOKEN`: text-generation service
//! - `JIRA_BASE_URL` / `JIRA_EMAIL` / `JIRA_API_TOKEN`: issue tracker
//! - `GITHUB_TOKEN` (and optionally `GITHUB_API_URL`): pull-request hosting
//!
//! Everything is resolved once at startup into a [`Config`] value that is
//! passed into pipeline construction; nothing reads the environment after
//! that point.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShipmateError};

const CONFIG_DIR_NAME: &str = "shipmate";

/// Default pull-request API host when none is configured.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// On-disk shape of `config.toml`. All fields optional; missing fields fall
/// back to environment variables or built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub llm_endpoint: Option<String>,

    #[serde(default)]
    pub jira_base_url: Option<String>,

    #[serde(default)]
    pub github_api_url: Option<String>,

    /// Base branch to open pull requests into when the caller does not name
    /// one and the remote's default branch cannot be determined.
    #[serde(default)]
    pub default_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: String,
}

/// Fully resolved configuration for one invocation.
///
/// Sub-configs are `None` when their credentials are absent; each surface
/// that needs one reports a [`ShipmateError::Config`] at the point of use
/// rather than at startup, so e.g. a run without `--pr` works without a
/// GitHub token.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: Option<LlmConfig>,
    pub jira: Option<JiraConfig>,
    pub github: Option<GithubConfig>,
    pub default_base: Option<String>,
}

impl Config {
    /// Resolve configuration from the config file and process environment.
    pub fn resolve() -> Result<Config> {
        let file = load_file_config()?;
        Ok(Self::from_sources(file, |key| std::env::var(key).ok()))
    }

    /// Build a `Config` from explicit sources. Environment values take
    /// precedence over file values.
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Config {
        let llm = env("LLM_ENDPOINT")
            .or(file.llm_endpoint)
            .map(|endpoint| LlmConfig {
                endpoint,
                token: env("LLM_TOKEN"),
            });

        let jira = match (
            env("JIRA_BASE_URL").or(file.jira_base_url),
            env("JIRA_EMAIL"),
            env("JIRA_API_TOKEN"),
        ) {
            (Some(base_url), Some(email), Some(api_token)) => Some(JiraConfig {
                base_url,
                email,
                api_token,
            }),
            _ => None,
        };

        let github = env("GITHUB_TOKEN").map(|token| GithubConfig {
            api_url: env("GITHUB_API_URL")
                .or(file.github_api_url)
                .unwrap_or_else(|| GITHUB_API_URL.to_string()),
            token,
        });

        Config {
            llm,
            jira,
            github,
            default_base: file.default_base,
        }
    }

    pub fn require_llm(&self) -> Result<&LlmConfig> {
        self.llm.as_ref().ok_or_else(|| {
            ShipmateError::Config(
                "text-generation endpoint not configured \
                 (set LLM_ENDPOINT or llm_endpoint in config.toml)"
                    .to_string(),
            )
        })
    }

    pub fn require_github(&self) -> Result<&GithubConfig> {
        self.github.as_ref().ok_or_else(|| {
            ShipmateError::Config(
                "GitHub token not configured (set the GITHUB_TOKEN environment variable)"
                    .to_string(),
            )
        })
    }
}

/// Path of the config file, `~/.config/shipmate/config.toml` on Linux.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.toml"))
}

fn load_file_config() -> Result<FileConfig> {
    let Some(path) = config_path() else {
        return Ok(FileConfig::default());
    };
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = fs::read_to_string(&path)?;
    toml::from_str(&raw)
        .map_err(|e| ShipmateError::Config(format!("invalid {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_sources_leave_everything_unconfigured() {
        let config = Config::from_sources(FileConfig::default(), |_| None);
        assert!(config.llm.is_none());
        assert!(config.jira.is_none());
        assert!(config.github.is_none());
        assert!(config.require_llm().is_err());
        assert!(config.require_github().is_err());
    }

    #[test]
    fn env_endpoint_takes_precedence_over_file() {
        let file = FileConfig {
            llm_endpoint: Some("https://file.example/chat".to_string()),
            ..Default::default()
        };
        let config = Config::from_sources(file, env_of(&[("LLM_ENDPOINT", "https://env.example/chat")]));
        assert_eq!(config.llm.unwrap().endpoint, "https://env.example/chat");
    }

    #[test]
    fn file_endpoint_used_when_env_missing() {
        let file = FileConfig {
            llm_endpoint: Some("https://file.example/chat".to_string()),
            ..Default::default()
        };
        let config = Config::from_sources(file, |_| None);
        let llm = config.llm.unwrap();
        assert_eq!(llm.endpoint, "https://file.example/chat");
        assert!(llm.token.is_none());
    }

    #[test]
    fn jira_requires_all_three_values() {
        let config = Config::from_sources(
            FileConfig::default(),
            env_of(&[
                ("JIRA_BASE_URL", "https://corp.atlassian.net"),
                ("JIRA_EMAIL", "dev@corp.example"),
            ]),
        );
        assert!(config.jira.is_none());

        let config = Config::from_sources(
            FileConfig::default(),
            env_of(&[
                ("JIRA_BASE_URL", "https://corp.atlassian.net"),
                ("JIRA_EMAIL", "dev@corp.example"),
                ("JIRA_API_TOKEN", "secret"),
            ]),
        );
        let jira = config.jira.unwrap();
        assert_eq!(jira.base_url, "https://corp.atlassian.net");
        assert_eq!(jira.email, "dev@corp.example");
    }

    #[test]
    fn github_defaults_api_url() {
        let config = Config::from_sources(FileConfig::default(), env_of(&[("GITHUB_TOKEN", "tok")]));
        let github = config.github.unwrap();
        assert_eq!(github.api_url, GITHUB_API_URL);
        assert_eq!(github.token, "tok");
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let parsed: FileConfig = toml::from_str("llm_endpoint = \"https://svc.example/chat\"").unwrap();
        assert_eq!(
            parsed.llm_endpoint.as_deref(),
            Some("https://svc.example/chat")
        );
        assert!(parsed.default_base.is_none());
    }
}
