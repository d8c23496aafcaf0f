//! Pull-request publishing via the GitHub REST API.

use serde_json::json;

use crate::config::GithubConfig;
use crate::error::{Result, ShipmateError};
use crate::output;

pub struct GithubClient {
    api_url: String,
    token: String,
    http: reqwest::blocking::Client,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("shipmate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http,
        })
    }

    /// Check for an open pull request with the given head branch.
    ///
    /// A failing check reads as "no PR"; publishing will surface the real
    /// error if there is one.
    pub fn pr_exists(&self, owner: &str, repo: &str, head_branch: &str) -> Result<bool> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_url, owner, repo);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .query(&[
                ("head", format!("{}:{}", owner, head_branch)),
                ("state", "open".to_string()),
            ])
            .send();

        let Ok(response) = response else {
            return Ok(false);
        };
        if !response.status().is_success() {
            return Ok(false);
        }
        match response.json::<Vec<serde_json::Value>>() {
            Ok(prs) => Ok(!prs.is_empty()),
            Err(_) => Ok(false),
        }
    }

    /// Open a pull request and return its hosted URL (HTTP 201).
    ///
    /// Any other status fails with the status and response body verbatim;
    /// branch conflicts (422) and missing repository/permissions (404) also
    /// print an actionable warning first.
    pub fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<String> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_url, owner, repo);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .json(&json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            }))
            .send()?;

        let status = response.status().as_u16();
        let text = response.text()?;

        if status == 201 {
            let value: serde_json::Value = serde_json::from_str(&text)?;
            if let Some(html_url) = value.get("html_url").and_then(|v| v.as_str()) {
                return Ok(html_url.to_string());
            }
            return Err(ShipmateError::PublishFailed {
                status,
                body: "response missing html_url".to_string(),
            });
        }

        match status {
            422 => output::print_warning(
                "The branch may already have a pull request on the remote, or the \
                 head branch was not pushed. You may need to update the existing \
                 pull request instead.",
            ),
            404 => output::print_warning(
                "The repository might not exist or the token may lack permissions. \
                 Check your GitHub access and repository settings.",
            ),
            _ => {}
        }

        Err(ShipmateError::PublishFailed { status, body: text })
    }
}
