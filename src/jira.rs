//! Issue-tracker lookups (Jira REST API v3).
//!
//! Fetches an issue by key with basic auth, flattens the Atlassian rich-text
//! description to plain text, and follows subtasks and issue links one level
//! deep. Used to enrich the combined summary and exposed as the `ticket`
//! subcommand.

use serde_json::Value;

use crate::config::JiraConfig;
use crate::error::{Result, ShipmateError};

const NO_DESCRIPTION: &str = "No description provided.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDetails {
    pub key: String,
    pub title: String,
    pub status: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIssue {
    /// Human-readable relationship, e.g. `This issue blocks`.
    pub relationship: String,
    pub issue: IssueDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketContext {
    pub issue: IssueDetails,
    pub subtasks: Vec<IssueDetails>,
    pub linked: Vec<LinkedIssue>,
}

impl TicketContext {
    /// One-line form used to enrich the combine instruction.
    pub fn summary_line(&self) -> String {
        format!("{}: {}", self.issue.key, self.issue.title)
    }
}

pub struct JiraClient {
    base_url: String,
    email: String,
    api_token: String,
    http: reqwest::blocking::Client,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("shipmate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
            http,
        })
    }

    pub fn fetch_ticket(&self, key: &str) -> Result<TicketContext> {
        let main = self.fetch_issue_raw(key)?;
        let issue = issue_details(&main)?;

        let fields = main.get("fields").cloned().unwrap_or(Value::Null);

        let mut subtasks = Vec::new();
        for subtask in fields
            .get("subtasks")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let Some(sub_key) = subtask.get("key").and_then(Value::as_str) else {
                continue;
            };
            subtasks.push(issue_details(&self.fetch_issue_raw(sub_key)?)?);
        }

        let mut linked = Vec::new();
        for link in fields
            .get("issuelinks")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let (direction, other) = if let Some(other) = link.get("outwardIssue") {
                ("outward", other)
            } else if let Some(other) = link.get("inwardIssue") {
                ("inward", other)
            } else {
                continue;
            };
            let Some(other_key) = other.get("key").and_then(Value::as_str) else {
                continue;
            };
            let verb = link
                .get("type")
                .and_then(|t| t.get(direction))
                .and_then(Value::as_str)
                .unwrap_or("relates to");
            linked.push(LinkedIssue {
                relationship: format!("This issue {}", verb),
                issue: issue_details(&self.fetch_issue_raw(other_key)?)?,
            });
        }

        Ok(TicketContext {
            issue,
            subtasks,
            linked,
        })
    }

    fn fetch_issue_raw(&self, key: &str) -> Result<Value> {
        let url = format!("{}/rest/api/3/issue/{}", self.base_url, key);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;

        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(ShipmateError::Jira(format!(
                "HTTP {} for issue {}: {}",
                status.as_u16(),
                key,
                text.trim()
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| ShipmateError::Jira(format!("unparseable response for issue {}: {}", key, e)))
    }
}

fn issue_details(value: &Value) -> Result<IssueDetails> {
    let key = value
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| ShipmateError::Jira("response missing issue key".to_string()))?;
    let fields = value
        .get("fields")
        .ok_or_else(|| ShipmateError::Jira(format!("issue {} missing fields", key)))?;

    let title = fields
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let status = fields
        .get("status")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();

    Ok(IssueDetails {
        key: key.to_string(),
        title,
        status,
        description: flatten_description(fields.get("description")),
    })
}

/// Flatten a description field to plain text. Jira v3 returns the Atlassian
/// document format (nested paragraph/text nodes); older sites return a plain
/// string.
fn flatten_description(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Some(doc) if doc.is_object() => {
            let mut text = String::new();
            for block in doc
                .get("content")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if block.get("type").and_then(Value::as_str) != Some("paragraph") {
                    continue;
                }
                for node in block
                    .get("content")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                {
                    if node.get("type").and_then(Value::as_str) == Some("text") {
                        if let Some(fragment) = node.get("text").and_then(Value::as_str) {
                            text.push_str(fragment);
                            text.push(' ');
                        }
                    }
                }
            }
            let text = text.trim().to_string();
            if text.is_empty() {
                NO_DESCRIPTION.to_string()
            } else {
                text
            }
        }
        _ => NO_DESCRIPTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base_url: String) -> JiraClient {
        JiraClient::new(&JiraConfig {
            base_url,
            email: "dev@corp.example".to_string(),
            api_token: "token".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn flatten_plain_string_description() {
        assert_eq!(
            flatten_description(Some(&json!("already plain"))),
            "already plain"
        );
    }

    #[test]
    fn flatten_rich_text_document() {
        let doc = json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "First part."},
                    {"type": "text", "text": "Second part."}
                ]},
                {"type": "codeBlock", "content": [{"type": "text", "text": "skipped"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "Third."}]}
            ]
        });
        assert_eq!(
            flatten_description(Some(&doc)),
            "First part. Second part. Third."
        );
    }

    #[test]
    fn flatten_missing_description() {
        assert_eq!(flatten_description(None), NO_DESCRIPTION);
        assert_eq!(flatten_description(Some(&Value::Null)), NO_DESCRIPTION);
    }

    #[test]
    fn issue_details_requires_key() {
        assert!(matches!(
            issue_details(&json!({"fields": {}})),
            Err(ShipmateError::Jira(_))
        ));
    }

    #[test]
    fn fetch_ticket_follows_subtasks_and_links() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/rest/api/3/issue/PROJ-1")
            .with_status(200)
            .with_body(
                json!({
                    "key": "PROJ-1",
                    "fields": {
                        "summary": "Build the widget",
                        "status": {"name": "In Progress"},
                        "description": "Make it spin",
                        "subtasks": [{"key": "PROJ-2"}],
                        "issuelinks": [
                            {"type": {"outward": "blocks"}, "outwardIssue": {"key": "PROJ-3"}}
                        ]
                    }
                })
                .to_string(),
            )
            .create();
        server
            .mock("GET", "/rest/api/3/issue/PROJ-2")
            .with_status(200)
            .with_body(
                json!({
                    "key": "PROJ-2",
                    "fields": {"summary": "Subtask", "status": {"name": "To Do"}}
                })
                .to_string(),
            )
            .create();
        server
            .mock("GET", "/rest/api/3/issue/PROJ-3")
            .with_status(200)
            .with_body(
                json!({
                    "key": "PROJ-3",
                    "fields": {"summary": "Downstream", "status": {"name": "To Do"}}
                })
                .to_string(),
            )
            .create();

        let ticket = client(server.url()).fetch_ticket("PROJ-1").unwrap();
        assert_eq!(ticket.issue.key, "PROJ-1");
        assert_eq!(ticket.issue.status, "In Progress");
        assert_eq!(ticket.issue.description, "Make it spin");
        assert_eq!(ticket.subtasks.len(), 1);
        assert_eq!(ticket.subtasks[0].key, "PROJ-2");
        assert_eq!(ticket.linked.len(), 1);
        assert_eq!(ticket.linked[0].relationship, "This issue blocks");
        assert_eq!(ticket.summary_line(), "PROJ-1: Build the widget");
    }

    #[test]
    fn http_error_carries_status() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/rest/api/3/issue/PROJ-404")
            .with_status(404)
            .with_body("{\"errorMessages\": [\"Issue does not exist\"]}")
            .create();

        match client(server.url()).fetch_ticket("PROJ-404") {
            Err(ShipmateError::Jira(msg)) => {
                assert!(msg.contains("404"));
                assert!(msg.contains("PROJ-404"));
            }
            other => panic!("expected Jira error, got {:?}", other.map(|_| ())),
        }
    }
}
