//! Commit-message synthesis.
//!
//! Delegates to an external text-generation service over HTTP: one request
//! per diff artifact with a kind-specific instruction, then one combine
//! request folding the per-file summaries into a single message. Per-file
//! failures are recoverable (the caller skips the file); a combine failure is
//! fatal to message generation and surfaces as its own error variant.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::LlmConfig;
use crate::error::{Result, ShipmateError};
use crate::git::{DiffArtifact, DiffKind};

/// Separator between per-file summaries in the combine payload.
const SUMMARY_SEPARATOR: &str = "\n-------------\n";

const COMBINE_INSTRUCTION: &str = "You will be given a list of commit messages. \
    Combine them into a cohesive and easy to understand commit message and \
    return just the commit message without any preamble or other text.";

/// A synthesized commit message. `title` is the first line; `body` is the
/// full message text (title line included), used verbatim as the commit
/// message and pull-request description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    pub title: String,
    pub body: String,
}

impl CommitMessage {
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let title = trimmed
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string();
        Self {
            title,
            body: trimmed.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

pub struct Synthesizer {
    endpoint: String,
    token: Option<String>,
    http: reqwest::blocking::Client,
}

impl Synthesizer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("shipmate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            http,
        })
    }

    /// Summarize one diff artifact. Failure here is recoverable: the caller
    /// skips the file with a warning.
    pub fn summarize_file(&self, artifact: &DiffArtifact) -> Result<String> {
        let instruction = file_instruction(artifact);
        self.request(&artifact.render(), &instruction)
            .map(|raw| extract_response(&raw))
            .map_err(ShipmateError::Synthesis)
    }

    /// Fold the per-file summaries into one commit message. Failure here is
    /// fatal to message generation.
    pub fn summarize_all(
        &self,
        summaries: &[String],
        ticket_context: Option<&str>,
    ) -> Result<CommitMessage> {
        if summaries.is_empty() {
            return Err(ShipmateError::CombineFailed(
                "no per-file summaries were produced".to_string(),
            ));
        }
        let combined = summaries.join(SUMMARY_SEPARATOR);
        let mut instruction = COMBINE_INSTRUCTION.to_string();
        if let Some(context) = ticket_context {
            instruction.push_str(" The work belongs to this ticket: ");
            instruction.push_str(context);
            instruction.push('.');
        }
        let raw = self
            .request(&combined, &instruction)
            .map_err(ShipmateError::CombineFailed)?;
        Ok(CommitMessage::from_text(&extract_response(&raw)))
    }

    /// One blocking POST. Returns plain error text so each caller can wrap it
    /// in the severity appropriate to its stage.
    fn request(&self, user_query: &str, instruction: &str) -> std::result::Result<String, String> {
        let mut request = self.http.post(&self.endpoint).json(&json!({
            "user_query": user_query,
            "system_prompt": instruction,
        }));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.as_str())]);
        }
        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status();
        let text = response.text().map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status.as_u16(), text.trim()));
        }
        Ok(text)
    }
}

fn file_instruction(artifact: &DiffArtifact) -> String {
    match artifact.kind() {
        DiffKind::New => format!(
            "Generate a succinct commit message from the text you are provided. \
             The commit message should include the file name '{}' and describe \
             what this new file does.",
            artifact.path
        ),
        DiffKind::Deleted => format!(
            "Generate a succinct commit message for the deleted file '{}'. \
             Mention that the file has been deleted and briefly describe its \
             purpose if possible.",
            artifact.path
        ),
        DiffKind::Modified => format!(
            "You will be provided with the original and modified content of a \
             file. Create a commit message that includes the file name '{}' \
             and describes the changes made to this file.",
            artifact.path
        ),
    }
}

/// The service returns free text or JSON-wrapped free text
/// (`{"response": "..."}`); accept both.
pub(crate) fn extract_response(raw: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        if let Some(response) = value.get("response").and_then(|v| v.as_str()) {
            return response.trim().trim_matches('"').to_string();
        }
    }
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn artifact(path: &str, before: Option<&str>, after: Option<&str>) -> DiffArtifact {
        DiffArtifact {
            path: path.to_string(),
            before: before.map(String::from),
            after: after.map(String::from),
        }
    }

    fn synthesizer(endpoint: String, token: Option<&str>) -> Synthesizer {
        Synthesizer::new(&LlmConfig {
            endpoint,
            token: token.map(String::from),
        })
        .unwrap()
    }

    #[test]
    fn commit_message_from_text_splits_title() {
        let message = CommitMessage::from_text("Add parser\n\nDetails about the parser.\n");
        assert_eq!(message.title, "Add parser");
        assert_eq!(message.body, "Add parser\n\nDetails about the parser.");
    }

    #[test]
    fn commit_message_json_round_trip_is_exact() {
        let message = CommitMessage {
            title: "Fix \"edge\" case".to_string(),
            body: "Fix \"edge\" case\n\nMultiline\nbody".to_string(),
        };
        let encoded = message.to_json().unwrap();
        let decoded = CommitMessage::from_json(&encoded).unwrap();
        assert_eq!(decoded.title, message.title);
        assert_eq!(decoded.body, message.body);
        // byte-for-byte through a second encode
        assert_eq!(decoded.to_json().unwrap(), encoded);
    }

    #[test]
    fn extract_response_unwraps_json() {
        assert_eq!(
            extract_response("{\"response\": \"Update the parser\"}"),
            "Update the parser"
        );
        assert_eq!(extract_response("plain text message\n"), "plain text message");
        // JSON without the expected field falls back to the raw text
        assert_eq!(extract_response("{\"other\": 1}"), "{\"other\": 1}");
    }

    #[test]
    fn instruction_varies_by_kind() {
        let new = file_instruction(&artifact("a.rs", None, Some("x")));
        let deleted = file_instruction(&artifact("a.rs", Some("x"), None));
        let modified = file_instruction(&artifact("a.rs", Some("x"), Some("y")));
        assert!(new.contains("new file"));
        assert!(deleted.contains("deleted"));
        assert!(modified.contains("original and modified"));
        assert!(modified.contains("'a.rs'"));
    }

    #[test]
    fn summarize_file_posts_and_returns_text() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat")
            .match_body(Matcher::PartialJsonString(
                "{\"user_query\": \"===== NEW FILE =====\\n\\nfn main() {}\"}".to_string(),
            ))
            .with_status(200)
            .with_body("Add main.rs with the program entry point")
            .create();

        let synth = synthesizer(format!("{}/chat", server.url()), None);
        let summary = synth
            .summarize_file(&artifact("main.rs", None, Some("fn main() {}")))
            .unwrap();
        assert_eq!(summary, "Add main.rs with the program entry point");
        mock.assert();
    }

    #[test]
    fn summarize_file_sends_token_query_param() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat")
            .match_query(Matcher::UrlEncoded("token".to_string(), "sekrit".to_string()))
            .with_status(200)
            .with_body("ok")
            .create();

        let synth = synthesizer(format!("{}/chat", server.url()), Some("sekrit"));
        synth
            .summarize_file(&artifact("a.rs", Some("x"), Some("y")))
            .unwrap();
        mock.assert();
    }

    #[test]
    fn summarize_file_failure_is_recoverable_variant() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat")
            .with_status(503)
            .with_body("overloaded")
            .create();

        let synth = synthesizer(format!("{}/chat", server.url()), None);
        match synth.summarize_file(&artifact("a.rs", Some("x"), Some("y"))) {
            Err(ShipmateError::Synthesis(msg)) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("overloaded"));
            }
            other => panic!("expected Synthesis error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn summarize_all_folds_and_parses_json_wrapped_reply() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body("{\"response\": \"Add parser and tests\\n\\nDetails here.\"}")
            .create();

        let synth = synthesizer(format!("{}/chat", server.url()), None);
        let message = synth
            .summarize_all(
                &["Add parser".to_string(), "Add tests".to_string()],
                Some("PROJ-1: parser work"),
            )
            .unwrap();
        assert_eq!(message.title, "Add parser and tests");
        assert_eq!(message.body, "Add parser and tests\n\nDetails here.");
        mock.assert();
    }

    #[test]
    fn combine_failure_is_fatal_variant() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat")
            .with_status(500)
            .with_body("boom")
            .create();

        let synth = synthesizer(format!("{}/chat", server.url()), None);
        match synth.summarize_all(&["one".to_string()], None) {
            Err(ShipmateError::CombineFailed(msg)) => assert!(msg.contains("500")),
            other => panic!("expected CombineFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn combine_with_no_summaries_is_fatal() {
        let server = mockito::Server::new();
        let synth = synthesizer(format!("{}/chat", server.url()), None);
        assert!(matches!(
            synth.summarize_all(&[], None),
            Err(ShipmateError::CombineFailed(_))
        ));
    }
}
