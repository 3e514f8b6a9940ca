//! # HTTP classifier
//!
//! Sends text to a chat-completions endpoint with a moderation prompt and
//! reads the JSON object it answers with. Any transport, status or shape
//! problem comes back as `ClassifierUnavailable`; the caller decides what
//! that means for the content.

use std::time::Duration;

use async_trait::async_trait;
use domains::moderation::interpret_feedback;
use domains::{ContentKind, DomainError, ModerationClassifier, ModerationResult, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const FRAGMENT_PROMPT: &str = "You review long-form technical posts before publication. \
Answer with one JSON object and nothing else, using exactly these keys: \
abusive {flagged, examples, suggestions}, plagiarism {similarityScore (0..1), matches, suggestions}, \
misinformation {flagged, notes, suggestions}, unethical {flagged, examples, suggestions}, \
and summary (one sentence for the author).";

const REPLY_PROMPT: &str = "You review short replies in a discussion thread. \
Answer with one JSON object and nothing else, using exactly these keys: \
abusive {flagged, examples, suggestions}, harshTone {flagged, phrases}, \
misinformation {flagged, notes, suggestions}, spam {flagged, reason}, \
unethical {flagged, examples, suggestions}, and summary (one sentence for the author).";

#[derive(Debug, Clone)]
pub struct HttpClassifierConfig {
    /// Full URL of the chat-completions endpoint
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
    pub connect_timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

pub struct HttpModerationClassifier {
    client: reqwest::Client,
    config: HttpClassifierConfig,
}

impl HttpModerationClassifier {
    pub fn new(config: HttpClassifierConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().connect_timeout(config.connect_timeout).build()?;
        Ok(Self { client, config })
    }

    fn prompt(kind: ContentKind) -> &'static str {
        match kind {
            ContentKind::Fragment => FRAGMENT_PROMPT,
            ContentKind::Reply => REPLY_PROMPT,
        }
    }
}

fn unavailable(err: impl std::fmt::Display) -> DomainError {
    DomainError::ClassifierUnavailable(err.to_string())
}

#[async_trait]
impl ModerationClassifier for HttpModerationClassifier {
    async fn review(&self, text: &str, kind: ContentKind) -> Result<ModerationResult> {
        let body = ChatRequest {
            model: &self.config.model,
            temperature: 0.0,
            messages: [
                ChatMessage { role: "system", content: Self::prompt(kind) },
                ChatMessage { role: "user", content: text },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, kind = kind.as_str(), "classifier endpoint refused the request");
            return Err(unavailable(format!("classifier answered {status}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(unavailable)?;
        let raw = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| unavailable("classifier answered without content"))?;

        let result = interpret_feedback(raw.trim(), kind);
        debug!(kind = kind.as_str(), verdict = result.verdict.as_str(), "remote review");
        Ok(result)
    }
}
