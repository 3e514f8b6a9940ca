//! # Keyword classifier
//!
//! A local stand-in for the remote classifier. Text containing a blocked
//! term is rejected as abusive; text containing a review term is flagged
//! as possible misinformation. Everything else passes.
//!
//! The feedback it produces has the same shape the remote classifier
//! returns, so verdicts are derived by the same rules.

use async_trait::async_trait;
use domains::moderation::interpret_feedback;
use domains::{ContentKind, ModerationClassifier, ModerationResult, Result};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    blocked: Vec<String>,
    review: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { blocked: normalize(blocked), review: Vec::new() }
    }

    pub fn with_review_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.review = normalize(terms);
        self
    }

    fn hits<'a>(terms: &'a [String], text: &str) -> Vec<&'a str> {
        terms.iter().filter(|t| text.contains(t.as_str())).map(String::as_str).collect()
    }
}

fn normalize<I, S>(terms: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[async_trait]
impl ModerationClassifier for KeywordClassifier {
    async fn review(&self, text: &str, kind: ContentKind) -> Result<ModerationResult> {
        let text = text.to_lowercase();
        let abusive = Self::hits(&self.blocked, &text);
        let doubtful = Self::hits(&self.review, &text);

        let summary = match (abusive.is_empty(), doubtful.is_empty()) {
            (true, true) => "No issues found.".to_string(),
            (false, _) => format!("Blocked terms: {}", abusive.join(", ")),
            (true, false) => format!("Needs a second look: {}", doubtful.join(", ")),
        };
        let raw = json!({
            "abusive": { "flagged": !abusive.is_empty(), "examples": abusive },
            "misinformation": { "flagged": !doubtful.is_empty(), "notes": doubtful.join(", ") },
            "summary": summary,
        });

        let result = interpret_feedback(&raw.to_string(), kind);
        debug!(kind = kind.as_str(), verdict = result.verdict.as_str(), "keyword review");
        Ok(result)
    }
}
