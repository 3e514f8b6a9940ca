//! # Moderation
//!
//! Classifier verdicts, the moderation record stored on fragments and
//! replies, and the structured feedback shapes a language-model classifier
//! answers with. The verdict derivation rules live here so every classifier
//! adapter applies the same policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Outcome of an automated review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
    NeedsReview,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsReview => "needs_review",
        }
    }
}

/// Which policy the classifier should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Fragment,
    Reply,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fragment => "fragment",
            Self::Reply => "reply",
        }
    }
}

/// What a classifier returns for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub verdict: Verdict,
    pub feedback: Value,
    pub summary: String,
}

impl ModerationResult {
    pub fn approved() -> Self {
        Self { verdict: Verdict::Approved, feedback: json!({}), summary: String::new() }
    }

    /// The fallback when no verdict could be obtained. Never approves.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            verdict: Verdict::NeedsReview,
            feedback: json!({ "classifierUnavailable": true, "reason": reason }),
            summary: format!("Automated review unavailable: {reason}"),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.feedback.get("classifierUnavailable").and_then(Value::as_bool) == Some(true)
    }
}

/// The moderation annotation persisted on a fragment or reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationRecord {
    pub verdict: Verdict,
    #[serde(default)]
    pub feedback: Value,
    #[serde(default)]
    pub summary: String,
    /// Set when an admin resolved the entity by hand.
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ModerationRecord {
    pub fn approved() -> Self {
        ModerationResult::approved().into()
    }

    /// Flagged for human triage and nobody has looked yet.
    pub fn awaiting_review(&self) -> bool {
        self.verdict == Verdict::NeedsReview && self.reviewed_at.is_none()
    }
}

impl From<ModerationResult> for ModerationRecord {
    fn from(result: ModerationResult) -> Self {
        Self {
            verdict: result.verdict,
            feedback: result.feedback,
            summary: result.summary,
            reviewed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlaggedExamples {
    pub flagged: bool,
    pub examples: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Plagiarism {
    pub similarity_score: f64,
    pub matches: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Misinformation {
    pub flagged: bool,
    pub notes: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarshTone {
    pub flagged: bool,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spam {
    pub flagged: bool,
    pub reason: String,
}

/// Similarity above this sends a fragment to human review.
pub const PLAGIARISM_REVIEW_THRESHOLD: f64 = 0.6;

/// Structured review of a fragment body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentFeedback {
    pub abusive: FlaggedExamples,
    pub plagiarism: Plagiarism,
    pub misinformation: Misinformation,
    pub unethical: FlaggedExamples,
}

impl FragmentFeedback {
    pub fn verdict(&self) -> Verdict {
        if self.abusive.flagged || self.unethical.flagged {
            Verdict::Rejected
        } else if self.plagiarism.similarity_score > PLAGIARISM_REVIEW_THRESHOLD
            || self.misinformation.flagged
        {
            Verdict::NeedsReview
        } else {
            Verdict::Approved
        }
    }
}

/// Structured review of a reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplyFeedback {
    pub abusive: FlaggedExamples,
    pub harsh_tone: HarshTone,
    pub misinformation: Misinformation,
    pub spam: Spam,
    pub unethical: FlaggedExamples,
}

impl ReplyFeedback {
    pub fn verdict(&self) -> Verdict {
        if self.abusive.flagged
            || self.harsh_tone.flagged
            || self.spam.flagged
            || self.unethical.flagged
        {
            Verdict::Rejected
        } else if self.misinformation.flagged {
            Verdict::NeedsReview
        } else {
            Verdict::Approved
        }
    }
}

/// Turns raw classifier JSON into a result for `kind`.
///
/// The object may carry a top-level `summary` string, which is split out.
/// Output that does not parse as the expected shape becomes `NeedsReview`.
pub fn interpret_feedback(raw: &str, kind: ContentKind) -> ModerationResult {
    let mut value: Value = match serde_json::from_str(raw) {
        Ok(v @ Value::Object(_)) => v,
        _ => return ModerationResult::unavailable("classifier returned unparseable feedback"),
    };
    let summary = value
        .as_object_mut()
        .and_then(|o| o.remove("summary"))
        .and_then(|s| s.as_str().map(str::to_owned))
        .unwrap_or_default();

    let verdict = match kind {
        ContentKind::Fragment => serde_json::from_value::<FragmentFeedback>(value.clone())
            .map(|f| f.verdict()),
        ContentKind::Reply => {
            serde_json::from_value::<ReplyFeedback>(value.clone()).map(|f| f.verdict())
        }
    };

    match verdict {
        Ok(verdict) => ModerationResult { verdict, feedback: value, summary },
        Err(_) => ModerationResult::unavailable("classifier feedback has an unexpected shape"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abusive_fragment_is_rejected() {
        let raw = r#"{"abusive":{"flagged":true,"examples":["x"]},"summary":"bad"}"#;
        let result = interpret_feedback(raw, ContentKind::Fragment);
        assert_eq!(result.verdict, Verdict::Rejected);
        assert_eq!(result.summary, "bad");
        assert!(result.feedback.get("summary").is_none());
    }

    #[test]
    fn plagiarism_above_threshold_needs_review() {
        let raw = r#"{"plagiarism":{"similarityScore":0.75}}"#;
        assert_eq!(interpret_feedback(raw, ContentKind::Fragment).verdict, Verdict::NeedsReview);
        let raw = r#"{"plagiarism":{"similarityScore":0.6}}"#;
        assert_eq!(interpret_feedback(raw, ContentKind::Fragment).verdict, Verdict::Approved);
    }

    #[test]
    fn harsh_reply_is_rejected_but_harsh_fragment_field_is_ignored() {
        let raw = r#"{"harshTone":{"flagged":true,"phrases":["ugh"]}}"#;
        assert_eq!(interpret_feedback(raw, ContentKind::Reply).verdict, Verdict::Rejected);
        assert_eq!(interpret_feedback(raw, ContentKind::Fragment).verdict, Verdict::Approved);
    }

    #[test]
    fn garbage_never_approves() {
        let result = interpret_feedback("I think it's fine!", ContentKind::Reply);
        assert_eq!(result.verdict, Verdict::NeedsReview);
        assert!(result.is_fallback());
    }

    #[test]
    fn record_awaits_review_until_stamped() {
        let mut record: ModerationRecord = ModerationResult::unavailable("timeout").into();
        assert!(record.awaiting_review());
        record.reviewed_at = Some(Utc::now());
        assert!(!record.awaiting_review());
    }
}
