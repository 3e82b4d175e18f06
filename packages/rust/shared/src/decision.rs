//! Decision types produced by the decision engine and persisted with each notice.

use serde::{Deserialize, Serialize};

use crate::error::TenderError;
use crate::types::ExtractedFields;

/// Final pursue/skip state of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionState {
    Recommend,
    Review,
    Skip,
    Unknown,
}

impl DecisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recommend => "RECOMMEND",
            Self::Review => "REVIEW",
            Self::Skip => "SKIP",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Worth a human's attention (RECOMMEND or REVIEW).
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Recommend | Self::Review)
    }
}

impl std::fmt::Display for DecisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionState {
    type Err = TenderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RECOMMEND" => Ok(Self::Recommend),
            "REVIEW" => Ok(Self::Review),
            "SKIP" => Ok(Self::Skip),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(TenderError::validation(format!(
                "unknown decision state: {other}"
            ))),
        }
    }
}

/// Decision state together with its fit score.
///
/// A score exists exactly when the state is not UNKNOWN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Recommend(u8),
    Review(u8),
    Skip(u8),
    Unknown,
}

impl Verdict {
    /// Build a verdict, clamping the score to 0..=100. The score is dropped for UNKNOWN.
    pub fn new(state: DecisionState, score: u32) -> Self {
        let score = score.min(100) as u8;
        match state {
            DecisionState::Recommend => Self::Recommend(score),
            DecisionState::Review => Self::Review(score),
            DecisionState::Skip => Self::Skip(score),
            DecisionState::Unknown => Self::Unknown,
        }
    }

    pub fn state(&self) -> DecisionState {
        match self {
            Self::Recommend(_) => DecisionState::Recommend,
            Self::Review(_) => DecisionState::Review,
            Self::Skip(_) => DecisionState::Skip,
            Self::Unknown => DecisionState::Unknown,
        }
    }

    pub fn fit_score(&self) -> Option<u8> {
        match self {
            Self::Recommend(s) | Self::Review(s) | Self::Skip(s) => Some(*s),
            Self::Unknown => None,
        }
    }
}

/// Strength of one match dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchLevel {
    High,
    Med,
    Low,
    #[default]
    Unknown,
}

impl MatchLevel {
    /// Lenient parse of model output; anything unrecognized is UNKNOWN.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HIGH" | "高" => Self::High,
            "MED" | "MEDIUM" | "中" => Self::Med,
            "LOW" | "低" => Self::Low,
            _ => Self::Unknown,
        }
    }

    /// LOW for any known level, UNKNOWN stays UNKNOWN.
    pub fn demoted(self) -> Self {
        match self {
            Self::Unknown => Self::Unknown,
            _ => Self::Low,
        }
    }
}

/// Result of the input quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityStatus {
    Good,
    Insufficient,
}

/// Which path produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    /// Rule engine shortcut on a clear mismatch.
    Rule,
    /// Validated model response.
    Llm,
    /// Input quality gate rejection.
    QualityGate,
    /// Model response had the wrong shape.
    Fallback,
    /// Completion service unreachable or timed out.
    LlmError,
    /// Model response was not a JSON object.
    LlmParseError,
    /// Unexpected fault inside the engine.
    SystemError,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "RULE",
            Self::Llm => "LLM",
            Self::QualityGate => "QUALITY_GATE",
            Self::Fallback => "FALLBACK",
            Self::LlmError => "LLM_ERROR",
            Self::LlmParseError => "LLM_PARSE_ERROR",
            Self::SystemError => "SYSTEM_ERROR",
        }
    }
}

/// Provenance attached to every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMeta {
    pub decision_source: DecisionSource,
    pub input_quality: QualityStatus,
    /// Absent when the quality gate rejected the notice before scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_score: Option<u32>,
    /// Model consulted, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Failure detail for fallback decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Final, auditable decision for one notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "DecisionRecord", try_from = "DecisionRecord")]
pub struct Decision {
    pub verdict: Verdict,
    pub region_match: MatchLevel,
    pub scope_match: MatchLevel,
    pub scale_match: MatchLevel,
    pub qualification_match: MatchLevel,
    pub summary: String,
    pub reasons: Vec<String>,
    pub risk_flags: Vec<String>,
    pub key_fields: ExtractedFields,
    pub meta: DecisionMeta,
}

impl Decision {
    pub fn state(&self) -> DecisionState {
        self.verdict.state()
    }

    pub fn fit_score(&self) -> Option<u8> {
        self.verdict.fit_score()
    }
}

/// Serialized form of [`Decision`], carrying both `decision_state` and
/// `fit_label`. Deserialization rejects records that disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_state: DecisionState,
    pub fit_label: DecisionState,
    pub fit_score: Option<u8>,
    #[serde(default)]
    pub region_match: MatchLevel,
    #[serde(default)]
    pub scope_match: MatchLevel,
    #[serde(default)]
    pub scale_match: MatchLevel,
    #[serde(default)]
    pub qualification_match: MatchLevel,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub key_fields: ExtractedFields,
    pub meta: DecisionMeta,
}

impl From<Decision> for DecisionRecord {
    fn from(d: Decision) -> Self {
        Self {
            decision_state: d.state(),
            fit_label: d.state(),
            fit_score: d.fit_score(),
            region_match: d.region_match,
            scope_match: d.scope_match,
            scale_match: d.scale_match,
            qualification_match: d.qualification_match,
            summary: d.summary,
            reasons: d.reasons,
            risk_flags: d.risk_flags,
            key_fields: d.key_fields,
            meta: d.meta,
        }
    }
}

impl TryFrom<DecisionRecord> for Decision {
    type Error = TenderError;

    fn try_from(r: DecisionRecord) -> std::result::Result<Self, Self::Error> {
        if r.fit_label != r.decision_state {
            return Err(TenderError::validation(format!(
                "fit_label {} does not match decision_state {}",
                r.fit_label, r.decision_state
            )));
        }
        let verdict = match (r.decision_state, r.fit_score) {
            (DecisionState::Unknown, None) => Verdict::Unknown,
            (DecisionState::Unknown, Some(_)) => {
                return Err(TenderError::validation("UNKNOWN decision carries a fit_score"));
            }
            (state, Some(score)) => Verdict::new(state, u32::from(score)),
            (state, None) => {
                return Err(TenderError::validation(format!(
                    "{state} decision is missing fit_score"
                )));
            }
        };
        Ok(Self {
            verdict,
            region_match: r.region_match,
            scope_match: r.scope_match,
            scale_match: r.scale_match,
            qualification_match: r.qualification_match,
            summary: r.summary,
            reasons: r.reasons,
            risk_flags: r.risk_flags,
            key_fields: r.key_fields,
            meta: r.meta,
        })
    }
}
