//! Decision engine.
//!
//! Combines the quality gate, the rule scorer and (conditionally) the
//! completion service into one final decision per notice:
//!
//! - INSUFFICIENT input ends as UNKNOWN without scoring or a model call
//! - a clear rule mismatch ends as SKIP without a model call
//! - otherwise the model is consulted and its answer validated and corrected
//!
//! Every failure on the model path degrades to a REVIEW decision tagged with
//! its source. Panics inside the engine become SYSTEM_ERROR decisions.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use tenderwatch_shared::{
    AppConfig, Decision, DecisionError, DecisionMeta, DecisionSource, DecisionState,
    ExtractedFields, MatchLevel, ProfileConfig, QualityStatus, Result, Verdict,
};

use crate::completion::CompletionService;
use crate::prompt::{PromptInput, build_prompt, truncate_chars};
use crate::quality::{QualityAssessment, QualityGate};
use crate::scoring::{RuleScoreResult, RuleScorer};

/// Score given to REVIEW fallbacks.
const FALLBACK_SCORE: u32 = 50;
/// Ceiling for SKIP decisions produced from a rule mismatch.
const MISMATCH_CAP: u32 = 30;
/// Scores at or above this need a confident summary.
const CONFIDENT_SCORE: u32 = 80;
const INSUFFICIENT_CAP: u32 = 60;
const INSUFFICIENT_PENALTY: u32 = 20;
const SUMMARY_MAX_CHARS: usize = 300;

/// Label values the model uses to say it cannot judge.
const UNKNOWN_SYNONYMS: &[&str] = &["", "UNKNOWN", "N/A", "NA", "NONE", "NULL", "未知", "不确定"];

/// One notice as seen by the engine.
#[derive(Debug, Clone, Copy)]
pub struct NoticeInput<'a> {
    pub title: &'a str,
    pub text: &'a str,
    pub fields: &'a ExtractedFields,
}

/// Validated model answer, before consistency corrections.
#[derive(Debug, Clone, PartialEq)]
struct ModelAnswer {
    label: DecisionState,
    score: Option<u32>,
    region_match: MatchLevel,
    scope_match: MatchLevel,
    scale_match: MatchLevel,
    qualification_match: MatchLevel,
    summary: String,
    reasons: Vec<String>,
    risk_flags: Vec<String>,
    key_fields: ExtractedFields,
}

/// Produces one auditable decision per notice.
pub struct DecisionEngine {
    gate: QualityGate,
    scorer: RuleScorer,
    profile: ProfileConfig,
    completion: Arc<dyn CompletionService>,
    shortcut_mismatch: bool,
    insufficient_indicators: Vec<String>,
    max_prompt_chars: usize,
}

impl DecisionEngine {
    pub fn new(config: &AppConfig, completion: Arc<dyn CompletionService>) -> Result<Self> {
        Ok(Self {
            gate: QualityGate::new(&config.quality)?,
            scorer: RuleScorer::new(&config.profile),
            profile: config.profile.clone(),
            completion,
            shortcut_mismatch: config.decision.shortcut_mismatch,
            insufficient_indicators: config
                .decision
                .insufficient_indicators
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            max_prompt_chars: config.completion.max_prompt_chars,
        })
    }

    /// Decide one notice. Never fails; faults become SYSTEM_ERROR decisions.
    #[instrument(skip_all, fields(title = %input.title))]
    pub async fn decide(&self, input: &NoticeInput<'_>) -> Decision {
        let assessment = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.gate.assess(input.title, input.text, input.fields)
        })) {
            Ok(assessment) => assessment,
            Err(panic) => {
                return system_error(input, QualityStatus::Insufficient, &panic_message(&*panic));
            }
        };

        match AssertUnwindSafe(self.evaluate(input, &assessment))
            .catch_unwind()
            .await
        {
            Ok(decision) => decision,
            Err(panic) => system_error(input, assessment.status, &panic_message(&*panic)),
        }
    }

    async fn evaluate(&self, input: &NoticeInput<'_>, assessment: &QualityAssessment) -> Decision {
        if !assessment.is_good() {
            info!(reasons = ?assessment.reasons, "input quality insufficient");
            return finalize(quality_rejection(input, assessment));
        }

        let rule = self.scorer.score(input.text, input.fields);
        info!(
            rule_score = rule.score,
            mismatched = rule.is_clearly_mismatched(),
            "rule score computed"
        );

        if self.shortcut_mismatch && rule.is_clearly_mismatched() {
            return finalize(rule_mismatch(input, &rule));
        }

        let decision = match self.consult(input, &rule).await {
            Ok(answer) => self.apply_corrections(answer, &rule),
            Err(err) => self.fallback(input, &rule, &err),
        };
        finalize(decision)
    }

    /// Call the model and validate its answer.
    async fn consult(
        &self,
        input: &NoticeInput<'_>,
        rule: &RuleScoreResult,
    ) -> std::result::Result<ModelAnswer, DecisionError> {
        let prompt = build_prompt(&PromptInput {
            profile: &self.profile,
            rule,
            title: input.title,
            text: input.text,
            fields: input.fields,
            max_text_chars: self.max_prompt_chars,
        });

        debug!(model = self.completion.model(), "completion called");
        let raw = self.completion.complete(&prompt).await?;
        let object = parse_response(&raw)?;
        coerce_answer(&object, input.fields)
    }

    fn apply_corrections(&self, mut answer: ModelAnswer, rule: &RuleScoreResult) -> Decision {
        if rule.is_clearly_mismatched() && answer.label == DecisionState::Recommend {
            let capped = answer.score.unwrap_or(MISMATCH_CAP).min(MISMATCH_CAP);
            info!(from = answer.score, to = capped, "correction applied: rule mismatch overrides RECOMMEND");
            answer.label = DecisionState::Skip;
            answer.score = Some(capped);
            answer
                .reasons
                .push("rule engine judged a clear mismatch; model recommendation overridden".into());
        }

        if let Some(score) = answer.score {
            if score >= CONFIDENT_SCORE && self.summary_admits_insufficiency(&answer.summary) {
                let lowered = INSUFFICIENT_CAP.min(score.saturating_sub(INSUFFICIENT_PENALTY));
                info!(from = score, to = lowered, "correction applied: confident score with insufficient information");
                answer.label = DecisionState::Review;
                answer.score = Some(lowered);
                answer
                    .risk_flags
                    .push("model reported insufficient information".into());
            }
        }

        Decision {
            verdict: Verdict::new(answer.label, answer.score.unwrap_or(0)),
            region_match: answer.region_match,
            scope_match: answer.scope_match,
            scale_match: answer.scale_match,
            qualification_match: answer.qualification_match,
            summary: answer.summary,
            reasons: answer.reasons,
            risk_flags: answer.risk_flags,
            key_fields: answer.key_fields,
            meta: DecisionMeta {
                decision_source: DecisionSource::Llm,
                input_quality: QualityStatus::Good,
                rule_score: Some(rule.score),
                model: Some(self.completion.model().to_string()),
                diagnostic: None,
            },
        }
    }

    fn summary_admits_insufficiency(&self, summary: &str) -> bool {
        let summary = summary.to_lowercase();
        self.insufficient_indicators
            .iter()
            .any(|indicator| summary.contains(indicator.as_str()))
    }

    fn fallback(&self, input: &NoticeInput<'_>, rule: &RuleScoreResult, err: &DecisionError) -> Decision {
        let source = match err {
            DecisionError::Completion(_) => DecisionSource::LlmError,
            DecisionError::ResponseParse(_) => DecisionSource::LlmParseError,
            DecisionError::Validation(_) => DecisionSource::Fallback,
        };
        warn!(source = source.as_str(), error = %err, "model analysis failed, falling back to REVIEW");

        Decision {
            verdict: Verdict::new(DecisionState::Review, FALLBACK_SCORE),
            region_match: rule.breakdown.region.level,
            scope_match: rule.breakdown.scope.level,
            scale_match: rule.breakdown.scale.level,
            qualification_match: rule.breakdown.qualification.level,
            summary: format!(
                "model analysis unavailable ({err}); rule score {}/100, manual review required",
                rule.score
            ),
            reasons: rule.reasons.clone(),
            risk_flags: rule.risk_flags.clone(),
            key_fields: input.fields.clone(),
            meta: DecisionMeta {
                decision_source: source,
                input_quality: QualityStatus::Good,
                rule_score: Some(rule.score),
                model: Some(self.completion.model().to_string()),
                diagnostic: Some(err.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Terminal decisions
// ---------------------------------------------------------------------------

fn quality_rejection(input: &NoticeInput<'_>, assessment: &QualityAssessment) -> Decision {
    Decision {
        verdict: Verdict::Unknown,
        region_match: MatchLevel::Unknown,
        scope_match: MatchLevel::Unknown,
        scale_match: MatchLevel::Unknown,
        qualification_match: MatchLevel::Unknown,
        summary: format!(
            "input information insufficient ({} chars, {} key signals); not analyzed",
            assessment.text_len,
            assessment.signal_count()
        ),
        reasons: assessment.reasons.clone(),
        risk_flags: vec!["input information insufficient".into()],
        key_fields: input.fields.clone(),
        meta: DecisionMeta {
            decision_source: DecisionSource::QualityGate,
            input_quality: QualityStatus::Insufficient,
            rule_score: None,
            model: None,
            diagnostic: None,
        },
    }
}

fn rule_mismatch(input: &NoticeInput<'_>, rule: &RuleScoreResult) -> Decision {
    Decision {
        verdict: Verdict::new(DecisionState::Skip, rule.score.min(MISMATCH_CAP)),
        region_match: rule.breakdown.region.level.demoted(),
        scope_match: rule.breakdown.scope.level.demoted(),
        scale_match: rule.breakdown.scale.level.demoted(),
        qualification_match: rule.breakdown.qualification.level.demoted(),
        summary: format!("rule engine judged a clear mismatch (score {}/100)", rule.score),
        reasons: rule.reasons.clone(),
        risk_flags: rule.risk_flags.clone(),
        key_fields: input.fields.clone(),
        meta: DecisionMeta {
            decision_source: DecisionSource::Rule,
            input_quality: QualityStatus::Good,
            rule_score: Some(rule.score),
            model: None,
            diagnostic: None,
        },
    }
}

fn system_error(input: &NoticeInput<'_>, quality: QualityStatus, message: &str) -> Decision {
    error!(error = message, "decision engine fault");
    finalize(Decision {
        verdict: Verdict::new(DecisionState::Review, FALLBACK_SCORE),
        region_match: MatchLevel::Unknown,
        scope_match: MatchLevel::Unknown,
        scale_match: MatchLevel::Unknown,
        qualification_match: MatchLevel::Unknown,
        summary: "internal error during analysis; manual review required".into(),
        reasons: vec!["system error, manual review required".into()],
        risk_flags: vec!["analysis pipeline fault".into()],
        key_fields: input.fields.clone(),
        meta: DecisionMeta {
            decision_source: DecisionSource::SystemError,
            input_quality: quality,
            rule_score: None,
            model: None,
            diagnostic: Some(message.to_string()),
        },
    })
}

fn finalize(decision: Decision) -> Decision {
    info!(
        state = decision.state().as_str(),
        fit_score = decision.fit_score(),
        source = decision.meta.decision_source.as_str(),
        "decision finalized"
    );
    decision
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Response parsing and validation
// ---------------------------------------------------------------------------

/// Parse model output into a JSON object, tolerating code fences and
/// surrounding prose.
fn parse_response(raw: &str) -> std::result::Result<Map<String, Value>, DecisionError> {
    let trimmed = strip_code_fence(raw.trim());

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(object);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(object);
            }
        }
    }

    Err(DecisionError::ResponseParse(format!(
        "no JSON object in model output: {:?}",
        truncate_chars(raw, 200)
    )))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn coerce_answer(
    object: &Map<String, Value>,
    extracted: &ExtractedFields,
) -> std::result::Result<ModelAnswer, DecisionError> {
    let label = match (object.get("fit_label"), object.get("decision_state")) {
        (Some(label), _) if !label.is_null() => normalize_label(label, "fit_label")?,
        (_, Some(state)) if !state.is_null() => normalize_label(state, "decision_state")?,
        _ => {
            return Err(DecisionError::Validation(
                "response has neither fit_label nor decision_state".into(),
            ));
        }
    };

    let score = match object.get("fit_score") {
        None | Some(Value::Null) => None,
        Some(value) => Some(coerce_score(value)?),
    };
    if score.is_none() && label != DecisionState::Unknown {
        return Err(DecisionError::Validation(format!(
            "fit_score missing for {label} decision"
        )));
    }

    let summary = match object.get("summary") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => truncate_chars(s.trim(), SUMMARY_MAX_CHARS).to_string(),
        Some(other) => {
            return Err(DecisionError::Validation(format!(
                "summary must be a string, got {other}"
            )));
        }
    };

    Ok(ModelAnswer {
        label,
        score,
        region_match: match_level(object, "region_match"),
        scope_match: match_level(object, "scope_match"),
        scale_match: match_level(object, "scale_match"),
        qualification_match: match_level(object, "qualification_match"),
        summary,
        reasons: string_list(object, "reasons")?,
        risk_flags: string_list(object, "risk_flags")?,
        key_fields: merge_key_fields(object.get("key_fields"), extracted),
    })
}

fn normalize_label(value: &Value, field: &str) -> std::result::Result<DecisionState, DecisionError> {
    let Value::String(raw) = value else {
        return Err(DecisionError::Validation(format!(
            "{field} must be a string, got {value}"
        )));
    };
    let upper = raw.trim().to_uppercase();
    if UNKNOWN_SYNONYMS.contains(&upper.as_str()) {
        return Ok(DecisionState::Unknown);
    }
    match upper.parse::<DecisionState>() {
        Ok(state) => Ok(state),
        Err(_) => {
            warn!(field, label = %raw, "unrecognized label, treating as REVIEW");
            Ok(DecisionState::Review)
        }
    }
}

fn coerce_score(value: &Value) -> std::result::Result<u32, DecisionError> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(n.round().clamp(0.0, 100.0) as u32),
        _ => Err(DecisionError::Validation(format!(
            "fit_score is not numeric: {value}"
        ))),
    }
}

fn match_level(object: &Map<String, Value>, field: &str) -> MatchLevel {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(MatchLevel::parse_lenient)
        .unwrap_or_default()
}

fn string_list(object: &Map<String, Value>, field: &str) -> std::result::Result<Vec<String>, DecisionError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.trim().to_string()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(DecisionError::Validation(format!(
                    "{field} must contain strings, got {other}"
                ))),
            })
            .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
            .collect(),
        Some(other) => Err(DecisionError::Validation(format!(
            "{field} must be a list, got {other}"
        ))),
    }
}

/// Model key fields where present, extracted fields otherwise.
fn merge_key_fields(value: Option<&Value>, extracted: &ExtractedFields) -> ExtractedFields {
    let from_model = value
        .cloned()
        .and_then(|v| serde_json::from_value::<ExtractedFields>(v).ok())
        .unwrap_or_default();
    let pick = |model: String, fallback: &String| {
        if model.trim().is_empty() {
            fallback.clone()
        } else {
            model.trim().to_string()
        }
    };
    ExtractedFields {
        location: pick(from_model.location, &extracted.location),
        scope: pick(from_model.scope, &extracted.scope),
        deadline: pick(from_model.deadline, &extracted.deadline),
        tonnage: pick(from_model.tonnage, &extracted.tonnage),
        qualification: pick(from_model.qualification, &extracted.qualification),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tenderwatch_shared::CompletionError;

    enum Reply {
        Text(String),
        Fail(CompletionError),
        Panic,
    }

    struct FakeCompletion {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl FakeCompletion {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }

        fn json(value: Value) -> Arc<Self> {
            Self::new(Reply::Text(value.to_string()))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionService for FakeCompletion {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail(err) => Err(err.clone()),
                Reply::Panic => panic!("model client blew up"),
            }
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    fn engine(completion: Arc<FakeCompletion>) -> DecisionEngine {
        DecisionEngine::new(&AppConfig::default(), completion).unwrap()
    }

    fn padded(body: &str) -> String {
        let mut text = body.to_string();
        while text.chars().count() < 400 {
            text.push('。');
        }
        text
    }

    /// Strong match in every factor.
    fn matching_text() -> String {
        padded(
            "项目地点：四川省成都市。钢结构厂房制作安装，用钢量约1000吨。\
             投标截止时间：2025-03-01 09:00。资质要求：钢结构工程专业承包二级，安全生产许可证。",
        )
    }

    async fn decide(engine: &DecisionEngine, title: &str, text: &str) -> Decision {
        let fields = ExtractedFields::default();
        let input = NoticeInput {
            title,
            text,
            fields: &fields,
        };
        engine.decide(&input).await
    }

    fn recommend(score: u32, summary: &str) -> Value {
        serde_json::json!({
            "decision_state": "RECOMMEND",
            "fit_label": "RECOMMEND",
            "fit_score": score,
            "region_match": "HIGH",
            "scope_match": "HIGH",
            "scale_match": "MED",
            "qualification_match": "HIGH",
            "summary": summary,
            "reasons": ["region and scope match"],
            "risk_flags": [],
            "key_fields": {"location": "成都市"}
        })
    }

    #[tokio::test]
    async fn insufficient_input_is_unknown_without_model_call() {
        let fake = FakeCompletion::json(recommend(90, "good"));
        let text = "公告".to_string() + &"。".repeat(248);
        let decision = decide(&engine(fake.clone()), "公告", &text).await;

        assert_eq!(decision.state(), DecisionState::Unknown);
        assert_eq!(decision.fit_score(), None);
        assert_eq!(decision.meta.decision_source, DecisionSource::QualityGate);
        assert_eq!(decision.meta.input_quality, QualityStatus::Insufficient);
        assert_eq!(decision.meta.rule_score, None);
        assert!(decision.reasons.iter().any(|r| r.contains("250")));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn clear_mismatch_skips_without_model_call() {
        let fake = FakeCompletion::json(recommend(90, "good"));
        let text = padded("项目地点：黑龙江省哈尔滨市。投标截止时间：2025-03-01。");
        let decision = decide(&engine(fake.clone()), "办公楼装修", &text).await;

        assert_eq!(decision.state(), DecisionState::Skip);
        assert!(decision.fit_score().unwrap() <= 30);
        assert_eq!(decision.meta.decision_source, DecisionSource::Rule);
        assert!(decision.risk_flags.iter().any(|f| f == crate::scoring::REGION_FLAG));
        assert!(
            [decision.region_match, decision.scope_match, decision.scale_match, decision.qualification_match]
                .iter()
                .all(|level| matches!(level, MatchLevel::Low | MatchLevel::Unknown))
        );
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn confident_score_with_insufficient_summary_is_reviewed() {
        let fake = FakeCompletion::json(recommend(95, "information insufficient to confirm scope"));
        let decision = decide(&engine(fake.clone()), "成都钢结构厂房", &matching_text()).await;

        assert_eq!(decision.state(), DecisionState::Review);
        assert_eq!(decision.fit_score(), Some(60));
        assert_eq!(decision.meta.decision_source, DecisionSource::Llm);
        assert_eq!(decision.meta.model.as_deref(), Some("fake-model"));
        assert!(decision.meta.rule_score.unwrap() >= 80);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn validated_answer_is_kept() {
        let fake = FakeCompletion::json(recommend(88, "strong fit for the fabricator"));
        let decision = decide(&engine(fake), "成都钢结构厂房", &matching_text()).await;

        assert_eq!(decision.verdict, Verdict::Recommend(88));
        assert_eq!(decision.region_match, MatchLevel::High);
        assert_eq!(decision.key_fields.location, "成都市");
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["fit_label"], json["decision_state"]);
    }

    #[tokio::test]
    async fn completion_timeout_falls_back_to_review() {
        let fake = FakeCompletion::new(Reply::Fail(CompletionError::Timeout(60)));
        let decision = decide(&engine(fake), "成都钢结构厂房", &matching_text()).await;

        assert_eq!(decision.state(), DecisionState::Review);
        assert_eq!(decision.fit_score(), Some(50));
        assert_eq!(decision.meta.decision_source, DecisionSource::LlmError);
        assert!(decision.meta.diagnostic.unwrap().contains("timed out"));
        assert!(!decision.reasons.is_empty());
    }

    #[tokio::test]
    async fn prose_output_is_parse_error() {
        let fake = FakeCompletion::new(Reply::Text("I think this tender looks fine.".into()));
        let decision = decide(&engine(fake), "成都钢结构厂房", &matching_text()).await;

        assert_eq!(decision.state(), DecisionState::Review);
        assert_eq!(decision.meta.decision_source, DecisionSource::LlmParseError);
    }

    #[tokio::test]
    async fn missing_score_is_validation_fallback() {
        let mut answer = recommend(90, "good");
        answer["fit_score"] = Value::Null;
        let decision = decide(&engine(FakeCompletion::json(answer)), "成都钢结构厂房", &matching_text()).await;

        assert_eq!(decision.verdict, Verdict::Review(50));
        assert_eq!(decision.meta.decision_source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn panic_becomes_system_error() {
        let fake = FakeCompletion::new(Reply::Panic);
        let decision = decide(&engine(fake), "成都钢结构厂房", &matching_text()).await;

        assert_eq!(decision.state(), DecisionState::Review);
        assert_eq!(decision.meta.decision_source, DecisionSource::SystemError);
        assert!(decision.meta.diagnostic.unwrap().contains("blew up"));
    }

    #[tokio::test]
    async fn mismatch_override_applies_without_shortcut() {
        let mut config = AppConfig::default();
        config.decision.shortcut_mismatch = false;
        let fake = FakeCompletion::json(recommend(90, "looks promising"));
        let engine = DecisionEngine::new(&config, fake.clone()).unwrap();

        let text = padded("项目地点：黑龙江省哈尔滨市。投标截止时间：2025-03-01。");
        let decision = decide(&engine, "办公楼装修", &text).await;

        assert_eq!(decision.state(), DecisionState::Skip);
        assert_eq!(decision.fit_score(), Some(30));
        assert_eq!(fake.calls(), 1);
    }

    #[test]
    fn parse_tolerates_fences_and_prose() {
        let fenced = "```json\n{\"fit_label\": \"SKIP\"}\n```";
        assert_eq!(parse_response(fenced).unwrap()["fit_label"], "SKIP");

        let wrapped = "Here is my answer: {\"fit_label\": \"REVIEW\"} hope it helps";
        assert_eq!(parse_response(wrapped).unwrap()["fit_label"], "REVIEW");

        assert!(matches!(
            parse_response("[1, 2, 3]"),
            Err(DecisionError::ResponseParse(_))
        ));
    }

    #[test]
    fn labels_are_normalized() {
        let fields = ExtractedFields::default();
        let coerce = |value: Value| coerce_answer(value.as_object().unwrap(), &fields);

        let blank = coerce(serde_json::json!({"fit_label": " ", "fit_score": 40})).unwrap();
        assert_eq!(blank.label, DecisionState::Unknown);

        let odd = coerce(serde_json::json!({"fit_label": "MAYBE", "fit_score": 40})).unwrap();
        assert_eq!(odd.label, DecisionState::Review);

        let state_only = coerce(serde_json::json!({"decision_state": "skip", "fit_score": "12"})).unwrap();
        assert_eq!(state_only.label, DecisionState::Skip);
        assert_eq!(state_only.score, Some(12));

        let clamped = coerce(serde_json::json!({"fit_label": "RECOMMEND", "fit_score": 140})).unwrap();
        assert_eq!(clamped.score, Some(100));

        assert!(coerce(serde_json::json!({"fit_label": "REVIEW", "fit_score": "high"})).is_err());
        assert!(coerce(serde_json::json!({"fit_label": 3, "fit_score": 40})).is_err());
    }

    #[test]
    fn key_fields_fall_back_to_extracted() {
        let extracted = ExtractedFields {
            deadline: "2025-03-01".into(),
            location: "德阳".into(),
            ..ExtractedFields::default()
        };
        let merged = merge_key_fields(Some(&serde_json::json!({"location": "成都市", "deadline": ""})), &extracted);
        assert_eq!(merged.location, "成都市");
        assert_eq!(merged.deadline, "2025-03-01");
        assert_eq!(merge_key_fields(None, &extracted), extracted);
    }
}
