//! Input quality gate.
//!
//! Decides whether a notice carries enough information to be worth scoring.
//! A rejected notice ends as an UNKNOWN decision without any model call.

use regex::Regex;
use tracing::debug;

use tenderwatch_shared::{ExtractedFields, QualityConfig, QualityStatus, Result, TenderError};

/// Which key signals were found. Tonnage is tracked but never required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Signals {
    pub location: bool,
    pub qualification: bool,
    pub scope: bool,
    pub deadline: bool,
    pub tonnage: bool,
}

impl Signals {
    /// Number of required signals present (tonnage excluded).
    pub fn count(&self) -> usize {
        [self.location, self.qualification, self.scope, self.deadline]
            .into_iter()
            .filter(|present| *present)
            .count()
    }
}

/// Outcome of the quality gate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QualityAssessment {
    pub status: QualityStatus,
    /// Why the notice was rejected. Empty for GOOD.
    pub reasons: Vec<String>,
    pub signals: Signals,
    /// Normalized text length in characters.
    pub text_len: usize,
}

impl QualityAssessment {
    pub fn is_good(&self) -> bool {
        self.status == QualityStatus::Good
    }

    pub fn signal_count(&self) -> usize {
        self.signals.count()
    }
}

/// Compiled quality rules.
#[derive(Debug, Clone)]
pub struct QualityGate {
    min_text_len: usize,
    min_key_fields: usize,
    location_keywords: Vec<String>,
    qualification_keywords: Vec<String>,
    scope_keywords: Vec<String>,
    deadline_patterns: Vec<Regex>,
    tonnage_patterns: Vec<Regex>,
}

impl QualityGate {
    pub fn new(config: &QualityConfig) -> Result<Self> {
        Ok(Self {
            min_text_len: config.min_text_len,
            min_key_fields: config.min_key_fields,
            location_keywords: lowercase(&config.location_keywords),
            qualification_keywords: lowercase(&config.qualification_keywords),
            scope_keywords: lowercase(&config.scope_keywords),
            deadline_patterns: compile(&config.deadline_patterns)?,
            tonnage_patterns: compile(&config.tonnage_patterns)?,
        })
    }

    /// Assess normalized notice text, its title and extracted fields.
    pub fn assess(&self, title: &str, text: &str, fields: &ExtractedFields) -> QualityAssessment {
        let text_len = text.trim().chars().count();
        let haystack = format!("{text} {title}").to_lowercase();

        let contains_any = |keywords: &[String]| keywords.iter().any(|kw| haystack.contains(kw.as_str()));
        let matches_any = |patterns: &[Regex]| patterns.iter().any(|re| re.is_match(&haystack));

        let signals = Signals {
            location: contains_any(&self.location_keywords) || !fields.location.is_empty(),
            qualification: contains_any(&self.qualification_keywords)
                || !fields.qualification.is_empty(),
            scope: contains_any(&self.scope_keywords) || !fields.scope.is_empty(),
            deadline: matches_any(&self.deadline_patterns) || !fields.deadline.is_empty(),
            tonnage: matches_any(&self.tonnage_patterns) || !fields.tonnage.is_empty(),
        };

        let mut reasons = Vec::new();
        if text_len < self.min_text_len {
            reasons.push(format!(
                "text too short ({text_len} chars, need at least {})",
                self.min_text_len
            ));
        }
        if signals.count() < self.min_key_fields {
            reasons.push(format!(
                "only {} of 4 key signals present (location/qualification/scope/deadline, need {})",
                signals.count(),
                self.min_key_fields
            ));
        }

        let status = if reasons.is_empty() {
            QualityStatus::Good
        } else {
            QualityStatus::Insufficient
        };
        debug!(?status, text_len, signals = signals.count(), tonnage = signals.tonnage, "quality assessed");

        QualityAssessment {
            status,
            reasons,
            signals,
            text_len,
        }
    }
}

fn lowercase(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|kw| kw.to_lowercase()).collect()
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| TenderError::config(format!("invalid quality pattern {p:?}: {e}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> QualityGate {
        QualityGate::new(&QualityConfig::default()).unwrap()
    }

    fn padded(body: &str, len: usize) -> String {
        let mut text = body.to_string();
        while text.chars().count() < len {
            text.push('。');
        }
        text
    }

    #[test]
    fn short_text_without_signals_is_insufficient() {
        let text = padded("公告", 250);
        let assessment = gate().assess("公告", &text, &ExtractedFields::default());

        assert_eq!(assessment.status, QualityStatus::Insufficient);
        assert_eq!(assessment.signal_count(), 0);
        assert_eq!(assessment.reasons.len(), 2);
        assert!(assessment.reasons[0].contains("250"));
    }

    #[test]
    fn long_text_with_two_signals_is_good() {
        let text = padded("项目地点：成都市。投标截止时间：2025-03-01 09:00。", 320);
        let assessment = gate().assess("钢结构厂房", &text, &ExtractedFields::default());

        assert!(assessment.is_good());
        assert!(assessment.signals.location);
        assert!(assessment.signals.deadline);
        assert_eq!(assessment.signal_count(), 2);
        assert!(assessment.reasons.is_empty());
    }

    #[test]
    fn each_signal_counts_once() {
        let text = padded("项目地点：成都市。", 400);
        let fields = ExtractedFields {
            location: "成都市".into(),
            ..ExtractedFields::default()
        };
        let assessment = gate().assess("", &text, &fields);

        assert_eq!(assessment.signal_count(), 1);
        assert_eq!(assessment.status, QualityStatus::Insufficient);
    }

    #[test]
    fn extracted_fields_supply_signals() {
        let text = padded("招标公告", 400);
        let fields = ExtractedFields {
            qualification: "钢结构工程专业承包二级".into(),
            scope: "钢结构制作安装".into(),
            ..ExtractedFields::default()
        };
        assert!(gate().assess("", &text, &fields).is_good());
    }

    #[test]
    fn tonnage_is_tracked_not_required() {
        let text = padded("用钢量约1000吨", 400);
        let assessment = gate().assess("", &text, &ExtractedFields::default());
        assert!(assessment.signals.tonnage);
        assert_eq!(assessment.signal_count(), 0);
        assert!(!assessment.is_good());
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let config = QualityConfig {
            deadline_patterns: vec!["(".into()],
            ..QualityConfig::default()
        };
        assert!(QualityGate::new(&config).is_err());
    }
}
