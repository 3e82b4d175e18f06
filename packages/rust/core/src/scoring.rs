//! Deterministic rule scorer.
//!
//! Four independent sub-scores (region, scale, scope, qualification) computed
//! from text alone against the company profile. The total is capped at 100.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use tenderwatch_shared::{ExtractedFields, MatchLevel, ProfileConfig, RegionRule, ScaleRange};

/// Reason emitted when no factor contributed.
pub const NO_MATCH_REASON: &str = "no favourable conditions matched";

pub const REGION_FLAG: &str = "region not in priority range";
pub const SCALE_FLAG_PREFIX: &str = "scale outside target range";
pub const TONNAGE_UNKNOWN_FLAG: &str = "tonnage not stated";
pub const SCOPE_FLAG: &str = "project type or scope match is weak";
pub const QUALIFICATION_FLAG: &str = "qualification requirements may not match";

const MAX_SCORE: u32 = 100;
const PROJECT_TYPE_POINTS: u32 = 15;
const PREFERENCE_POINTS: u32 = 10;
const QUALIFICATION_POINTS: u32 = 8;

/// Tonnage patterns in match order. The bare `N 吨/t` form goes first, so the
/// first number followed by a tonnage unit wins.
static TONNAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+(?:\.\d+)?)\s*[吨tT]",
        r"约\s*(\d+(?:\.\d+)?)\s*[吨tT]",
        r"(\d+(?:\.\d+)?)\s*吨位",
        r"钢结构.*?(\d+(?:\.\d+)?)\s*[吨tT]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Points and match level of one factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FactorScore {
    pub points: u32,
    pub level: MatchLevel,
}

/// Per-factor detail behind a rule score.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScoreBreakdown {
    pub region: FactorScore,
    pub scale: FactorScore,
    pub scope: FactorScore,
    pub qualification: FactorScore,
    pub tonnage: Option<f64>,
    pub matched_region: Option<String>,
}

/// Rule score with its evidence.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RuleScoreResult {
    pub score: u32,
    pub reasons: Vec<String>,
    pub risk_flags: Vec<String>,
    pub breakdown: ScoreBreakdown,
}

impl RuleScoreResult {
    pub fn is_clearly_mismatched(&self) -> bool {
        is_clearly_mismatched(self.score, &self.reasons, &self.risk_flags)
    }
}

/// A clear mismatch is a very low score backed by a specific negative flag,
/// or a low score whose reasons are concrete rather than the catch-all.
pub fn is_clearly_mismatched(score: u32, reasons: &[String], risk_flags: &[String]) -> bool {
    let negative = |flag: &String| {
        flag == REGION_FLAG
            || flag.starts_with(SCALE_FLAG_PREFIX)
            || flag == SCOPE_FLAG
            || flag == QUALIFICATION_FLAG
    };
    if score < 10 && risk_flags.iter().any(negative) {
        return true;
    }
    score < 20 && !reasons.iter().any(|r| r == NO_MATCH_REASON)
}

// ---------------------------------------------------------------------------
// RuleScorer
// ---------------------------------------------------------------------------

/// Scores notice text against a company profile.
#[derive(Debug, Clone)]
pub struct RuleScorer {
    profile: ProfileConfig,
}

impl RuleScorer {
    pub fn new(profile: &ProfileConfig) -> Self {
        Self {
            profile: profile.clone(),
        }
    }

    /// Score normalized text together with the extracted field values.
    pub fn score(&self, text: &str, fields: &ExtractedFields) -> RuleScoreResult {
        let full_text = std::iter::once(text)
            .chain(fields.values())
            .collect::<Vec<_>>()
            .join(" ");

        let (region, matched_region) = self.score_region(&full_text);
        let tonnage = extract_tonnage(&full_text).or_else(|| extract_tonnage(&fields.tonnage));
        let scale = score_scale(tonnage, &self.profile.scale);
        let scope = self.score_scope(&full_text);
        let qualification = self.score_qualification(&full_text);

        let score = (region.points + scale.points + scope.points + qualification.points).min(MAX_SCORE);

        let mut reasons = Vec::new();
        if let Some(name) = matched_region.as_deref() {
            reasons.push(format!("region match: {name} (+{})", region.points));
        }
        if scale.points > 0 {
            reasons.push(format!("scale match: {} (+{})", level_name(scale.level), scale.points));
            if let Some(t) = tonnage {
                reasons.push(format!("extracted tonnage: {t} t"));
            }
        }
        if scope.points > 0 {
            reasons.push(format!("scope match: {} (+{})", level_name(scope.level), scope.points));
        }
        if qualification.points > 0 {
            reasons.push(format!(
                "qualification match: {} (+{})",
                level_name(qualification.level),
                qualification.points
            ));
        }
        if reasons.is_empty() {
            reasons.push(NO_MATCH_REASON.to_string());
        }

        let mut risk_flags = Vec::new();
        if region.points == 0 {
            risk_flags.push(REGION_FLAG.to_string());
        }
        match tonnage {
            Some(t) if scale.points == 0 => risk_flags.push(format!(
                "{SCALE_FLAG_PREFIX} (current: {t} t, target: {}-{} t)",
                self.profile.scale.min, self.profile.scale.max
            )),
            Some(_) => {}
            None => risk_flags.push(TONNAGE_UNKNOWN_FLAG.to_string()),
        }
        if scope.points < PREFERENCE_POINTS {
            risk_flags.push(SCOPE_FLAG.to_string());
        }
        if qualification.points < QUALIFICATION_POINTS {
            risk_flags.push(QUALIFICATION_FLAG.to_string());
        }

        debug!(
            score,
            region = region.points,
            scale = scale.points,
            scope = scope.points,
            qualification = qualification.points,
            ?tonnage,
            "rule score computed"
        );

        RuleScoreResult {
            score,
            reasons,
            risk_flags,
            breakdown: ScoreBreakdown {
                region,
                scale,
                scope,
                qualification,
                tonnage,
                matched_region,
            },
        }
    }

    /// Highest-scoring matching region; the first listed wins ties.
    fn score_region(&self, text: &str) -> (FactorScore, Option<String>) {
        let best = self
            .profile
            .regions
            .iter()
            .filter(|r| r.keywords.iter().any(|kw| text.contains(kw.as_str())))
            .fold(None, |best: Option<&RegionRule>, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            });

        match best {
            Some(rule) => {
                let level = if rule.score >= 20 {
                    MatchLevel::High
                } else {
                    MatchLevel::Med
                };
                (
                    FactorScore {
                        points: rule.score,
                        level,
                    },
                    Some(rule.name.clone()),
                )
            }
            None => (
                FactorScore {
                    points: 0,
                    level: MatchLevel::Low,
                },
                None,
            ),
        }
    }

    fn score_scope(&self, text: &str) -> FactorScore {
        let type_matched = self
            .profile
            .project_groups
            .iter()
            .any(|g| g.keywords.iter().any(|kw| text.contains(kw.as_str())));
        let preference_matched = self
            .profile
            .preference_keywords
            .iter()
            .any(|kw| text.contains(kw.as_str()));

        let points = u32::from(type_matched) * PROJECT_TYPE_POINTS
            + u32::from(preference_matched) * PREFERENCE_POINTS;
        let level = match points {
            p if p >= 20 => MatchLevel::High,
            p if p >= 10 => MatchLevel::Med,
            _ => MatchLevel::Low,
        };
        FactorScore { points, level }
    }

    fn score_qualification(&self, text: &str) -> FactorScore {
        let matched = self
            .profile
            .qualification_categories
            .iter()
            .filter(|c| c.keywords.iter().any(|kw| text.contains(kw.as_str())))
            .count() as u32;

        let points = matched * QUALIFICATION_POINTS;
        let level = match points {
            p if p >= 20 => MatchLevel::High,
            p if p >= 8 => MatchLevel::Med,
            _ => MatchLevel::Low,
        };
        FactorScore { points, level }
    }
}

/// First tonnage found by the ordered patterns.
pub fn extract_tonnage(text: &str) -> Option<f64> {
    TONNAGE_PATTERNS
        .iter()
        .filter_map(|re| re.captures(text))
        .find_map(|caps| caps[1].parse::<f64>().ok())
}

fn score_scale(tonnage: Option<f64>, range: &ScaleRange) -> FactorScore {
    let Some(t) = tonnage else {
        return FactorScore {
            points: 0,
            level: MatchLevel::Unknown,
        };
    };

    if t < range.min || t > range.max {
        return FactorScore {
            points: 0,
            level: MatchLevel::Low,
        };
    }

    if (range.optimal_min..=range.optimal_max).contains(&t) {
        let penalty = ((t - range.target).abs() / 10.0).floor();
        let points = (30.0 - penalty).max(0.0) as u32;
        return FactorScore {
            points,
            level: MatchLevel::High,
        };
    }

    let ratio = if t < range.optimal_min {
        (t - range.min) / (range.optimal_min - range.min)
    } else {
        (range.max - t) / (range.max - range.optimal_max)
    };
    let points = (20.0 * ratio).floor().max(0.0) as u32;
    let level = if points >= 10 {
        MatchLevel::Med
    } else {
        MatchLevel::Low
    };
    FactorScore { points, level }
}

fn level_name(level: MatchLevel) -> &'static str {
    match level {
        MatchLevel::High => "HIGH",
        MatchLevel::Med => "MED",
        MatchLevel::Low => "LOW",
        MatchLevel::Unknown => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> RuleScorer {
        RuleScorer::new(&ProfileConfig::default())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strong_notice_scores_every_factor() {
        let text = "四川省成都市钢结构厂房制作安装工程，用钢量约1000吨，投标人须具备钢结构工程专业承包资质及安全生产许可证。";
        let result = scorer().score(text, &ExtractedFields::default());

        let b = &result.breakdown;
        assert_eq!(b.region.points, 30);
        assert_eq!(b.matched_region.as_deref(), Some("四川"));
        assert_eq!(b.tonnage, Some(1000.0));
        assert_eq!(b.scale, FactorScore { points: 30, level: MatchLevel::High });
        assert_eq!(b.scope, FactorScore { points: 25, level: MatchLevel::High });
        assert_eq!(b.qualification, FactorScore { points: 16, level: MatchLevel::Med });
        assert_eq!(result.score, 100);
        assert!(result.risk_flags.is_empty());
        assert!(result.reasons.iter().any(|r| r == "extracted tonnage: 1000 t"));
        assert!(!result.is_clearly_mismatched());
    }

    #[test]
    fn region_takes_highest_score() {
        let text = "项目位于云南，由重庆公司承建";
        let result = scorer().score(text, &ExtractedFields::default());
        assert_eq!(result.breakdown.region.points, 25);
        assert_eq!(result.breakdown.matched_region.as_deref(), Some("重庆"));
    }

    #[test]
    fn scale_bands() {
        let range = ScaleRange::default();
        assert_eq!(score_scale(Some(1000.0), &range).points, 30);
        assert_eq!(score_scale(Some(1150.0), &range).points, 15);
        assert_eq!(score_scale(Some(500.0), &range), FactorScore { points: 10, level: MatchLevel::Med });
        assert_eq!(score_scale(Some(300.0), &range), FactorScore { points: 3, level: MatchLevel::Low });
        assert_eq!(score_scale(Some(2100.0), &range).points, 10);
        assert_eq!(score_scale(Some(5000.0), &range), FactorScore { points: 0, level: MatchLevel::Low });
        assert_eq!(score_scale(None, &range), FactorScore { points: 0, level: MatchLevel::Unknown });
    }

    #[test]
    fn tonnage_takes_first_number_with_unit() {
        assert_eq!(extract_tonnage("工期30t天，钢结构总量约850吨"), Some(30.0));
        assert_eq!(extract_tonnage("钢结构总量约 850 吨"), Some(850.0));
        assert_eq!(extract_tonnage("钢结构工程 1200 t"), Some(1200.0));
        assert_eq!(extract_tonnage("无吨位信息"), None);
    }

    #[test]
    fn tonnage_falls_back_to_extracted_field() {
        let fields = ExtractedFields {
            tonnage: "900吨".into(),
            ..ExtractedFields::default()
        };
        let result = scorer().score("钢结构项目", &fields);
        assert_eq!(result.breakdown.tonnage, Some(900.0));
    }

    #[test]
    fn nothing_matched_uses_catch_all() {
        let result = scorer().score("办公用品采购", &ExtractedFields::default());
        assert_eq!(result.score, 0);
        assert_eq!(result.reasons, vec![NO_MATCH_REASON.to_string()]);
        assert!(result.risk_flags.contains(&REGION_FLAG.to_string()));
        assert!(result.risk_flags.contains(&TONNAGE_UNKNOWN_FLAG.to_string()));
        // Negative flags with a very low score.
        assert!(result.is_clearly_mismatched());
    }

    #[test]
    fn out_of_range_tonnage_flags_scale() {
        let result = scorer().score("钢结构 50吨", &ExtractedFields::default());
        assert!(result
            .risk_flags
            .iter()
            .any(|f| f == "scale outside target range (current: 50 t, target: 200-3000 t)"));
    }

    #[test]
    fn mismatch_rules() {
        let region = strings(&[REGION_FLAG]);
        let tonnage_only = strings(&[TONNAGE_UNKNOWN_FLAG]);
        let catch_all = strings(&[NO_MATCH_REASON]);
        let concrete = strings(&["scope match: LOW (+5)"]);

        assert!(is_clearly_mismatched(5, &catch_all, &region));
        assert!(!is_clearly_mismatched(5, &catch_all, &tonnage_only));
        assert!(is_clearly_mismatched(15, &concrete, &[]));
        assert!(!is_clearly_mismatched(15, &catch_all, &region));
        assert!(!is_clearly_mismatched(25, &concrete, &region));
    }
}
