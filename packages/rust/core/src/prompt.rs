//! Prompt construction for the decision model.
//!
//! The model is framed as a semantic supplement to the rule engine: it sees
//! the rule evidence and must answer with a single JSON object.

use tenderwatch_shared::{ExtractedFields, ProfileConfig};

use crate::scoring::RuleScoreResult;

/// Inputs for one analysis prompt.
pub struct PromptInput<'a> {
    pub profile: &'a ProfileConfig,
    pub rule: &'a RuleScoreResult,
    pub title: &'a str,
    pub text: &'a str,
    pub fields: &'a ExtractedFields,
    /// Notice text beyond this many characters is cut.
    pub max_text_chars: usize,
}

const RESPONSE_SCHEMA: &str = r#"{
  "decision_state": "RECOMMEND | REVIEW | SKIP | UNKNOWN",
  "fit_label": "RECOMMEND | REVIEW | SKIP | UNKNOWN",
  "fit_score": 0-100 integer, null only when UNKNOWN,
  "region_match": "HIGH | MED | LOW | UNKNOWN",
  "scope_match": "HIGH | MED | LOW | UNKNOWN",
  "scale_match": "HIGH | MED | LOW | UNKNOWN",
  "qualification_match": "HIGH | MED | LOW | UNKNOWN",
  "summary": "analysis summary, at most 200 characters",
  "reasons": ["..."],
  "risk_flags": ["..."],
  "key_fields": {
    "location": "", "scope": "", "deadline": "", "tonnage": "", "qualification": ""
  }
}"#;

/// Build the analysis prompt.
pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let profile = input.profile;
    let rule = input.rule;
    let mut out = String::new();

    out.push_str(
        "You are a tender analyst for a steel-structure contractor. The rule engine has already \
         judged the hard facts (region, scale, scope, qualification). Your job is a semantic \
         supplement: read the notice, weigh the rule evidence, and give a final assessment.\n\n",
    );

    out.push_str("## Rules\n");
    out.push_str("- Do not override a clear rule-engine mismatch.\n");
    out.push_str("- If the rule score is very low (below 20), do not answer RECOMMEND.\n");
    out.push_str(
        "- If the notice lacks the information to judge, answer UNKNOWN with fit_score null. \
         UNKNOWN is a state of its own, not a score of 0.\n",
    );
    out.push_str("- If your summary says information is insufficient, do not give a score of 80 or more.\n");
    out.push_str("- decision_state and fit_label must be identical.\n");
    out.push_str(
        "- RECOMMEND: clear match (70+). REVIEW: unsure, needs a human (40-69). \
         SKIP: clear mismatch (below 40).\n\n",
    );

    let regions = profile
        .regions
        .iter()
        .map(|r| format!("{} ({})", r.name, r.score))
        .collect::<Vec<_>>()
        .join(", ");
    let project_types = names(profile.project_groups.iter().map(|g| g.name.as_str()));
    let qualifications = names(profile.qualification_categories.iter().map(|c| c.name.as_str()));
    out.push_str(&format!("## Company profile: {}\n", profile.company_name));
    out.push_str(&format!("- Priority regions: {regions}\n"));
    out.push_str(&format!("- Project types: {project_types}\n"));
    out.push_str(&format!(
        "- Scale: target about {} t, acceptable {}-{} t\n",
        profile.scale.target, profile.scale.min, profile.scale.max
    ));
    out.push_str(&format!("- Qualifications: {qualifications}\n\n"));

    let flags = if rule.risk_flags.is_empty() {
        "none".to_string()
    } else {
        rule.risk_flags.join("; ")
    };
    out.push_str("## Rule engine result\n");
    out.push_str(&format!("- Rule score: {}/100\n", rule.score));
    out.push_str(&format!("- Reasons: {}\n", rule.reasons.join("; ")));
    out.push_str(&format!("- Risk flags: {flags}\n\n"));

    out.push_str("## Notice\n");
    out.push_str(&format!("Title: {}\n", input.title));
    let fields = [
        ("location", &input.fields.location),
        ("scope", &input.fields.scope),
        ("deadline", &input.fields.deadline),
        ("tonnage", &input.fields.tonnage),
        ("qualification", &input.fields.qualification),
    ];
    if !input.fields.is_empty() {
        out.push_str("Extracted fields:\n");
        for (name, value) in fields.iter().filter(|(_, v)| !v.is_empty()) {
            out.push_str(&format!("- {name}: {value}\n"));
        }
    }
    out.push_str("Text:\n");
    out.push_str(truncate_chars(input.text, input.max_text_chars));
    out.push_str("\n\n");

    out.push_str("## Output\n");
    out.push_str("Answer with exactly one JSON object of this shape and nothing else:\n");
    out.push_str(RESPONSE_SCHEMA);
    out.push('\n');

    out
}

fn names<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

/// First `max` characters of `text`, cut on a character boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::RuleScorer;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("钢结构厂房", 3), "钢结构");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn prompt_embeds_rule_evidence_and_fields() {
        let profile = ProfileConfig::default();
        let fields = ExtractedFields {
            location: "成都市".into(),
            ..ExtractedFields::default()
        };
        let rule = RuleScorer::new(&profile).score("成都钢结构厂房", &fields);
        let text = "正".repeat(5000);

        let prompt = build_prompt(&PromptInput {
            profile: &profile,
            rule: &rule,
            title: "成都钢结构厂房招标公告",
            text: &text,
            fields: &fields,
            max_text_chars: 3000,
        });

        assert!(prompt.contains(&format!("Rule score: {}/100", rule.score)));
        assert!(prompt.contains("- location: 成都市"));
        assert!(!prompt.contains("- deadline:"));
        assert!(prompt.contains("四川 (30)"));
        assert!(prompt.contains("\"fit_label\""));
        assert_eq!(prompt.matches('正').count(), 3000);
    }
}
