//! Run artifacts: the JSON export, the recommendations CSV and the Markdown digest.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use tenderwatch_core::{NoticeReport, RunSummary};
use tenderwatch_shared::{Decision, DecisionState, QualityStatus, Result, TenderError};

/// Notices listed in the digest's top section.
const TOP_NOTICES: usize = 10;
const SUMMARY_EXCERPT_CHARS: usize = 120;

/// Spreadsheet tools need the BOM to read the CSV as UTF-8.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CSV_HEADER: [&str; 9] = [
    "title",
    "url",
    "published_at",
    "fit_score",
    "fit_label",
    "decision_state",
    "input_quality",
    "decision_source",
    "summary",
];

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

/// Write the full run summary as pretty-printed JSON.
pub fn export_json(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TenderError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| TenderError::parse(format!("serialize run summary: {e}")))?;
    std::fs::write(path, json).map_err(|e| TenderError::io(path, e))?;
    info!(path = %path.display(), notices = summary.notices.len(), "results exported");
    Ok(())
}

// ---------------------------------------------------------------------------
// Recommendations CSV
// ---------------------------------------------------------------------------

/// One RECOMMEND/REVIEW notice, in `CSV_HEADER` column order.
#[derive(Serialize)]
struct RecommendationRow<'a> {
    title: &'a str,
    url: Option<&'a str>,
    published_at: Option<NaiveDate>,
    fit_score: Option<u8>,
    fit_label: &'static str,
    decision_state: &'static str,
    input_quality: &'static str,
    decision_source: &'static str,
    summary: &'a str,
}

/// Write the run's RECOMMEND/REVIEW notices into `dir` as
/// `recommend-<timestamp>.csv`, in list order. Returns the file path.
///
/// The header row is written even when no notice qualifies.
pub fn write_recommendations_csv(
    summary: &RunSummary,
    dir: &Path,
    generated_at: DateTime<Utc>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| TenderError::io(dir, e))?;
    let path = dir.join(format!("recommend-{}.csv", generated_at.format("%Y%m%d-%H%M%S")));

    let mut file = std::fs::File::create(&path).map_err(|e| TenderError::io(&path, e))?;
    file.write_all(UTF8_BOM).map_err(|e| TenderError::io(&path, e))?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| TenderError::io(&path, e.into()))?;

    let mut rows = 0;
    for (report, decision) in summary
        .notices
        .iter()
        .filter_map(|n| n.decision().map(|d| (n, d)))
        .filter(|(_, d)| d.state().is_actionable())
    {
        let state = decision.state().as_str();
        writer
            .serialize(RecommendationRow {
                title: &report.title,
                url: report.url.as_deref(),
                published_at: report.published_at,
                fit_score: decision.fit_score(),
                fit_label: state,
                decision_state: state,
                input_quality: quality_label(decision),
                decision_source: decision.meta.decision_source.as_str(),
                summary: &decision.summary,
            })
            .map_err(|e| TenderError::io(&path, e.into()))?;
        rows += 1;
    }
    writer.flush().map_err(|e| TenderError::io(&path, e))?;

    info!(path = %path.display(), rows, "recommendations written");
    Ok(path)
}

// ---------------------------------------------------------------------------
// Markdown digest
// ---------------------------------------------------------------------------

/// Write the digest into `dir` as `digest-<timestamp>.md`. Returns the file path.
pub fn write_digest(summary: &RunSummary, dir: &Path, generated_at: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| TenderError::io(dir, e))?;
    let path = dir.join(format!("digest-{}.md", generated_at.format("%Y%m%d-%H%M%S")));
    std::fs::write(&path, render_digest(summary, generated_at)).map_err(|e| TenderError::io(&path, e))?;
    info!(path = %path.display(), "digest written");
    Ok(path)
}

/// Render the digest: totals per state, then the best RECOMMEND/REVIEW notices.
pub fn render_digest(summary: &RunSummary, generated_at: DateTime<Utc>) -> String {
    let stats = &summary.stats;
    let mut md = build_frontmatter(summary, generated_at);

    md.push_str("\n# TenderWatch digest\n\n");
    if stats.cancelled {
        md.push_str("> Run was interrupted; not every listed notice was processed.\n\n");
    }

    md.push_str("## Totals\n\n");
    md.push_str(&table(
        &["Decision", "Count"],
        [
            (DecisionState::Recommend, stats.recommend),
            (DecisionState::Review, stats.review),
            (DecisionState::Skip, stats.skip),
            (DecisionState::Unknown, stats.unknown),
        ]
        .iter()
        .map(|(state, n)| vec![state.as_str().to_string(), n.to_string()])
        .collect(),
    ));
    md.push_str(&format!(
        "\nListed {}, new {}, changed {}, unchanged {}, failed {}.\n",
        stats.listed, stats.new, stats.changed, stats.unchanged, stats.failed
    ));

    let top = top_notices(&summary.notices);
    md.push_str("\n## Top notices\n\n");
    if top.is_empty() {
        md.push_str("No notices to recommend or review in this run.\n");
    }
    for (rank, (report, decision)) in top.iter().enumerate() {
        md.push_str(&format!("### {}. {}\n\n", rank + 1, report.title));
        if let Some(url) = &report.url {
            md.push_str(&format!("- URL: <{url}>\n"));
        }
        let score = decision
            .fit_score()
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        md.push_str(&format!("- Score: {score} ({})\n", decision.state()));
        md.push_str(&format!("- Input quality: {}\n", quality_label(decision)));
        md.push_str(&format!("- Source: {}\n", decision.meta.decision_source.as_str()));
        if !decision.summary.is_empty() {
            md.push_str(&format!("- Summary: {}\n", excerpt(&decision.summary)));
        }
        md.push('\n');
    }

    let failed: Vec<&NoticeReport> = summary.notices.iter().filter(|n| n.is_failed()).collect();
    if !failed.is_empty() {
        md.push_str("## Failed notices\n\n");
        for report in failed {
            md.push_str(&format!("- {}\n", report.title));
        }
    }

    md
}

/// RECOMMEND/REVIEW notices, best score first (absent scores last), capped.
fn top_notices(notices: &[NoticeReport]) -> Vec<(&NoticeReport, &Decision)> {
    let mut top: Vec<(&NoticeReport, &Decision)> = notices
        .iter()
        .filter_map(|n| n.decision().map(|d| (n, d)))
        .filter(|(_, d)| d.state().is_actionable())
        .collect();
    top.sort_by(|a, b| b.1.fit_score().cmp(&a.1.fit_score()));
    top.truncate(TOP_NOTICES);
    top
}

fn quality_label(decision: &Decision) -> &'static str {
    match decision.meta.input_quality {
        QualityStatus::Good => "GOOD",
        QualityStatus::Insufficient => "INSUFFICIENT",
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SUMMARY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}

fn table(header: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut md = String::new();
    md.push_str("| ");
    md.push_str(&header.join(" | "));
    md.push_str(" |\n");

    md.push_str("| ");
    md.push_str(&header.iter().map(|_| "---").collect::<Vec<_>>().join(" | "));
    md.push_str(" |\n");

    for row in rows {
        md.push_str("| ");
        md.push_str(&row.iter().map(|c| c.replace('|', "\\|")).collect::<Vec<_>>().join(" | "));
        md.push_str(" |\n");
    }
    md
}

fn build_frontmatter(summary: &RunSummary, generated_at: DateTime<Utc>) -> String {
    let mut fm = String::from("---\n");
    fm.push_str(&format!("generated_at: \"{}\"\n", generated_at.to_rfc3339()));
    if let Some(run_id) = &summary.run_id {
        fm.push_str(&format!("run_id: \"{run_id}\"\n"));
    }
    fm.push_str(&format!("listed: {}\n", summary.stats.listed));
    fm.push_str(&format!("elapsed_ms: {}\n", summary.elapsed.as_millis()));
    fm.push_str("---\n");
    fm
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tenderwatch_core::{ChangeStatus, NoticeOutcome, RunStats};
    use tenderwatch_shared::{DecisionMeta, DecisionSource, ExtractedFields, MatchLevel, Verdict};

    fn decision(verdict: Verdict, summary: &str) -> Decision {
        Decision {
            verdict,
            region_match: MatchLevel::High,
            scope_match: MatchLevel::Med,
            scale_match: MatchLevel::Unknown,
            qualification_match: MatchLevel::Low,
            summary: summary.into(),
            reasons: vec![],
            risk_flags: vec![],
            key_fields: ExtractedFields::default(),
            meta: DecisionMeta {
                decision_source: DecisionSource::Llm,
                input_quality: QualityStatus::Good,
                rule_score: Some(70),
                model: None,
                diagnostic: None,
            },
        }
    }

    fn report(position: usize, title: &str, decision: Option<Decision>) -> NoticeReport {
        NoticeReport {
            position,
            title: title.into(),
            url: Some(format!("https://example.com/notice/{position}")),
            published_at: NaiveDate::from_ymd_opt(2025, 2, 14),
            canonical_key: None,
            outcome: NoticeOutcome::Processed {
                change: ChangeStatus::New,
                decision,
                persisted: true,
            },
        }
    }

    fn summary(notices: Vec<NoticeReport>) -> RunSummary {
        RunSummary {
            run_id: Some("run-1".into()),
            stats: RunStats {
                listed: notices.len(),
                recommend: 1,
                review: 1,
                skip: 1,
                ..RunStats::default()
            },
            notices,
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn digest_ranks_actionable_notices_by_score() {
        let summary = summary(vec![
            report(0, "跳过的公告", Some(decision(Verdict::Skip(90), "not our region"))),
            report(1, "复核的公告", Some(decision(Verdict::Review(55), "needs a look"))),
            report(2, "推荐的公告", Some(decision(Verdict::Recommend(88), "strong fit"))),
        ]);

        let md = render_digest(&summary, Utc::now());

        let recommend = md.find("### 1. 推荐的公告").unwrap();
        let review = md.find("### 2. 复核的公告").unwrap();
        assert!(recommend < review);
        assert!(!md.contains("跳过的公告"));
        assert!(md.contains("| RECOMMEND | 1 |"));
        assert!(md.contains("- Score: 88 (RECOMMEND)"));
        assert!(md.contains("- Source: LLM"));
        assert!(md.contains("run_id: \"run-1\""));
    }

    #[test]
    fn digest_caps_top_section() {
        let notices = (0..15)
            .map(|i| report(i, &format!("公告{i}"), Some(decision(Verdict::Review(i as u8), "ok"))))
            .collect();
        let md = render_digest(&summary(notices), Utc::now());
        assert!(md.contains("### 10. "));
        assert!(!md.contains("### 11. "));
        assert!(md.contains("### 1. 公告14"));
    }

    #[test]
    fn digest_lists_failures() {
        let mut failed = report(0, "坏公告", None);
        failed.outcome = NoticeOutcome::Failed {
            kind: "fetch_transient".into(),
            error: "timeout".into(),
        };
        let md = render_digest(&summary(vec![failed]), Utc::now());
        assert!(md.contains("No notices to recommend or review"));
        assert!(md.contains("## Failed notices\n\n- 坏公告"));
    }

    #[test]
    fn excerpt_cuts_long_summaries() {
        let long = "很".repeat(200);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), SUMMARY_EXCERPT_CHARS + 1);
        assert_eq!(excerpt("short  summary\n"), "short summary");
    }

    #[test]
    fn recommendations_csv_keeps_actionable_rows() {
        let dir = std::env::temp_dir().join(format!("tw_csv_{}", uuid::Uuid::now_v7()));
        let mut unknown = decision(Verdict::Unknown, "not enough text");
        unknown.meta.decision_source = DecisionSource::QualityGate;
        let summary = summary(vec![
            report(0, "推荐的公告, 含逗号", Some(decision(Verdict::Recommend(88), "fit \"steel\" plant"))),
            report(1, "跳过的公告", Some(decision(Verdict::Skip(20), "far away"))),
            report(2, "信息不足的公告", Some(unknown)),
            report(3, "复核的公告", Some(decision(Verdict::Review(55), "check scope"))),
        ]);

        let path = write_recommendations_csv(&summary, &dir, Utc::now()).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("recommend-"));

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), CSV_HEADER);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].iter().collect::<Vec<_>>(),
            vec![
                "推荐的公告, 含逗号",
                "https://example.com/notice/0",
                "2025-02-14",
                "88",
                "RECOMMEND",
                "RECOMMEND",
                "GOOD",
                "LLM",
                "fit \"steel\" plant",
            ]
        );
        assert_eq!(&rows[1][0], "复核的公告");
        assert_eq!(&rows[1][3], "55");
        assert_eq!(&rows[1][5], "REVIEW");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn recommendations_csv_without_matches_has_header_only() {
        let dir = std::env::temp_dir().join(format!("tw_csv_{}", uuid::Uuid::now_v7()));
        let summary = summary(vec![report(0, "跳过的公告", Some(decision(Verdict::Skip(10), "no")))]);

        let path = write_recommendations_csv(&summary, &dir, Utc::now()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);
        assert_eq!(reader.headers().unwrap().len(), CSV_HEADER.len());
        assert_eq!(reader.records().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn export_and_digest_files_are_written() {
        let dir = std::env::temp_dir().join(format!("tw_artifacts_{}", uuid::Uuid::now_v7()));
        let summary = summary(vec![report(0, "推荐的公告", Some(decision(Verdict::Recommend(80), "fit")))]);

        let json_path = dir.join("out").join("results.json");
        export_json(&summary, &json_path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["notices"][0]["outcome"]["status"], "processed");
        assert_eq!(json["notices"][0]["outcome"]["decision"]["fit_label"], "RECOMMEND");
        assert_eq!(json["elapsed_ms"], 1500);

        let digest = write_digest(&summary, &dir, Utc::now()).unwrap();
        assert!(digest.file_name().unwrap().to_string_lossy().starts_with("digest-"));
        assert!(std::fs::read_to_string(digest).unwrap().contains("推荐的公告"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
