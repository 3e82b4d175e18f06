//! End-to-end `run` pipeline: list → detail → extract → identity → decide → store.
//!
//! Per-notice failures (fetch, extraction) are recorded in the run summary
//! and never abort the run. Store failures do.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::{StreamExt, TryStreamExt, future, stream};
use serde::Serialize;
use tracing::{info, instrument, warn};

use tenderwatch_crawler::FetchOrchestrator;
use tenderwatch_extract::extract;
use tenderwatch_shared::{
    CanonicalKey, ContentHash, Decision, DecisionState, FetchError, NoticeFields, NoticeListing,
    NoticeRecord, PipelineError, Result, RunConfig, TenderError,
};
use tenderwatch_storage::Storage;

use crate::decision::{DecisionEngine, NoticeInput};
use crate::identity::{self, ChangeStatus};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Where notices come from.
#[async_trait]
pub trait NoticeSource: Send + Sync {
    async fn fetch_list(&self) -> std::result::Result<Vec<NoticeListing>, FetchError>;

    /// Raw detail content (markup or text) for one listing.
    async fn fetch_detail(&self, listing: &NoticeListing) -> std::result::Result<String, FetchError>;
}

#[async_trait]
impl NoticeSource for FetchOrchestrator {
    async fn fetch_list(&self) -> std::result::Result<Vec<NoticeListing>, FetchError> {
        FetchOrchestrator::fetch_list(self).await
    }

    async fn fetch_detail(&self, listing: &NoticeListing) -> std::result::Result<String, FetchError> {
        FetchOrchestrator::fetch_detail(self, listing)
            .await
            .map(|fetched| fetched.content)
    }
}

/// Durable notice storage as the pipeline needs it.
#[async_trait]
pub trait NoticeStore: Send + Sync {
    async fn get_by_canonical_key(&self, key: &CanonicalKey) -> Result<Option<NoticeRecord>>;

    /// Insert or update by canonical key. `None` keeps the stored decision.
    async fn upsert(&self, fields: &NoticeFields, decision: Option<&Decision>) -> Result<NoticeRecord>;

    async fn insert_run(&self) -> Result<String>;

    async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()>;
}

#[async_trait]
impl NoticeStore for Storage {
    async fn get_by_canonical_key(&self, key: &CanonicalKey) -> Result<Option<NoticeRecord>> {
        Storage::get_by_canonical_key(self, key).await
    }

    async fn upsert(&self, fields: &NoticeFields, decision: Option<&Decision>) -> Result<NoticeRecord> {
        self.upsert_notice(fields, decision).await
    }

    async fn insert_run(&self) -> Result<String> {
        Storage::insert_run(self).await
    }

    async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        Storage::finish_run(self, run_id, stats_json).await
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one notice.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NoticeOutcome {
    /// New or changed, with a decision when analysis is on.
    Processed {
        change: ChangeStatus,
        decision: Option<Decision>,
        persisted: bool,
    },
    /// Same content hash as the stored record; nothing was done.
    Unchanged,
    /// Fetch or extraction failed for this notice only.
    Failed { kind: String, error: String },
}

/// One notice's entry in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct NoticeReport {
    pub position: usize,
    pub title: String,
    pub url: Option<String>,
    pub published_at: Option<NaiveDate>,
    /// Absent when the notice failed before identity was assigned.
    pub canonical_key: Option<CanonicalKey>,
    pub outcome: NoticeOutcome,
}

impl NoticeReport {
    pub fn decision(&self) -> Option<&Decision> {
        match &self.outcome {
            NoticeOutcome::Processed { decision, .. } => decision.as_ref(),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, NoticeOutcome::Failed { .. })
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub listed: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub decided: usize,
    pub persisted: usize,
    pub recommend: usize,
    pub review: usize,
    pub skip: usize,
    pub unknown: usize,
    /// Interrupted before every listing was picked up.
    pub cancelled: bool,
}

impl RunStats {
    fn tally(reports: &[NoticeReport], listed: usize, cancelled: bool) -> Self {
        let mut stats = Self {
            listed,
            cancelled,
            ..Self::default()
        };
        for report in reports {
            match &report.outcome {
                NoticeOutcome::Processed {
                    change,
                    decision,
                    persisted,
                } => {
                    match change {
                        ChangeStatus::New => stats.new += 1,
                        ChangeStatus::Changed => stats.changed += 1,
                        ChangeStatus::Unchanged => stats.unchanged += 1,
                    }
                    if *persisted {
                        stats.persisted += 1;
                    }
                    if let Some(decision) = decision {
                        stats.decided += 1;
                        match decision.state() {
                            DecisionState::Recommend => stats.recommend += 1,
                            DecisionState::Review => stats.review += 1,
                            DecisionState::Skip => stats.skip += 1,
                            DecisionState::Unknown => stats.unknown += 1,
                        }
                    }
                }
                NoticeOutcome::Unchanged => stats.unchanged += 1,
                NoticeOutcome::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Option<String>,
    pub stats: RunStats,
    /// In list order.
    pub notices: Vec<NoticeReport>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the list is known.
    fn notices_found(&self, total: usize);
    /// Called as each notice finishes, in completion order.
    fn notice_done(&self, report: &NoticeReport);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn notices_found(&self, _total: usize) {}
    fn notice_done(&self, _report: &NoticeReport) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Sequences fetch, extraction, change detection, decision and storage per notice.
pub struct PipelineCoordinator {
    config: RunConfig,
    source: Arc<dyn NoticeSource>,
    engine: DecisionEngine,
    /// Absent when persistence is off; every notice then counts as new.
    store: Option<Arc<dyn NoticeStore>>,
    cancel: Arc<AtomicBool>,
}

impl PipelineCoordinator {
    pub fn new(
        config: RunConfig,
        source: Arc<dyn NoticeSource>,
        engine: DecisionEngine,
        store: Option<Arc<dyn NoticeStore>>,
    ) -> Self {
        let store = if config.persist { store } else { None };
        Self {
            config,
            source,
            engine,
            store,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops the run from picking up further notices.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the pipeline once.
    ///
    /// Fails only on run-level problems: an unavailable notice list or a
    /// store error.
    #[instrument(skip_all, fields(max_notices = self.config.max_notices, analyze = self.config.analyze, persist = self.store.is_some()))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunSummary> {
        let start = Instant::now();

        let run_id = match &self.store {
            Some(store) => Some(store.insert_run().await?),
            None => None,
        };
        info!(run_id = ?run_id, "starting run");

        progress.phase("Fetching notice list");
        let mut listings = self
            .source
            .fetch_list()
            .await
            .map_err(|e| TenderError::Network(format!("notice list unavailable: {e}")))?;
        listings.truncate(self.config.max_notices);
        let listed = listings.len();
        progress.notices_found(listed);

        progress.phase("Processing notices");
        // The delay sits upstream of the worker pool so notice starts stay
        // spaced out at any concurrency.
        let delay = self.config.request_delay;
        let mut notices: Vec<NoticeReport> = stream::iter(listings.into_iter().enumerate())
            .then(move |(index, listing)| async move {
                if index > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                listing
            })
            .take_while(|_| future::ready(!self.cancel.load(Ordering::SeqCst)))
            .map(|listing| async move {
                let report = self.process(listing).await?;
                progress.notice_done(&report);
                Ok::<_, TenderError>(report)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;
        notices.sort_by_key(|n| n.position);

        let cancelled = notices.len() < listed;
        if cancelled {
            warn!(processed = notices.len(), listed, "run cancelled");
        }

        let stats = RunStats::tally(&notices, listed, cancelled);
        if let (Some(store), Some(id)) = (&self.store, run_id.as_deref()) {
            let stats_json = serde_json::to_string(&stats)
                .map_err(|e| TenderError::Storage(format!("serialize run stats: {e}")))?;
            store.finish_run(id, &stats_json).await?;
        }

        let summary = RunSummary {
            run_id,
            stats,
            notices,
            elapsed: start.elapsed(),
        };
        info!(
            listed = summary.stats.listed,
            new = summary.stats.new,
            changed = summary.stats.changed,
            unchanged = summary.stats.unchanged,
            failed = summary.stats.failed,
            decided = summary.stats.decided,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(&summary);
        Ok(summary)
    }

    #[instrument(skip_all, fields(position = listing.position, title = %listing.title))]
    async fn process(&self, listing: NoticeListing) -> Result<NoticeReport> {
        let mut report = NoticeReport {
            position: listing.position,
            title: listing.title.clone(),
            url: listing.url.as_ref().map(|u| u.to_string()),
            published_at: listing.published_at,
            canonical_key: None,
            outcome: NoticeOutcome::Unchanged,
        };

        let raw = match listing.inline_content.as_deref() {
            Some(content) if !content.trim().is_empty() => content.to_string(),
            _ => match self.source.fetch_detail(&listing).await {
                Ok(content) => content,
                Err(e) => return Ok(report.failed(e.into())),
            },
        };
        let extraction = match extract(&raw) {
            Ok(extraction) => extraction,
            Err(e) => return Ok(report.failed(e.into())),
        };

        let candidate = identity::resolve(listing, raw);
        let key = candidate.canonical_key().clone();
        report.canonical_key = Some(key.clone());

        let content_hash = ContentHash::of(&extraction.text);
        let stored = match &self.store {
            Some(store) => store.get_by_canonical_key(&key).await?,
            None => None,
        };
        let change = identity::classify(
            stored.as_ref().map(|record| &record.content_hash),
            &content_hash,
            self.config.force,
        );
        info!(%key, change = change.as_str(), "change status");
        if !change.needs_processing() {
            return Ok(report);
        }

        let decision = if self.config.analyze {
            let input = NoticeInput {
                title: &candidate.title,
                text: &extraction.text,
                fields: &extraction.fields,
            };
            Some(self.engine.decide(&input).await)
        } else {
            None
        };

        let persisted = match &self.store {
            Some(store) => {
                let fields = NoticeFields {
                    canonical_key: key.clone(),
                    title: candidate.title.clone(),
                    url: candidate.url.as_ref().map(|u| u.to_string()),
                    source_item_id: candidate.source_item_id.clone(),
                    published_at: candidate.published_at,
                    raw_text: extraction.text.clone(),
                    content_hash,
                    extracted: extraction.fields.clone(),
                };
                store.upsert(&fields, decision.as_ref()).await?;
                info!(%key, "notice persisted");
                true
            }
            None => false,
        };

        report.outcome = NoticeOutcome::Processed {
            change,
            decision,
            persisted,
        };
        Ok(report)
    }
}

impl NoticeReport {
    fn failed(mut self, err: PipelineError) -> Self {
        warn!(kind = err.kind(), error = %err, title = %self.title, "notice failed");
        self.outcome = NoticeOutcome::Failed {
            kind: err.kind().to_string(),
            error: err.to_string(),
        };
        self
    }
}
