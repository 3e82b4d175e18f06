//! Decision pipeline for TenderWatch.
//!
//! This crate ties the fetch cascade, extraction and storage together with
//! the notice-level logic:
//! - [`identity`]: canonical keys and change detection
//! - [`quality`]: the input quality gate
//! - [`scoring`]: the deterministic rule scorer
//! - [`prompt`] and [`completion`]: model consultation
//! - [`decision`]: the [`DecisionEngine`] state machine
//! - [`pipeline`]: the [`PipelineCoordinator`] run loop

pub mod completion;
pub mod decision;
pub mod identity;
pub mod pipeline;
pub mod prompt;
pub mod quality;
pub mod scoring;

pub use completion::{CompletionService, OllamaClient};
pub use decision::{DecisionEngine, NoticeInput};
pub use identity::ChangeStatus;
pub use pipeline::{
    NoticeOutcome, NoticeReport, NoticeSource, NoticeStore, PipelineCoordinator,
    ProgressReporter, RunStats, RunSummary, SilentProgress,
};
pub use quality::{QualityAssessment, QualityGate};
pub use scoring::{RuleScoreResult, RuleScorer};
