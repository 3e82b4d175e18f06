//! Shared types, error model, and configuration for TenderWatch.
//!
//! This crate is the foundation depended on by all other TenderWatch crates.
//! It provides:
//! - [`TenderError`] and the per-stage error types
//! - Domain types ([`NoticeCandidate`], [`CanonicalKey`], [`ContentHash`], [`Decision`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)
//! - [`RetryPolicy`], shared by the fetch tiers and the completion call

pub mod config;
pub mod decision;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionConfig, DecisionConfig, FetchConfig, KeywordGroup, ProfileConfig,
    QualityConfig, RegionRule, RendererConfig, RunConfig, RunDefaultsConfig, ScaleRange,
    SourceConfig, StorageConfig, TierConfig, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from, validate_config,
};
pub use decision::{
    Decision, DecisionMeta, DecisionRecord, DecisionSource, DecisionState, MatchLevel,
    QualityStatus, Verdict,
};
pub use error::{
    CompletionError, DecisionError, ExtractionError, FetchError, FetchFailureKind,
    PipelineError, Result, TenderError,
};
pub use retry::RetryPolicy;
pub use types::{
    CanonicalKey, ContentHash, ExtractedFields, NoticeCandidate, NoticeFields, NoticeId,
    NoticeListing, NoticeRecord,
};
