//! Notice acquisition: the fetch cascade, list parsing, and headless rendering.
//!
//! This crate provides:
//! - [`engine`]: [`FetchOrchestrator`], the tiered fetch cascade
//! - [`listing`]: HTML notice-list parsing and source-id recovery
//! - [`renderer`]: the [`Renderer`] seam and its Browserless implementation

pub mod engine;
pub mod listing;
pub mod renderer;

pub use engine::{ContentKind, FetchOrchestrator, FetchTier, Fetched};
pub use listing::{parse_notice_list, source_item_id};
pub use renderer::{BrowserlessRenderer, RenderError, RenderedPage, Renderer, RowSelector};
