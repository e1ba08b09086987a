//! Recipe generation pipeline.
//!
//! Turns a chat transcript into one safety-checked, deduplicated recipe:
//! intent → candidate search → per-candidate {scrape → format → constraint
//! check → substitution} → persist. Every per-candidate failure falls back to
//! the next candidate; see [`Orchestrator`].

pub mod config;
pub mod constraints;
pub mod error;
pub mod format;
pub mod html;
pub mod intent;
pub mod orchestrator;
pub mod policy;
pub mod scrape;
pub mod search;
pub mod substitute;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{PipelineSettings, UnresolvedPolicy};
pub use constraints::check;
pub use error::*;
pub use orchestrator::{Orchestrator, Stores};
pub use scrape::{FetchedPage, HttpFetcher, PageFetcher};
pub use types::*;
