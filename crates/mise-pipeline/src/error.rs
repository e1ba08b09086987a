//! Stage and pipeline error types.
//!
//! Stage errors ([`ScrapeError`], [`FormatError`], [`SubstitutionError`]) are
//! candidate-level: the orchestrator logs them and moves on. Only
//! [`PipelineError`] reaches callers.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapeError {
    #[error("access forbidden (HTTP {0})")]
    Forbidden(u16),

    #[error("page not found")]
    NotFound,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out")]
    Timeout,

    #[error("content too short: {len} characters, need {min}")]
    TooShort { len: usize, min: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("model call failed: {0}")]
    Llm(String),

    #[error("malformed model output: {0}")]
    Parse(String),

    #[error("invalid recipe: {0}")]
    Invalid(String),

    #[error("timed out")]
    Timeout,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubstitutionError {
    #[error("model call failed: {0}")]
    Llm(String),

    #[error("malformed model output: {0}")]
    Parse(String),

    #[error("invalid substitution: {0}")]
    Invalid(String),

    #[error("disallowed ingredients remain: {}", .0.join(", "))]
    Unresolved(Vec<String>),

    #[error("timed out")]
    Timeout,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntentError {
    #[error("model call failed: {0}")]
    Llm(String),

    #[error("could not parse intent: {0}")]
    Parse(String),

    #[error("timed out")]
    Timeout,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("model call failed: {0}")]
    Llm(String),

    #[error("could not parse candidates: {0}")]
    Parse(String),

    #[error("timed out")]
    Timeout,
}

/// The per-candidate stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scraping,
    Formatting,
    Substituting,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Scraping => "scraping",
            Stage::Formatting => "formatting",
            Stage::Substituting => "substituting",
        };
        f.write_str(name)
    }
}

/// A failure of one candidate at one stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("scrape failed: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("format failed: {0}")]
    Format(#[from] FormatError),

    #[error("substitution failed: {0}")]
    Substitution(#[from] SubstitutionError),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Scrape(_) => Stage::Scraping,
            StageError::Format(_) => Stage::Formatting,
            StageError::Substitution(_) => Stage::Substituting,
        }
    }
}

/// Errors surfaced to callers of the orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("conversation {0} has no messages")]
    NoMessages(String),

    #[error("conversation is not about food: {explanation}")]
    OffTopic { explanation: String },

    #[error("intent extraction failed: {0}")]
    Intent(#[from] IntentError),

    #[error("candidate search failed: {0}")]
    Search(#[from] SearchError),

    #[error("no candidate sources found for '{query}'")]
    NoCandidates { query: String },

    #[error("all {count} candidates failed; last error: {last_error}", count = .attempted_urls.len())]
    AllCandidatesExhausted {
        attempted_urls: Vec<String>,
        last_error: StageError,
    },

    #[error(transparent)]
    Store(#[from] mise_core::Error),
}

impl PipelineError {
    /// Stable snake_case name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Unavailable(_) => "unavailable",
            PipelineError::NoMessages(_) => "no_messages",
            PipelineError::OffTopic { .. } => "off_topic",
            PipelineError::Intent(_) => "intent_failed",
            PipelineError::Search(_) => "search_failed",
            PipelineError::NoCandidates { .. } => "no_candidates",
            PipelineError::AllCandidatesExhausted { .. } => "all_candidates_exhausted",
            PipelineError::Store(e) if e.is_unavailable() => "unavailable",
            PipelineError::Store(mise_core::Error::NotFound(_)) => "not_found",
            PipelineError::Store(_) => "internal",
        }
    }
}
