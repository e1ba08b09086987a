//! Pipeline tuning, persisted to `pipeline-config.json` with env overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to do when a disallowed ingredient is still present after substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Log a warning and accept the substituted recipe.
    Warn,
    /// Fail the candidate so the next one is tried.
    Reject,
}

impl UnresolvedPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Some(Self::Warn),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Domains excluded from candidate search by default: social feeds, video
/// platforms and aggregators that rarely serve a scrapeable recipe body.
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "pinterest.com",
    "facebook.com",
    "instagram.com",
    "tiktok.com",
    "youtube.com",
    "reddit.com",
    "quora.com",
    "yummly.com",
    "amazon.com",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Upper bound on candidates taken from search.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Scraped text shorter than this is a scrape failure.
    #[serde(default = "default_min_scrape_chars")]
    pub min_scrape_chars: usize,
    /// Deadline applied to every stage call.
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Request timeout of the HTTP page fetcher.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Try JSON-LD and recipe-card extraction before falling back to the page body.
    #[serde(default = "default_true")]
    pub site_heuristics: bool,
    #[serde(default = "default_unresolved_policy")]
    pub unresolved_policy: UnresolvedPolicy,
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,
    /// Scraped text passed to the formatter is cut to this many characters.
    #[serde(default = "default_max_format_input_chars")]
    pub max_format_input_chars: usize,
    #[serde(default)]
    pub max_tokens: MaxTokens,
}

/// Completion budgets per model-backed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxTokens {
    #[serde(default = "default_intent_tokens")]
    pub intent: usize,
    #[serde(default = "default_search_tokens")]
    pub search: usize,
    #[serde(default = "default_format_tokens")]
    pub format: usize,
    #[serde(default = "default_substitute_tokens")]
    pub substitute: usize,
}

fn default_max_candidates() -> usize {
    5
}
fn default_min_scrape_chars() -> usize {
    200
}
fn default_stage_timeout_secs() -> u64 {
    45
}
fn default_fetch_timeout_secs() -> u64 {
    20
}
fn default_true() -> bool {
    true
}
fn default_unresolved_policy() -> UnresolvedPolicy {
    UnresolvedPolicy::Warn
}
fn default_blocked_domains() -> Vec<String> {
    DEFAULT_BLOCKED_DOMAINS.iter().map(|s| s.to_string()).collect()
}
fn default_max_format_input_chars() -> usize {
    12_000
}
fn default_intent_tokens() -> usize {
    512
}
fn default_search_tokens() -> usize {
    2048
}
fn default_format_tokens() -> usize {
    3000
}
fn default_substitute_tokens() -> usize {
    3000
}

impl Default for MaxTokens {
    fn default() -> Self {
        Self {
            intent: default_intent_tokens(),
            search: default_search_tokens(),
            format: default_format_tokens(),
            substitute: default_substitute_tokens(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            min_scrape_chars: default_min_scrape_chars(),
            stage_timeout_secs: default_stage_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            site_heuristics: true,
            unresolved_policy: default_unresolved_policy(),
            blocked_domains: default_blocked_domains(),
            max_format_input_chars: default_max_format_input_chars(),
            max_tokens: MaxTokens::default(),
        }
    }
}

impl PipelineSettings {
    /// Load settings from file (missing or unreadable → defaults), then apply
    /// `MISE_*` environment overrides.
    pub fn load(config_path: &Path) -> Self {
        let mut settings: PipelineSettings = match std::fs::read_to_string(config_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!(
                    "Ignoring invalid pipeline config {}: {}",
                    config_path.display(),
                    e
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("MISE_MAX_CANDIDATES").and_then(|v| v.parse().ok()) {
            self.max_candidates = v;
        }
        if let Some(v) = lookup("MISE_MIN_SCRAPE_CHARS").and_then(|v| v.parse().ok()) {
            self.min_scrape_chars = v;
        }
        if let Some(v) = lookup("MISE_STAGE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.stage_timeout_secs = v;
        }
        if let Some(v) = lookup("MISE_UNRESOLVED_POLICY") {
            match UnresolvedPolicy::parse(&v) {
                Some(policy) => self.unresolved_policy = policy,
                None => warn!("Unknown MISE_UNRESOLVED_POLICY '{}', keeping {:?}", v, self.unresolved_policy),
            }
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.max_candidates, 5);
        assert_eq!(settings.min_scrape_chars, 200);
        assert_eq!(settings.unresolved_policy, UnresolvedPolicy::Warn);
        assert!(settings.blocked_domains.iter().any(|d| d == "pinterest.com"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline-config.json");
        std::fs::write(&path, r#"{"max_candidates": 3, "unresolved_policy": "reject"}"#).unwrap();

        let mut settings: PipelineSettings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        settings.apply_env(|_| None);
        assert_eq!(settings.max_candidates, 3);
        assert_eq!(settings.unresolved_policy, UnresolvedPolicy::Reject);
        assert_eq!(settings.min_scrape_chars, 200);
        assert_eq!(settings.max_tokens.format, 3000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MISE_MAX_CANDIDATES", "8"),
            ("MISE_MIN_SCRAPE_CHARS", "not-a-number"),
            ("MISE_UNRESOLVED_POLICY", "Reject"),
        ]
        .into_iter()
        .collect();

        let mut settings = PipelineSettings::default();
        settings.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.max_candidates, 8);
        assert_eq!(settings.min_scrape_chars, 200);
        assert_eq!(settings.unresolved_policy, UnresolvedPolicy::Reject);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline-config.json");
        std::fs::write(&path, "{not json").unwrap();
        let settings = PipelineSettings::load(&path);
        assert_eq!(settings.stage_timeout_secs, 45);
    }
}
