//! Candidate Search Provider: ordered list of recipe source pages.
//!
//! Providers with a web search tool look the pages up live. Others are asked
//! for well-known pages they remember; the same URL filtering applies to both.

use std::collections::HashSet;
use std::sync::Arc;

use mise_core::DietaryProfile;
use mise_llm::{parse, LlmClient, LlmRequest, LlmTask, WebSearch};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::error::SearchError;
use crate::types::CandidateSource;

const SYSTEM_PROMPT: &str = "You find recipe pages on the web. Use web search, then respond \
with a JSON array and nothing else, best match first:
[{\"title\": string, \"url\": string, \"snippet\": string}]

Only include pages that contain a full recipe with an ingredient list and steps. Use the exact \
page URL from the search results. An empty array is a valid answer.";

const KNOWLEDGE_PROMPT: &str = "You suggest recipe pages you know from well-established \
recipe sites. You cannot browse, so only list URLs you are confident exist. Respond with a \
JSON array and nothing else, best match first:
[{\"title\": string, \"url\": string, \"snippet\": string}]

Only include pages that contain a full recipe with an ingredient list and steps. An empty \
array is a valid answer.";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCandidates {
    List(Vec<RawCandidate>),
    Wrapped { candidates: Vec<RawCandidate> },
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

pub struct CandidateSearch {
    llm: Arc<dyn LlmClient>,
    blocked_domains: Vec<String>,
    max_candidates: usize,
    max_tokens: usize,
}

impl CandidateSearch {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        blocked_domains: Vec<String>,
        max_candidates: usize,
        max_tokens: usize,
    ) -> Self {
        let blocked_domains = blocked_domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            llm,
            blocked_domains,
            max_candidates,
            max_tokens,
        }
    }

    /// Ordered candidates for `query`. An empty list is a valid result.
    pub async fn search(
        &self,
        query: &str,
        profile: &DietaryProfile,
    ) -> Result<Vec<CandidateSource>, SearchError> {
        let mut prompt = build_prompt(query, profile, self.max_candidates);
        let request = if self.llm.supports_web_search() {
            LlmRequest::new(LlmTask::SearchCandidates, prompt, self.max_tokens)
                .with_system(SYSTEM_PROMPT)
                .with_web_search(WebSearch {
                    blocked_domains: self.blocked_domains.clone(),
                    max_uses: 3,
                })
        } else {
            debug!("{} has no web search; asking for known pages", self.llm.model());
            if !self.blocked_domains.is_empty() {
                prompt.push_str(&format!(
                    "\nDo not suggest pages from: {}",
                    self.blocked_domains.join(", ")
                ));
            }
            LlmRequest::new(LlmTask::SearchCandidates, prompt, self.max_tokens)
                .with_system(KNOWLEDGE_PROMPT)
        };

        let output = self
            .llm
            .complete(request)
            .await
            .map_err(|e| SearchError::Llm(e.to_string()))?;
        let raw: RawCandidates = parse::decode(&output).map_err(SearchError::Parse)?;
        let raw = match raw {
            RawCandidates::List(list) | RawCandidates::Wrapped { candidates: list } => list,
        };
        let found = raw.len();
        let candidates = self.filter(raw);
        debug!(
            "Search '{}': {} results, {} usable candidates",
            query,
            found,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Keep http(s) URLs outside the blocklist, first occurrence of each URL
    /// (case-insensitive), at most `max_candidates`.
    fn filter(&self, raw: Vec<RawCandidate>) -> Vec<CandidateSource> {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(|c| {
                let url = c.url.trim().to_string();
                let host = http_host(&url)?;
                if is_blocked(&host, &self.blocked_domains) {
                    debug!("Dropping blocked candidate {}", url);
                    return None;
                }
                if !seen.insert(url.to_lowercase()) {
                    return None;
                }
                Some(CandidateSource {
                    title: c.title.trim().to_string(),
                    url,
                    snippet: c.snippet.trim().to_string(),
                })
            })
            .take(self.max_candidates)
            .collect()
    }
}

fn build_prompt(query: &str, profile: &DietaryProfile, max_candidates: usize) -> String {
    let mut prompt = format!(
        "Find up to {} recipe pages for: {}",
        max_candidates,
        query.trim()
    );
    if profile.has_constraints() {
        prompt.push_str(&format!(
            "\nPrefer recipes that suit this profile:\n{}",
            profile.prompt_summary()
        ));
    }
    prompt
}

fn http_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

/// Host equal to, or a subdomain of, a blocked domain.
fn is_blocked(host: &str, blocked: &[String]) -> bool {
    blocked.iter().any(|domain| {
        host == domain
            || host
                .strip_suffix(domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
