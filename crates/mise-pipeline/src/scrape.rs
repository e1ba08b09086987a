//! Content Scraper: fetch a candidate page and extract its recipe text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ScrapeError;
use crate::html;
use crate::types::ScrapedContent;

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; mise/",
    env!("CARGO_PKG_VERSION"),
    "; +recipe-import)"
);

/// Raw HTTP response of a page fetch. Non-2xx statuses are returned here, not
/// as errors; mapping them is the scraper's job.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub html: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ScrapeError>;
}

/// reqwest-backed fetcher with a request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> mise_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| mise_core::Error::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ScrapeError> {
        let resp = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(request_error)?;
        let status = resp.status().as_u16();
        let html = resp.text().await.map_err(request_error)?;
        Ok(FetchedPage { status, html })
    }
}

fn request_error(e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout
    } else {
        ScrapeError::Network(e.to_string())
    }
}

pub struct ContentScraper {
    fetcher: Arc<dyn PageFetcher>,
    min_chars: usize,
}

impl ContentScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, min_chars: usize) -> Self {
        Self { fetcher, min_chars }
    }

    /// Fetch `url` and extract its text. Ordinary HTTP failures come back as
    /// typed errors for the caller's fallback loop.
    pub async fn scrape(
        &self,
        url: &str,
        site_heuristics: bool,
    ) -> Result<ScrapedContent, ScrapeError> {
        let page = self.fetcher.fetch(url).await?;
        check_status(page.status)?;

        let content = extract_content(&page.html, site_heuristics, self.min_chars);
        let len = content.text.chars().count();
        if len < self.min_chars {
            return Err(ScrapeError::TooShort {
                len,
                min: self.min_chars,
            });
        }
        debug!("Scraped {} characters from {}", len, url);
        Ok(content)
    }
}

fn check_status(status: u16) -> Result<(), ScrapeError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 | 429 | 451 => Err(ScrapeError::Forbidden(status)),
        404 | 410 => Err(ScrapeError::NotFound),
        other => Err(ScrapeError::Status(other)),
    }
}

/// Pick the page text. With heuristics on, the first of JSON-LD recipe,
/// recipe card, `<article>` that reaches `min_chars` wins; the body text is
/// the fallback either way. The image comes from JSON-LD, else `og:image`.
pub fn extract_content(page: &str, site_heuristics: bool, min_chars: usize) -> ScrapedContent {
    let og_image = || html::og_image(page);

    if site_heuristics {
        let json_ld = html::json_ld_recipe(page);
        let image_url = json_ld
            .as_ref()
            .and_then(|r| r.image_url.clone())
            .or_else(og_image);

        if let Some(recipe) = json_ld {
            if long_enough(&recipe.text, min_chars) {
                debug!("Using JSON-LD recipe block");
                return ScrapedContent {
                    text: recipe.text,
                    image_url,
                };
            }
        }
        let containers = [("recipe card", html::recipe_card(page)), ("article", html::article(page))];
        for (name, fragment) in containers {
            let Some(fragment) = fragment else { continue };
            let text = html::to_text(fragment);
            if long_enough(&text, min_chars) {
                debug!("Using {} container", name);
                return ScrapedContent { text, image_url };
            }
        }
        return ScrapedContent {
            text: html::to_text(html::body(page)),
            image_url,
        };
    }

    ScrapedContent {
        text: html::to_text(html::body(page)),
        image_url: og_image(),
    }
}

fn long_enough(text: &str, min_chars: usize) -> bool {
    text.chars().count() >= min_chars
}
