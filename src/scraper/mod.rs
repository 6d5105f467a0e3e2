//! Turning a user-supplied URL into text worth summarizing.
//!
//! A cheap keyword check on the URL decides between a plain HTTP fetch with
//! structural HTML extraction and a full headless-browser render.

pub mod rendered;
pub mod static_page;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use crate::error::ScrapeError;

pub use rendered::RenderedScraper;
pub use static_page::StaticScraper;

/// URL fragments that suggest the page only has content after scripts run.
pub const DYNAMIC_INDICATORS: [&str; 4] = ["wiley", "dynamic", "content", "interactive"];

pub const NO_TITLE: &str = "No title found";
pub const NO_CONTENT: &str = "No content found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Static,
    Rendered,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Static => f.write_str("static"),
            Strategy::Rendered => f.write_str("rendered"),
        }
    }
}

/// True when the URL contains any dynamic indicator. Case-sensitive.
pub fn requires_rendering(url: &str) -> bool {
    DYNAMIC_INDICATORS.iter().any(|indicator| url.contains(indicator))
}

pub fn select_strategy(url: &str) -> Strategy {
    if requires_rendering(url) {
        Strategy::Rendered
    } else {
        Strategy::Static
    }
}

/// What an extractor managed to read from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapedPage {
    /// Text of the article region of a static document.
    Article(String),
    /// Heading and content regions of a rendered page; either may be absent.
    Rendered {
        title: Option<String>,
        content: Option<String>,
    },
}

impl ScrapedPage {
    /// Text handed to the summarizer.
    pub fn to_text(&self) -> String {
        match self {
            ScrapedPage::Article(text) => text.clone(),
            ScrapedPage::Rendered { title, content } => format!(
                "Title: {}\nContent: {}",
                non_empty(title.as_deref()).unwrap_or(NO_TITLE),
                non_empty(content.as_deref()).unwrap_or(NO_CONTENT),
            ),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One way of fetching a page and extracting its text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, ScrapeError>;
}

/// Routes each URL to the static or rendered fetcher.
#[derive(Clone)]
pub struct WebScraper {
    static_fetcher: Arc<dyn PageFetcher>,
    rendered_fetcher: Arc<dyn PageFetcher>,
}

impl WebScraper {
    pub fn new(static_fetcher: Arc<dyn PageFetcher>, rendered_fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            static_fetcher,
            rendered_fetcher,
        }
    }

    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        let strategy = select_strategy(url);
        tracing::info!(%url, %strategy, "scraping page");

        let result = match strategy {
            Strategy::Static => self.static_fetcher.scrape(url).await,
            Strategy::Rendered => self.rendered_fetcher.scrape(url).await,
        };

        if let Err(err) = &result {
            tracing::warn!(%url, %strategy, error = %err, detail = err.detail(), "scrape failed");
        }
        result
    }
}
