use std::sync::Arc;
use std::time::Instant;
use crate::error::Result;
use crate::llm::{ChatModel, Message};
use crate::scraper::WebScraper;
use crate::summarizer::Summarizer;

pub const WEB_INFO_HEADER: &str = "Here is some additional information from the web:";
pub const SUMMARY_FAILED: &str = "Failed to summarize the scraped content.";

/// Answers a chat message, optionally enriched with a summary of a web page.
#[derive(Clone)]
pub struct ChatService {
    model: Arc<dyn ChatModel>,
    scraper: WebScraper,
    summarizer: Summarizer,
}

impl ChatService {
    pub fn new(model: Arc<dyn ChatModel>, scraper: WebScraper) -> Self {
        let summarizer = Summarizer::new(model.clone());
        Self {
            model,
            scraper,
            summarizer,
        }
    }

    /// Only the primary completion can fail the request; a bad URL degrades
    /// to a short notice in the reply.
    pub async fn reply(&self, message: &str, url: Option<&str>) -> Result<String> {
        let started = Instant::now();
        let mut answer = self.model.complete(vec![Message::user(message)]).await?;
        tracing::debug!(elapsed = ?started.elapsed(), "primary completion finished");

        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            let web_info = self.web_info(url).await;
            answer.push_str("\n\n");
            answer.push_str(WEB_INFO_HEADER);
            answer.push('\n');
            answer.push_str(&web_info);
        }

        Ok(answer)
    }

    /// Summary of the page at `url`, or a short notice when it cannot be had.
    ///
    /// A failed scrape is reported as-is and never sent to the summarizer:
    /// the failure reason is already the whole message, and summarizing it
    /// would only spend a model call on a placeholder.
    async fn web_info(&self, url: &str) -> String {
        let page = match self.scraper.scrape(url).await {
            Ok(page) => page,
            Err(err) => return err.to_string(),
        };

        match self.summarizer.summarize(&page.to_text()).await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(%url, error = %err, "summarization failed");
                SUMMARY_FAILED.to_string()
            }
        }
    }
}
