use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use once_cell::sync::Lazy;
use crate::error::ScrapeError;
use super::{PageFetcher, ScrapedPage};

// Create static selectors to avoid recompiling them each time
static ARTICLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article").expect("Failed to parse article selector")
});

static ARTICLE_CLASS_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[class*="article"]"#).expect("Failed to parse article class selector")
});

/// Plain HTTP fetch followed by a parse-tree lookup of the article region.
#[derive(Clone)]
pub struct StaticScraper {
    client: Client,
}

impl StaticScraper {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ScrapeError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text().await?;
        Ok(html)
    }
}

#[async_trait]
impl PageFetcher for StaticScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        let html = self.fetch_html(url).await?;
        extract_article(&html)
            .map(ScrapedPage::Article)
            .ok_or(ScrapeError::NoContent)
    }
}

/// Text of the first `<article>`, else of the first `div` whose class
/// mentions "article". `None` when neither exists or both are blank.
pub fn extract_article(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document
        .select(&ARTICLE_SELECTOR)
        .next()
        .or_else(|| document.select(&ARTICLE_CLASS_SELECTOR).next())
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Text nodes go on separate lines so neighbouring blocks never fuse.
fn element_text(element: ElementRef<'_>) -> String {
    let raw = element.text().collect::<Vec<_>>().join("\n");
    format_text(&raw)
}

/// Trims every line and drops blank ones.
pub fn format_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(trimmed);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn article_element_wins() {
        let html = r#"<html><body>
            <div class="article-body">fallback</div>
            <article>
                Breaking news
            </article>
        </body></html>"#;

        assert_eq!(extract_article(html).as_deref(), Some("Breaking news"));
    }

    #[test]
    fn nested_markup_does_not_cut_the_article_short() {
        let html = "<article><section><article>inner</article></section><p>tail</p></article>";
        assert_eq!(extract_article(html).as_deref(), Some("inner\ntail"));
    }

    #[test]
    fn adjacent_blocks_keep_their_boundaries() {
        let html = "<article><h2>Rates</h2><p>Markets rallied.</p><p>Bonds fell.</p></article>";
        assert_eq!(
            extract_article(html).as_deref(),
            Some("Rates\nMarkets rallied.\nBonds fell.")
        );
    }

    #[test]
    fn falls_back_to_article_class() {
        let html = r#"<div class="page"><div class="main-article text">
            <p>First paragraph</p>
            <p>Second paragraph</p>
        </div></div>"#;

        assert_eq!(
            extract_article(html).as_deref(),
            Some("First paragraph\nSecond paragraph")
        );
    }

    #[test]
    fn pages_without_article_regions_yield_nothing() {
        assert_eq!(extract_article("<html><body><p>Just text</p></body></html>"), None);
        assert_eq!(extract_article(""), None);
        assert_eq!(extract_article("<article>   </article>"), None);
    }

    #[test]
    fn format_text_collapses_blank_lines() {
        assert_eq!(format_text("\n  a  \n\n\t b\n   \n"), "a\nb");
    }

    #[tokio::test]
    async fn scrapes_article_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><article> The story </article></body></html>"),
            )
            .mount(&server)
            .await;

        let scraper = StaticScraper::new(Duration::from_secs(5)).unwrap();
        let page = scraper.scrape(&format!("{}/story", server.uri())).await.unwrap();

        assert_eq!(page, ScrapedPage::Article("The story".to_string()));
    }

    #[tokio::test]
    async fn missing_article_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>nothing here</p>"))
            .mount(&server)
            .await;

        let scraper = StaticScraper::new(Duration::from_secs(5)).unwrap();
        let err = scraper.scrape(&server.uri()).await.unwrap_err();

        assert_eq!(err, ScrapeError::NoContent);
        assert_eq!(err.to_string(), "No article content found");
    }

    #[tokio::test]
    async fn error_status_is_an_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scraper = StaticScraper::new(Duration::from_secs(5)).unwrap();
        let err = scraper.scrape(&server.uri()).await.unwrap_err();

        assert!(matches!(err, ScrapeError::Http(_)));
    }

    #[tokio::test]
    async fn slow_server_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<article>late</article>")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let scraper = StaticScraper::new(Duration::from_millis(100)).unwrap();
        let err = scraper.scrape(&server.uri()).await.unwrap_err();

        assert_eq!(err, ScrapeError::Timeout("static fetch"));
    }
}
