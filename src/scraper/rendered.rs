use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use super::{PageFetcher, ScrapedPage};

const TITLE_SELECTOR: &str = "h1";
const CONTENT_SELECTOR: &str = ".content";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Renders a page in a fresh headless Chrome and reads its heading and
/// `.content` region.
///
/// Every call launches its own browser with a throwaway profile and tears
/// both down before returning.
#[derive(Clone, Debug)]
pub struct RenderedScraper {
    navigation_timeout: Duration,
    element_timeout: Duration,
    chrome_executable: Option<PathBuf>,
}

impl RenderedScraper {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout,
            element_timeout: config.element_timeout,
            chrome_executable: config.chrome_executable.clone(),
        }
    }

    fn session_dir() -> PathBuf {
        let id = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "web-chat-scraper-{}-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis(),
            id
        ))
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .request_timeout(self.navigation_timeout)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");

        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| ScrapeError::Browser(format!("Failed to build browser config: {e}")))
    }

    async fn read_page(&self, browser: &Browser, url: &str) -> Result<ScrapedPage, ScrapeError> {
        let page = browser.new_page("about:blank").await?;

        tokio::time::timeout(self.navigation_timeout, async {
            page.goto(url).await?;
            // Settle any redirects or client-side navigation started on load.
            page.wait_for_navigation().await?;
            Ok::<_, ScrapeError>(())
        })
        .await
        .map_err(|_| ScrapeError::Timeout("navigation"))??;

        let title = tokio::time::timeout(self.element_timeout, wait_for_text(&page, TITLE_SELECTOR))
            .await
            .map_err(|_| ScrapeError::Timeout("waiting for page heading"))?;
        let content = element_text(&page, CONTENT_SELECTOR).await;

        Ok(ScrapedPage::Rendered { title, content })
    }
}

/// Polls until `selector` exists, then returns its inner text.
async fn wait_for_text(page: &Page, selector: &str) -> Option<String> {
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return element.inner_text().await.ok().flatten();
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn element_text(page: &Page, selector: &str) -> Option<String> {
    let element = page.find_element(selector).await.ok()?;
    element.inner_text().await.ok().flatten()
}

#[async_trait]
impl PageFetcher for RenderedScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        self.scrape_with_profile(url, &Self::session_dir()).await
    }
}

impl RenderedScraper {
    /// Runs one browser session in `profile_dir` and removes the directory
    /// afterwards, whether the launch, the page read or the shutdown failed.
    async fn scrape_with_profile(&self, url: &str, profile_dir: &Path) -> Result<ScrapedPage, ScrapeError> {
        let result = self.run_session(url, profile_dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(profile_dir).await {
            tracing::debug!(dir = %profile_dir.display(), error = %e, "failed to remove browser profile");
        }

        result
    }

    async fn run_session(&self, url: &str, profile_dir: &Path) -> Result<ScrapedPage, ScrapeError> {
        let config = self.browser_config(profile_dir)?;
        let (mut browser, mut handler) = Browser::launch(config).await?;

        // The handler drives the CDP connection and must be polled until the browser exits.
        let driver = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler event failed");
                }
            }
        });

        let result = self.read_page(&browser, url).await;
        shutdown(&mut browser).await;
        driver.abort();

        result
    }
}

/// Closes the browser, killing the process if it does not exit in time.
async fn shutdown(browser: &mut Browser) {
    let closed = match browser.close().await {
        Ok(_) => tokio::time::timeout(SHUTDOWN_TIMEOUT, browser.wait()).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to close browser");
            false
        }
    };

    if !closed {
        if let Some(Err(e)) = browser.kill().await {
            tracing::warn!(error = %e, "failed to kill browser process");
        }
    }
}
