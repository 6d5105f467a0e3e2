use axum::{
    response::{IntoResponse, Response},
    Json,
    http::StatusCode,
};
use serde::Serialize;

/// Body returned for every failure that escapes a request handler.
pub const GENERIC_ERROR: &str = "Something went wrong";

#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    #[error("LLM processing error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Rate limiter error: {0}")]
    RateLimitError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Callers get the same opaque body whatever failed; the cause goes to the log.
        tracing::error!(error = %self, "request failed");

        let body = Json(ErrorResponse {
            error: GENERIC_ERROR.to_string(),
        });

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Why a page could not be turned into text.
///
/// The `Display` output is the phrase shown to users when a scrape degrades,
/// the detail is only logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScrapeError {
    #[error("No article content found")]
    NoContent,

    #[error("Failed to scrape data from the provided URL.")]
    Http(String),

    #[error("Failed to scrape data from the provided URL with a headless browser.")]
    Browser(String),

    #[error("Timed out while scraping the provided URL.")]
    Timeout(&'static str),
}

impl ScrapeError {
    pub fn detail(&self) -> &str {
        match self {
            ScrapeError::NoContent => "no article element matched",
            ScrapeError::Http(msg) | ScrapeError::Browser(msg) => msg,
            ScrapeError::Timeout(stage) => stage,
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout("static fetch")
        } else {
            ScrapeError::Http(err.to_string())
        }
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
