use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Body of a 429 from the rate limiter.
#[derive(Debug, Serialize)]
pub struct RateLimitedBody {
    pub message: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}

/// Body of a 500 from the rate limiter.
#[derive(Debug, Serialize)]
pub struct MiddlewareErrorBody {
    pub message: String,
}
