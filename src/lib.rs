pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod rate_limit;
pub mod scraper;
pub mod summarizer;

use std::sync::Arc;
use chat::ChatService;
use rate_limit::RateLimiter;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub limiter: Arc<RateLimiter>,
}
