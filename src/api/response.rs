use axum::Json;
use axum::http::StatusCode;
use crate::api::models::{ChatResponse, MiddlewareErrorBody, RateLimitedBody};
use crate::rate_limit::RateLimitDecision;

pub const TOO_MANY_REQUESTS: &str = "Too many requests. Please try again later.";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

pub fn chat_reply(response: String) -> (StatusCode, Json<ChatResponse>) {
    (StatusCode::OK, Json(ChatResponse { response }))
}

pub fn rate_limited(decision: &RateLimitDecision) -> (StatusCode, Json<RateLimitedBody>) {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RateLimitedBody {
            message: TOO_MANY_REQUESTS.to_string(),
            limit: decision.limit,
            remaining: decision.remaining,
            reset: decision.reset,
        }),
    )
}

pub fn internal_error() -> (StatusCode, Json<MiddlewareErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MiddlewareErrorBody {
            message: INTERNAL_SERVER_ERROR.to_string(),
        }),
    )
}
