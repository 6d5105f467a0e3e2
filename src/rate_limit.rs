//! Fixed-window rate limiting keyed by client IP.
//!
//! Counting lives in an external store; the limiter only derives the window
//! key and turns the returned count into a decision.

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use crate::api::response;
use crate::config::RateLimitConfig;
use crate::error::{AppError, Result};

pub const FALLBACK_IP: &str = "127.0.0.1";

/// Increments `KEYS[1]` and starts its expiry on the first hit of a window.
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window = ARGV[1]
local r = redis.call("INCR", key)
if r == 1 then
  redis.call("PEXPIRE", key, window)
end
return r
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix time in milliseconds at which the current window ends.
    pub reset: u64,
}

impl RateLimitDecision {
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(self.reset));
    }
}

/// Shared counter backing the limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Adds one hit to `key` and returns the new count. The key expires
    /// `window` after its first hit.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64>;
}

/// Upstash Redis over its REST API.
#[derive(Clone)]
pub struct UpstashStore {
    http: Client,
    url: String,
    token: String,
}

#[derive(Deserialize)]
struct UpstashReply {
    result: Option<serde_json::Value>,
    error: Option<String>,
}

impl UpstashStore {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl CounterStore for UpstashStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let command = serde_json::json!([
            "EVAL",
            FIXED_WINDOW_SCRIPT,
            "1",
            key,
            window.as_millis().to_string(),
        ]);

        let res = self
            .http
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|e| AppError::RateLimitError(e.to_string()))?;

        let status = res.status();
        let reply: UpstashReply = res
            .json()
            .await
            .map_err(|e| AppError::RateLimitError(format!("{status}: {e}")))?;

        if let Some(error) = reply.error {
            return Err(AppError::RateLimitError(error));
        }
        reply
            .result
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| AppError::RateLimitError("unexpected counter reply".to_string()))
    }
}

/// In-process counters for local runs and tests. Not shared between processes.
#[derive(Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| AppError::RateLimitError("counter lock poisoned".to_string()))?;

        counters.retain(|_, (_, expires_at)| *expires_at > now);
        let entry = counters.entry(key.to_string()).or_insert((0, now + window));
        entry.0 += 1;
        Ok(entry.0)
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    max_requests: u64,
    window: Duration,
    timeout: Duration,
    prefix: String,
    fail_open: bool,
    trust_forwarded_for: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            max_requests: config.max_requests,
            window: config.window,
            timeout: config.timeout,
            prefix: config.prefix.clone(),
            fail_open: config.fail_open,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    pub async fn limit(&self, identifier: &str) -> Result<RateLimitDecision> {
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.limit_at(identifier, now_ms).await
    }

    /// Counts one request from `identifier` at `now_ms` (Unix milliseconds).
    pub async fn limit_at(&self, identifier: &str, now_ms: u64) -> Result<RateLimitDecision> {
        let window_ms = (self.window.as_millis() as u64).max(1);
        let bucket = now_ms / window_ms;
        let key = format!("{}:{}:{}", self.prefix, identifier, bucket);

        let used = tokio::time::timeout(self.timeout, self.store.increment(&key, self.window))
            .await
            .map_err(|_| AppError::RateLimitError(format!("counter store timed out after {:?}", self.timeout)))??;

        Ok(RateLimitDecision {
            allowed: used <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(used),
            reset: (bucket + 1) * window_ms,
        })
    }

    fn client_ip(&self, req: &Request) -> String {
        let headers = req.headers();
        if self.trust_forwarded_for {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| FALLBACK_IP.to_string())
    }
}

/// Middleware that rejects clients over quota and stamps the quota headers
/// on everything it lets through.
pub async fn enforce(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
    let ip = limiter.client_ip(&req);

    let decision = match limiter.limit(&ip).await {
        Ok(decision) => decision,
        Err(err) if limiter.fail_open => {
            tracing::warn!(%ip, error = %err, "rate limiter unavailable, allowing request");
            return next.run(req).await;
        }
        Err(err) => {
            tracing::error!(%ip, error = %err, "rate limiting middleware error");
            return response::internal_error().into_response();
        }
    };

    tracing::info!(
        %ip,
        result = if decision.allowed { "allowed" } else { "exceeded" },
        "rate limiting result"
    );

    if !decision.allowed {
        return response::rate_limited(&decision).into_response();
    }

    let mut res = next.run(req).await;
    decision.write_headers(res.headers_mut());
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(max_requests: u64, window: Duration) -> RateLimitConfig {
        RateLimitConfig {
            redis_url: String::new(),
            redis_token: String::new(),
            max_requests,
            window,
            timeout: Duration::from_secs(5),
            prefix: "rate-limit".to_string(),
            fail_open: false,
            trust_forwarded_for: false,
        }
    }

    fn memory_limiter(max_requests: u64) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), &config(max_requests, Duration::from_secs(10)))
    }

    #[tokio::test]
    async fn quota_is_exhausted_then_renewed_next_window() {
        let limiter = memory_limiter(3);
        let start = 1_700_000_000_000;

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.limit_at("10.0.0.1", start).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.limit_at("10.0.0.1", start + 1).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.limit, 3);
        assert_eq!(denied.reset, start + 10_000);

        let next_window = limiter.limit_at("10.0.0.1", start + 10_000).await.unwrap();
        assert!(next_window.allowed);
        assert_eq!(next_window.remaining, 2);
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let limiter = memory_limiter(1);
        let now = 50_000;

        assert!(limiter.limit_at("10.0.0.1", now).await.unwrap().allowed);
        assert!(!limiter.limit_at("10.0.0.1", now).await.unwrap().allowed);
        assert!(limiter.limit_at("10.0.0.2", now).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn reset_is_the_end_of_the_window() {
        let limiter = memory_limiter(5);
        let decision = limiter.limit_at("ip", 25_500).await.unwrap();
        assert_eq!(decision.reset, 30_000);
    }

    struct Stalled;

    #[async_trait]
    impl CounterStore for Stalled {
        async fn increment(&self, _key: &str, _window: Duration) -> Result<u64> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        }
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let mut cfg = config(5, Duration::from_secs(10));
        cfg.timeout = Duration::from_millis(20);
        let limiter = RateLimiter::new(Arc::new(Stalled), &cfg);

        assert!(matches!(limiter.limit("ip").await, Err(AppError::RateLimitError(_))));
    }

    #[tokio::test]
    async fn upstash_store_evaluates_the_window_script() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!([
                "EVAL",
                FIXED_WINDOW_SCRIPT,
                "1",
                "rate-limit:10.0.0.1:170",
                "10000"
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": 4 })))
            .expect(1)
            .mount(&server)
            .await;

        let store = UpstashStore::new(server.uri(), "secret");
        let count = store
            .increment("rate-limit:10.0.0.1:170", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn upstash_error_reply_is_a_limiter_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({ "error": "WRONGPASS" })),
            )
            .mount(&server)
            .await;

        let store = UpstashStore::new(server.uri(), "bad");
        match store.increment("k", Duration::from_secs(1)).await {
            Err(AppError::RateLimitError(msg)) => assert_eq!(msg, "WRONGPASS"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn client_ip_prefers_trusted_forwarded_header() {
        let mut cfg = config(1, Duration::from_secs(1));
        cfg.trust_forwarded_for = true;
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), &cfg);

        let req = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(limiter.client_ip(&req), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_socket_then_loopback() {
        let limiter = memory_limiter(1);

        let mut req = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(limiter.client_ip(&req), FALLBACK_IP);

        let addr: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(limiter.client_ip(&req), "192.0.2.10");
    }
}
