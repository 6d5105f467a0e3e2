use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_LLM_MODEL: &str = "mixtral-8x7b-32768";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub llm: LlmConfig,
    pub rate_limit: RateLimitConfig,
    pub scrape: ScrapeConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub redis_url: String,
    pub redis_token: String,
    pub max_requests: u64,
    pub window: Duration,
    pub timeout: Duration,
    pub prefix: String,
    /// Let traffic through when the counter store cannot be reached.
    pub fail_open: bool,
    /// Read the client address from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_forwarded_for: bool,
}

#[derive(Clone, Debug)]
pub struct ScrapeConfig {
    pub fetch_timeout: Duration,
    pub navigation_timeout: Duration,
    pub element_timeout: Duration,
    pub chrome_executable: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::ConfigError(format!("{key} must be set")))
        };

        let llm = LlmConfig {
            api_key: required("GROQ_API_KEY")?,
            base_url: lookup("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            model: lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        };

        let rate_limit = RateLimitConfig {
            redis_url: required("UPSTASH_REDIS_REST_URL")?,
            redis_token: required("UPSTASH_REDIS_REST_TOKEN")?,
            max_requests: parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 100)?,
            window: Duration::from_secs(parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 10)?),
            timeout: Duration::from_millis(parse_or(&lookup, "RATE_LIMIT_TIMEOUT_MS", 5000)?),
            prefix: lookup("RATE_LIMIT_PREFIX").unwrap_or_else(|| "rate-limit".to_string()),
            fail_open: parse_or(&lookup, "RATE_LIMIT_FAIL_OPEN", false)?,
            trust_forwarded_for: parse_or(&lookup, "TRUST_FORWARDED_FOR", false)?,
        };
        if rate_limit.max_requests == 0 || rate_limit.window.is_zero() {
            return Err(AppError::ConfigError(
                "rate limit quota and window must be positive".to_string(),
            ));
        }

        let scrape = ScrapeConfig {
            fetch_timeout: Duration::from_secs(parse_or(&lookup, "STATIC_FETCH_TIMEOUT_SECS", 10)?),
            navigation_timeout: Duration::from_secs(parse_or(&lookup, "BROWSER_NAVIGATION_TIMEOUT_SECS", 30)?),
            element_timeout: Duration::from_secs(parse_or(&lookup, "BROWSER_ELEMENT_TIMEOUT_SECS", 30)?),
            chrome_executable: lookup("CHROME_EXECUTABLE").map(PathBuf::from),
        };

        // Load server configuration with defaults
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_or(&lookup, "PORT", 3000)?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            llm,
            rate_limit,
            scrape,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {key}: {e}"))),
        None => Ok(default),
    }
}
