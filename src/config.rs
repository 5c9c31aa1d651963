use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::models::DEFAULT_MAX_REVIEWS;
use crate::services::analyzer::RetryPolicy;

const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_REVIEW_SITE_URL: &str = "https://www.goodreads.com";

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub retry: RetryPolicy,
    pub review_site_url: Url,
    pub fetch_timeout: Duration,
    pub max_reviews: usize,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let llm_api_key = lookup("LLM_API_KEY")
            .or_else(|| lookup("GROQ_API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .context("LLM_API_KEY (or GROQ_API_KEY) must be set")?;

        let review_site_url = string_or("REVIEW_SITE_URL", DEFAULT_REVIEW_SITE_URL);
        let review_site_url = Url::parse(&review_site_url)
            .with_context(|| format!("REVIEW_SITE_URL is not a valid URL: {review_site_url}"))?;

        Ok(Self {
            bind_addr: string_or("BIND_ADDR", "0.0.0.0:3000"),
            llm_api_url: string_or("LLM_API_URL", DEFAULT_LLM_API_URL),
            llm_api_key,
            llm_model: string_or("LLM_MODEL", DEFAULT_LLM_MODEL),
            llm_timeout: Duration::from_secs(parse_or(&lookup, "LLM_TIMEOUT_SECS", 60)?),
            retry: RetryPolicy {
                max_retries: parse_or(&lookup, "LLM_MAX_RETRIES", 1)?,
                backoff: Duration::from_millis(parse_or(&lookup, "LLM_RETRY_BACKOFF_MS", 1000)?),
            },
            review_site_url,
            fetch_timeout: Duration::from_secs(parse_or(&lookup, "REVIEW_FETCH_TIMEOUT_SECS", 10)?),
            max_reviews: parse_or(&lookup, "MAX_REVIEWS", DEFAULT_MAX_REVIEWS)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        None => Ok(default),
    }
}
