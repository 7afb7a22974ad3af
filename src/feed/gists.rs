use super::types::*;
use super::FeedSource;
use crate::config::FeedConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::time::Duration;

const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_RESET: &str = "x-ratelimit-reset";

pub struct GistsApi {
    client: Client,
    base_url: String,
}

/// Parse a numeric rate header. Tolerates float formatting (e.g. "59.0").
fn parse_rate_header(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

/// Extract rate metadata. A missing remaining header falls back to
/// [`DEFAULT_RATE_REMAINING`].
pub fn rate_from_headers(headers: &HeaderMap) -> RateMetadata {
    let reset_at = parse_rate_header(headers, HEADER_RESET)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    RateMetadata {
        remaining: parse_rate_header(headers, HEADER_REMAINING).unwrap_or(DEFAULT_RATE_REMAINING),
        limit: parse_rate_header(headers, HEADER_LIMIT),
        reset_at,
    }
}

/// `<base>?since=<ISO-8601 UTC>`
pub fn build_url(base_url: &str, since: DateTime<Utc>) -> String {
    format!(
        "{}?since={}",
        base_url,
        since.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

impl GistsApi {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("failed to build feed HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FeedSource for GistsApi {
    async fn fetch(&self, since: DateTime<Utc>) -> Result<FeedResponse, FetchError> {
        let url = build_url(&self.base_url, since);

        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        // Read rate headers before looking at the status
        let rate = rate_from_headers(resp.headers());

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
                rate,
            });
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                return Err(FetchError::Body {
                    message: e.to_string(),
                    rate,
                })
            }
        };

        Ok(FeedResponse { body, rate })
    }
}
