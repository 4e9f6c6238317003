// src/services/http.rs

//! HTTP GET with bounded retry and backoff.
//!
//! Connection errors, timeouts and 429/500/502/503/504 are retried with
//! exponential backoff, or after the server's `Retry-After` when present.
//! Everything else fails immediately. Exhausting the attempts yields a
//! transient [`FetchFailure`] value; nothing is raised to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use url::Url;

use crate::error::{FetchFailure, Result};
use crate::models::{HttpConfig, ResourcePage};

/// Statuses worth another attempt.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// A response as seen by the retry loop.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    /// `x-total-count` header, when present
    pub total_count: Option<u64>,
    pub body: Vec<u8>,
}

/// Why no response arrived at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    /// The request could not even be built
    Invalid,
    Other,
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn is_retryable(&self) -> bool {
        self.kind != TransportErrorKind::Invalid
    }
}

/// The single network operation the collector needs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> std::result::Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url) -> std::result::Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let total_count = headers
            .get("x-total-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec();

        Ok(RawResponse {
            status,
            retry_after,
            total_count,
            body,
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_builder() {
        TransportErrorKind::Invalid
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, error.to_string())
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    // A date in the past means "now".
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Retry bounds and delays.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound applied to server-supplied `Retry-After`
    pub retry_after_cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            retry_after_cap: Duration::from_secs(config.retry_after_cap_secs),
        }
    }

    /// Computed delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Server hint wins over computed backoff, within the cap.
    fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.retry_after_cap),
            None => self.backoff(attempt),
        }
    }
}

/// GET client with bounded retry, shared by every data source.
#[derive(Clone)]
pub struct HttpRetryClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl HttpRetryClient {
    /// Build a client over `reqwest` from configuration.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            RetryPolicy::from_config(config),
        ))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with `params` appended to its query and parse the page.
    pub async fn request(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<ResourcePage, FetchFailure> {
        let target = build_url(url, params)
            .map_err(|e| FetchFailure::permanent(url, 0, format!("invalid URL: {e}")))?;
        let (response, attempts) = self.get_with_retry(&target).await?;

        let body: Value = serde_json::from_slice(&response.body).map_err(|e| {
            FetchFailure::permanent(target.as_str(), attempts, format!("malformed JSON body: {e}"))
                .with_status(response.status)
        })?;

        ResourcePage::from_json(body, response.total_count).map_err(|message| {
            FetchFailure::permanent(target.as_str(), attempts, message).with_status(response.status)
        })
    }

    async fn get_with_retry(
        &self,
        url: &Url,
    ) -> std::result::Result<(RawResponse, u32), FetchFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let (failure, retry_after) = match self.transport.get(url).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    if attempt > 1 {
                        log::info!("{} succeeded on attempt {}", url, attempt);
                    }
                    return Ok((response, attempt));
                }
                Ok(response) if RETRYABLE_STATUSES.contains(&response.status) => (
                    FetchFailure::transient(url.as_str(), attempt, format!("HTTP {}", response.status))
                        .with_status(response.status),
                    response.retry_after,
                ),
                Ok(response) => {
                    log::warn!("{} returned HTTP {}, not retrying", url, response.status);
                    return Err(FetchFailure::permanent(
                        url.as_str(),
                        attempt,
                        format!("HTTP {}", response.status),
                    )
                    .with_status(response.status));
                }
                Err(error) if error.is_retryable() => (
                    FetchFailure::transient(url.as_str(), attempt, &error.message),
                    None,
                ),
                Err(error) => {
                    return Err(FetchFailure::permanent(url.as_str(), attempt, &error.message));
                }
            };

            if attempt >= max_attempts {
                log::error!("Giving up on {} after {} attempts: {}", url, attempt, failure.message);
                return Err(failure);
            }

            let delay = self.policy.delay(attempt, retry_after);
            log::warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                url,
                failure.message,
                delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn build_url(base: &str, params: &[(&str, String)]) -> std::result::Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}
