//! Rate-limit aware HTTP GET
//!
//! [`Fetcher`] issues one GET at a time. A response that signals an exhausted rate
//! allowance (403 or 429 with `x-ratelimit-remaining: 0`) puts the whole run to
//! sleep until `x-ratelimit-reset`, then repeats the same request. That loop is
//! unbounded. Transport failures, including a body that times out or arrives
//! truncated, get a bounded backoff via [`crate::retry::Backoff`]; every other
//! non-success status fails immediately.

use crate::config::{Config, Credentials, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::{Backoff, IsRetryable};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, LAST_MODIFIED};
use std::time::Duration;
use url::Url;

const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATELIMIT_RESET: &str = "x-ratelimit-reset";
const RATELIMIT_USED: &str = "x-ratelimit-used";
const RATELIMIT_LIMIT: &str = "x-ratelimit-limit";

/// A fully read successful response
#[derive(Debug, Clone)]
pub struct Fetched {
    /// URL the response was served from (after redirects)
    pub url: Url,
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl Fetched {
    /// The `Last-Modified` time, if the server sent a parseable one
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    /// Deserialize the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Sequential HTTP client shared by the API walk and the asset pass
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    credentials: Option<Credentials>,
    retry: RetryConfig,
}

impl Fetcher {
    /// Build a fetcher with the configured timeout, user agent and credentials
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api.timeout)
            .user_agent(config.api.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            credentials: config.credentials.clone(),
            retry: config.retry.clone(),
        })
    }

    /// GET an API URL with the given media type and query parameters
    ///
    /// Sends credentials when configured.
    pub async fn get(&self, url: &Url, accept: &str, params: &[(String, String)]) -> Result<Fetched> {
        self.request(url, accept, params, true).await
    }

    /// GET an asset URL without credentials
    pub async fn get_asset(&self, url: &Url) -> Result<Fetched> {
        self.request(url, "*/*", &[], false).await
    }

    async fn request(
        &self,
        url: &Url,
        accept: &str,
        params: &[(String, String)],
        authenticated: bool,
    ) -> Result<Fetched> {
        let mut backoff = Backoff::new(&self.retry);
        loop {
            let mut builder = self
                .client
                .get(url.clone())
                .header(ACCEPT, accept)
                .query(params);
            if authenticated && let Some(creds) = &self.credentials {
                builder = builder.basic_auth(&creds.username, Some(&creds.token));
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    back_off(&mut backoff, url, e).await?;
                    continue;
                }
            };

            let status = response.status();
            tracing::info!(
                url = %response.url(),
                status = status.as_u16(),
                used = header_str(response.headers(), RATELIMIT_USED).unwrap_or("-"),
                limit = header_str(response.headers(), RATELIMIT_LIMIT).unwrap_or("-"),
                "GET"
            );

            if let Some(reset) = rate_limit_reset(status, response.headers()) {
                let wait = wait_until(reset, Utc::now());
                tracing::warn!(
                    wait_secs = wait.as_secs(),
                    resume_at = %reset.format("%Y-%m-%d %H:%M:%S"),
                    "rate limit exhausted, waiting for reset"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                return Err(Error::http(url.as_str(), status));
            }

            let final_url = response.url().clone();
            let headers = response.headers().clone();
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    back_off(&mut backoff, url, e).await?;
                    continue;
                }
            };

            if backoff.retries() > 0 {
                tracing::info!(url = %url, retries = backoff.retries(), "request succeeded after retry");
            }
            return Ok(Fetched {
                url: final_url,
                status,
                headers,
                body,
            });
        }
    }
}

// Sleep before the next attempt, or give up with the transport error
async fn back_off(backoff: &mut Backoff<'_>, url: &Url, error: reqwest::Error) -> Result<()> {
    let error = Error::Network(error);
    let Some(delay) = backoff.next_delay(&error) else {
        if error.is_retryable() {
            tracing::error!(url = %url, error = %error, retries = backoff.retries(), "request failed, retries exhausted");
        }
        return Err(error);
    };
    tracing::warn!(
        url = %url,
        error = %error,
        retry = backoff.retries(),
        delay_ms = delay.as_millis(),
        "request failed, retrying"
    );
    tokio::time::sleep(delay).await;
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Returns the time the rate limit resets, or None if the response is not rate limited
///
/// A rate-limited response is a 403 (or 429) whose `x-ratelimit-remaining` is zero and
/// which carries an `x-ratelimit-reset` epoch timestamp.
pub fn rate_limit_reset(status: StatusCode, headers: &HeaderMap) -> Option<DateTime<Utc>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let remaining: u64 = header_str(headers, RATELIMIT_REMAINING)?.trim().parse().ok()?;
    if remaining > 0 {
        return None;
    }

    let reset: i64 = header_str(headers, RATELIMIT_RESET)?.trim().parse().ok()?;
    DateTime::from_timestamp(reset, 0)
}

/// Interval from `now` until `reset`, zero if the reset is already past
pub fn wait_until(reset: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (reset - now).to_std().unwrap_or(Duration::ZERO)
}
