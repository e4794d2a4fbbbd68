//! Shared outbound HTTP client with request pacing and 429 backoff.

use crate::config::toml_config::HttpConfig;
use crate::utils::error::{EtlError, Result};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// `backoff_base * 2^attempt`, capped at `backoff_max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_secs(30),
        }
    }
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct RateLimitedClient {
    client: Client,
    /// `None` when requests are not paced.
    limiter: Option<DirectRateLimiter>,
    retry: RetryPolicy,
}

impl RateLimitedClient {
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;

        Ok(Self::with_client(
            client,
            Duration::from_millis(config.request_delay_ms),
            RetryPolicy {
                max_retries: config.max_retries,
                backoff_base: Duration::from_millis(config.backoff_base_ms),
                backoff_max: Duration::from_millis(config.backoff_max_ms),
            },
        ))
    }

    /// One request per `min_interval`, no burst. A zero interval disables pacing.
    pub fn with_client(client: Client, min_interval: Duration, retry: RetryPolicy) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            client,
            limiter,
            retry,
        }
    }

    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Sends the request built by `build`, retrying on 429 with exponential backoff.
    pub async fn send<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            self.pace().await;
            let response = build(&self.client).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.retry.max_retries {
                    tracing::warn!("Still rate limited by {} after {} attempts", url, attempt + 1);
                    return Err(EtlError::RateLimited {
                        url: url.to_string(),
                        attempts: attempt + 1,
                    });
                }

                let mut delay = self.retry.delay_for(attempt);
                if let Some(retry_after) = retry_after(&response) {
                    delay = delay.max(retry_after.min(self.retry.backoff_max));
                }
                tracing::warn!(
                    "429 from {}, backing off {:?} (retry {}/{})",
                    url,
                    delay,
                    attempt + 1,
                    self.retry.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                tracing::debug!("{} answered {}", url, status);
                return Err(EtlError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            return Ok(response);
        }
    }

    pub async fn get_text(&self, url: &str, cookie: Option<&str>) -> Result<String> {
        let response = self
            .send(url, |client| {
                let request = client.get(url);
                match cookie {
                    Some(cookie) => request.header(reqwest::header::COOKIE, cookie),
                    None => request,
                }
            })
            .await?;
        Ok(response.text().await?)
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
