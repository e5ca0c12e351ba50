use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

/// How many times a failed call is repeated and how long to wait between
/// attempts. Delays double from `base_delay` up to `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, retry: usize) -> Duration {
        let factor = u32::try_from(retry)
            .ok()
            .and_then(|r| 1u32.checked_shl(r))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A server-supplied `Retry-After` wins over the computed delay, still
    /// bounded by `max_delay`.
    fn delay_after(&self, retry: usize, resp: &Response) -> Duration {
        resp.headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs).min(self.max_delay))
            .unwrap_or_else(|| self.delay(retry))
    }
}

/// Throttling and server-side failures are worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Calls allowed in flight at once across clones of the client.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: Some(format!("tripsync/{}", env!("CARGO_PKG_VERSION"))),
            max_in_flight: 4,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("credential rejected by {url}")]
    Unauthorized { url: String },
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Errors that no retry or later message can recover from.
    pub fn is_systemic(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}

/// JSON-over-HTTP client shared by the mail API and the text model.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    in_flight: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            retry: config.retry,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        bearer: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let bytes = self
            .send(url, || {
                let req = self.client.get(url).query(query);
                with_bearer(req, bearer)
            })
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{url}: {e}")))
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<T, ApiError> {
        let bytes = self
            .send(url, || {
                let req = self.client.post(url).json(body);
                with_bearer(req, bearer)
            })
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{url}: {e}")))
    }

    async fn send<F>(&self, url: &str, build: F) -> Result<Vec<u8>, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| ApiError::Decode(format!("request limiter closed: {e}")))?;

        let span = info_span!("api_request", url);
        self.send_with_retry(build).instrument(span).await
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Vec<u8>, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retry = 0usize;
        loop {
            let err = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp.bytes().await?.to_vec()),
                Ok(resp) => {
                    let status = resp.status();
                    let url = resp.url().to_string();
                    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                        return Err(ApiError::Unauthorized { url });
                    }
                    if is_retryable_status(status) && retry < self.retry.retries {
                        let wait = self.retry.delay_after(retry, &resp);
                        debug!(%status, retry, ?wait, "retrying request");
                        tokio::time::sleep(wait).await;
                        retry += 1;
                        continue;
                    }
                    return Err(ApiError::HttpStatus {
                        status: status.as_u16(),
                        url,
                    });
                }
                Err(err) => err,
            };

            if !is_retryable_transport(&err) || retry >= self.retry.retries {
                return Err(ApiError::Request(err));
            }
            debug!(error = %err, retry, "retrying request");
            tokio::time::sleep(self.retry.delay(retry)).await;
            retry += 1;
        }
    }
}

fn with_bearer(req: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
    match bearer {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_until_capped() {
        let policy = RetryPolicy {
            retries: 6,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(1),
        };
        let delays: Vec<_> = (0..4).map(|r| policy.delay(r).as_millis()).collect();
        assert_eq!(delays, vec![300, 600, 1000, 1000]);
        assert_eq!(policy.delay(usize::MAX), Duration::from_secs(1));
    }

    #[test]
    fn throttling_and_server_errors_are_retried() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn unauthorized_is_systemic() {
        let err = ApiError::Unauthorized {
            url: "https://example.test".into(),
        };
        assert!(err.is_systemic());
        assert!(!ApiError::Timeout(Duration::from_secs(1)).is_systemic());
    }
}
