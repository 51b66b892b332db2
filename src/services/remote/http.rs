use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::errors::{EngineError, EngineResult};
use crate::middleware::circuit_breaker::CircuitBreaker;

/// Shared HTTP plumbing for the remote engines: pooled client and retries
/// with backoff, optionally behind a circuit breaker.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    circuit_breaker: Option<CircuitBreaker>,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            circuit_breaker: None,
            max_retries,
        })
    }

    /// Fail fast while `circuit_breaker` is open and feed it every outcome
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> EngineResult<R> {
        let body = self.send_with_retries(|| self.client.get(url)).await?;
        parse_json(&body)
    }

    pub async fn post_json<B, R>(&self, url: &str, body: &B) -> EngineResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let text = self.send_with_retries(|| self.client.post(url).json(body)).await?;
        parse_json(&text)
    }

    /// POST raw bytes as `application/octet-stream`
    pub async fn post_bytes<R: DeserializeOwned>(&self, url: &str, bytes: &[u8]) -> EngineResult<R> {
        let text = self
            .send_with_retries(|| {
                self.client
                    .post(url)
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes.to_vec())
            })
            .await?;
        parse_json(&text)
    }

    async fn send_with_retries<F>(&self, build: F) -> EngineResult<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let Some(ref breaker) = self.circuit_breaker else {
            return self.send_attempts(build).await;
        };

        if !breaker.allow_request() {
            debug!("Circuit breaker for {} is open, failing fast", breaker.name());
            return Err(EngineError::CircuitOpen(breaker.name()));
        }

        let result = self.send_attempts(build).await;
        match result {
            Ok(_) => breaker.record_success(),
            Err(_) => breaker.record_failure(),
        }
        result
    }

    async fn send_attempts<F>(&self, build: F) -> EngineResult<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_retries = self.max_retries;

        for attempt in 0..=max_retries {
            let error = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }

                    let body = response.text().await.unwrap_or_default();
                    EngineError::Status {
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => EngineError::Http(e),
            };

            if attempt >= max_retries || !is_retryable(&error) {
                return Err(error);
            }

            debug!("Request failed: {}. Retrying ({}/{})", error, attempt + 1, max_retries);

            // Use 10s wait for 429/503, exponential backoff for others
            let delay = if error.is_retryable_status() {
                Duration::from_secs(10)
            } else {
                let base_delay = 2_u64.pow(attempt);
                let jitter = rand::random::<u64>() % 1000;
                Duration::from_millis(base_delay * 1000 + jitter)
            };
            tokio::time::sleep(delay).await;
        }

        warn!("Request failed after {} retries", max_retries);
        Err(EngineError::Failed(format!("failed after {} retries", max_retries)))
    }
}

fn is_retryable(error: &EngineError) -> bool {
    match error {
        EngineError::Http(e) => e.is_timeout() || e.is_connect(),
        EngineError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn parse_json<R: DeserializeOwned>(body: &str) -> EngineResult<R> {
    serde_json::from_str(body).map_err(|e| EngineError::InvalidResponse(e.to_string()))
}
