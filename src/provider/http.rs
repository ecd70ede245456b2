//! Throttled JSON-over-HTTP transport shared by the chain providers
//!
//! Every request first acquires a token for its upstream, and transient failures
//! (network errors, 429, 5xx, throttles reported in the body) are retried with
//! exponential backoff.

use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::gateway::RateLimiter;

/// HTTP client bound to the shared rate limiter
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
    limiter: Arc<RateLimiter>,
    config: HttpConfig,
}

impl HttpSource {
    pub fn new(limiter: Arc<RateLimiter>, config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            limiter,
            config,
        })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.retry_base_delay_ms),
            max_interval: Duration::from_millis(self.config.retry_base_delay_ms * 8),
            max_elapsed_time: Some(Duration::from_millis(self.config.max_retry_elapsed_ms)),
            ..Default::default()
        }
    }

    /// GET `url` with query parameters and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        upstream: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.get_json_with(upstream, url, query, Ok).await
    }

    /// GET and decode, then unwrap the body with `check` inside the retry loop,
    /// so throttles reported in a 200 body are retried like a 429
    pub async fn get_json_with<T, R, F>(
        &self,
        upstream: &str,
        url: &str,
        query: &[(&str, String)],
        check: F,
    ) -> Result<R>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Result<R>,
    {
        let check = &check;
        retry(self.backoff(), || async move {
            self.limiter.acquire(upstream).await;
            let request = self.client.get(url).query(query);
            classify(upstream, Self::send::<T>(upstream, request).await.and_then(check))
        })
        .await
    }

    /// POST a JSON body to `url` and decode the JSON response
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        upstream: &str,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        self.post_json_with(upstream, url, body, Ok).await
    }

    /// POST counterpart of [`HttpSource::get_json_with`]
    pub async fn post_json_with<T, R, F>(
        &self,
        upstream: &str,
        url: &str,
        body: &serde_json::Value,
        check: F,
    ) -> Result<R>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Result<R>,
    {
        let check = &check;
        retry(self.backoff(), || async move {
            self.limiter.acquire(upstream).await;
            let request = self.client.post(url).json(body);
            classify(upstream, Self::send::<T>(upstream, request).await.and_then(check))
        })
        .await
    }

    async fn send<T: DeserializeOwned>(
        upstream: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream(upstream, e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited(upstream.to_string()));
        }
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                upstream: upstream.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Deserialization(format!("{} response: {}", upstream, e)))
    }
}

fn classify<T>(upstream: &str, result: Result<T>) -> std::result::Result<T, backoff::Error<Error>> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_retryable() => {
            debug!(upstream, error = %e, "Retryable upstream error");
            Err(backoff::Error::transient(e))
        }
        Err(e) => {
            warn!(upstream, error = %e, "Permanent upstream error");
            Err(backoff::Error::permanent(e))
        }
    }
}
