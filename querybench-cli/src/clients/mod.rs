//! HTTP Clients
//!
//! Thin typed clients for the collaborators reached over HTTP:
//! - [`ServiceClient`] - results service (benchmark and execution lifecycle, server time)
//! - [`GraphiteClient`] - metrics range queries and lifecycle events
//! - [`EngineClient`] - per-query engine statistics
//!
//! All share [`HttpClient`], which retries transport failures and 5xx
//! responses with exponential backoff and gives up immediately on 4xx.

mod engine;
mod graphite;
mod service;

pub use engine::EngineClient;
pub use graphite::{GraphiteClient, GraphiteEvent, Series};
pub use service::{
    BenchmarkStartRequest, ExecutionStartRequest, FinishRequest, FinishStatus, ServiceClient,
};

use crate::error::ClientError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Shared request plumbing with retry
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    /// Create a client with a per-request timeout and no retries
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            client,
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Retry failed requests up to `max_retries` times, doubling `delay` each time
    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    /// Send the request produced by `build`, retrying transient failures
    pub async fn send<F>(&self, url: &str, build: F) -> Result<reqwest::Response, ClientError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match build(&self.client).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    let error = ClientError::Status {
                        url: url.to_string(),
                        status,
                        body,
                    };
                    // Don't retry on 4xx errors (client errors)
                    if !error.is_transient() {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(source) => {
                    last_error = Some(ClientError::Transport {
                        url: url.to_string(),
                        source,
                    });
                }
            }

            if attempt < self.max_retries {
                let delay = self.retry_delay.saturating_mul(2_u32.saturating_pow(attempt));
                debug!("retrying {} in {:?} (attempt {})", url, delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::Decode {
            url: url.to_string(),
            reason: "no attempt was made".to_string(),
        }))
    }

    /// GET and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self
            .send(url, |client| {
                headers
                    .iter()
                    .fold(client.get(url), |req, (k, v)| req.header(*k, *v))
            })
            .await?;
        decode(url, response).await
    }

    /// POST a JSON body, ignoring the response body
    pub async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<(), ClientError> {
        self.send(url, |client| client.post(url).json(body)).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await.map_err(|source| ClientError::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
