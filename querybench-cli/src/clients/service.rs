//! Results service client

use super::{HttpClient, join_url};
use crate::error::ClientError;
use chrono::{DateTime, Utc};
use querybench_core::Measurement;
use serde::Serialize;
use std::collections::BTreeMap;

/// Body of a benchmark start call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkStartRequest {
    /// Definition name
    pub name: String,
    /// Environment tag
    pub environment_name: String,
    /// Variable values
    pub variables: BTreeMap<String, String>,
    /// Free-form attributes
    pub attributes: BTreeMap<String, String>,
}

/// Body of an execution start call
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStartRequest {
    /// Free-form attributes
    pub attributes: BTreeMap<String, String>,
}

/// Terminal status sent with a finish call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishStatus {
    /// Succeeded
    Ended,
    /// Failed
    Failed,
}

impl FinishStatus {
    /// Map a success flag
    pub fn from_success(successful: bool) -> Self {
        if successful {
            FinishStatus::Ended
        } else {
            FinishStatus::Failed
        }
    }
}

/// Body of a benchmark or execution finish call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRequest {
    /// Terminal status
    pub status: FinishStatus,
    /// Completion instant
    pub end_time: DateTime<Utc>,
    /// Collected measurements
    pub measurements: Vec<Measurement>,
    /// Free-form attributes
    pub attributes: BTreeMap<String, String>,
}

/// Client for the results persistence API
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: HttpClient,
    base_url: String,
}

impl ServiceClient {
    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn benchmark_url(&self, unique_name: &str, sequence_id: &str, suffix: &str) -> String {
        join_url(
            &self.base_url,
            &format!("v1/benchmark/{}/{}/{}", unique_name, sequence_id, suffix),
        )
    }

    /// Register a benchmark run
    pub async fn start_benchmark(
        &self,
        unique_name: &str,
        sequence_id: &str,
        request: &BenchmarkStartRequest,
    ) -> Result<(), ClientError> {
        let url = self.benchmark_url(unique_name, sequence_id, "start");
        self.http.post_json(&url, request).await
    }

    /// Close a benchmark run
    pub async fn finish_benchmark(
        &self,
        unique_name: &str,
        sequence_id: &str,
        request: &FinishRequest,
    ) -> Result<(), ClientError> {
        let url = self.benchmark_url(unique_name, sequence_id, "finish");
        self.http.post_json(&url, request).await
    }

    /// Register an execution
    pub async fn start_execution(
        &self,
        unique_name: &str,
        sequence_id: &str,
        execution_sequence_id: u32,
        request: &ExecutionStartRequest,
    ) -> Result<(), ClientError> {
        let url = self.benchmark_url(
            unique_name,
            sequence_id,
            &format!("execution/{}/start", execution_sequence_id),
        );
        self.http.post_json(&url, request).await
    }

    /// Close an execution
    pub async fn finish_execution(
        &self,
        unique_name: &str,
        sequence_id: &str,
        execution_sequence_id: u32,
        request: &FinishRequest,
    ) -> Result<(), ClientError> {
        let url = self.benchmark_url(
            unique_name,
            sequence_id,
            &format!("execution/{}/finish", execution_sequence_id),
        );
        self.http.post_json(&url, request).await
    }

    /// Server wall clock in epoch milliseconds
    pub async fn current_time_millis(&self) -> Result<i64, ClientError> {
        let url = join_url(&self.base_url, "v1/time/current-time-millis");
        self.http.get_json(&url, &[]).await
    }
}
