//! Engine query statistics client

use super::{HttpClient, join_url};
use crate::error::ClientError;
use serde_json::{Map, Value};

/// Client for the coordinator's query info endpoint
#[derive(Debug, Clone)]
pub struct EngineClient {
    http: HttpClient,
    base_url: String,
    user: Option<String>,
}

impl EngineClient {
    /// Create a client for `base_url`, optionally sending `X-Trino-User`
    pub fn new(base_url: impl Into<String>, user: Option<String>, http: HttpClient) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            user,
        }
    }

    /// Fetch the `queryStats` object of a finished query
    pub async fn query_stats(&self, query_id: &str) -> Result<Map<String, Value>, ClientError> {
        let url = join_url(&self.base_url, &format!("v1/query/{}", query_id));
        let headers: Vec<(&str, &str)> = self
            .user
            .as_deref()
            .map(|user| vec![("X-Trino-User", user)])
            .unwrap_or_default();
        let info: Value = self.http.get_json(&url, &headers).await?;
        extract_stats(&url, info)
    }
}

fn extract_stats(url: &str, mut info: Value) -> Result<Map<String, Value>, ClientError> {
    match info.get_mut("queryStats").map(Value::take) {
        Some(Value::Object(stats)) => Ok(stats),
        _ => Err(ClientError::Decode {
            url: url.to_string(),
            reason: "missing queryStats object".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_stats() {
        let stats = extract_stats("u", json!({"queryStats": {"elapsedTime": "1.00s"}})).unwrap();
        assert_eq!(stats["elapsedTime"], "1.00s");

        assert!(extract_stats("u", json!({"state": "FINISHED"})).is_err());
    }
}
