//! Graphite render and events client

use super::{HttpClient, join_url};
use crate::error::ClientError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Datapoints of one named series, in time order; `None` marks a missing bucket
pub type Series = Vec<Option<f64>>;

/// Lifecycle event posted to `/events/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphiteEvent {
    /// Short description
    pub what: String,
    /// Space-separated tags
    pub tags: String,
    /// Free-form payload
    pub data: String,
    /// Event instant in epoch seconds
    pub when: i64,
}

#[derive(Debug, Deserialize)]
struct RenderedTarget {
    target: String,
    datapoints: Vec<(Option<f64>, i64)>,
}

/// Client for the Graphite HTTP API
#[derive(Debug, Clone)]
pub struct GraphiteClient {
    http: HttpClient,
    base_url: String,
}

impl GraphiteClient {
    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Range query for named expressions; results are keyed by name
    pub async fn render(
        &self,
        targets: &[(String, String)],
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Series>, ClientError> {
        let url = join_url(&self.base_url, "render");
        let mut query = vec![
            ("format".to_string(), "json".to_string()),
            ("from".to_string(), from.timestamp().to_string()),
            ("until".to_string(), until.timestamp().to_string()),
        ];
        query.extend(
            targets
                .iter()
                .map(|(name, expr)| ("target".to_string(), alias(expr, name))),
        );

        let response = self
            .http
            .send(&url, |client| client.get(&url).query(&query))
            .await?;
        let bytes = response.bytes().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })?;
        parse_render(&url, &bytes)
    }

    /// Post a lifecycle event
    pub async fn store_event(&self, event: &GraphiteEvent) -> Result<(), ClientError> {
        let url = join_url(&self.base_url, "events/");
        self.http.post_json(&url, event).await
    }
}

fn alias(expr: &str, name: &str) -> String {
    format!("alias({},'{}')", expr, name)
}

fn parse_render(url: &str, body: &[u8]) -> Result<BTreeMap<String, Series>, ClientError> {
    let targets: Vec<RenderedTarget> =
        serde_json::from_slice(body).map_err(|e| ClientError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    Ok(targets
        .into_iter()
        .map(|t| (t.target, t.datapoints.into_iter().map(|(v, _)| v).collect()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias() {
        assert_eq!(alias("avg(cpu.*)", "cpu"), "alias(avg(cpu.*),'cpu')");
    }

    #[test]
    fn test_parse_render_keeps_nulls() {
        let body = br#"[
            {"target": "cpu", "datapoints": [[10.0, 1000], [null, 1010], [30.5, 1020]]},
            {"target": "memory", "datapoints": []}
        ]"#;
        let series = parse_render("u", body).unwrap();
        assert_eq!(series["cpu"], vec![Some(10.0), None, Some(30.5)]);
        assert!(series["memory"].is_empty());
    }

    #[test]
    fn test_parse_render_rejects_garbage() {
        assert!(matches!(
            parse_render("u", b"<html>"),
            Err(ClientError::Decode { .. })
        ));
    }

    #[test]
    fn test_event_shape() {
        let event = GraphiteEvent {
            what: "Benchmark q1 started".to_string(),
            tags: "benchmark started ci".to_string(),
            data: "seq".to_string(),
            when: 1_700_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["when"], 1_700_000_000_i64);
        assert_eq!(json["tags"], "benchmark started ci");
    }
}
