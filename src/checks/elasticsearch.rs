use super::ProtocolCheck;
use super::net;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;
use serde_json::{Value, json};

const INDEX_SAMPLE_LIMIT: usize = 10;

/// HTTP-based check: the Elasticsearch REST API answers unauthenticated
/// GETs on an open cluster. Read-only endpoints only.
pub struct ElasticsearchCheck;

impl ElasticsearchCheck {
    fn client(timeouts: &Timeouts) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.io)
            .user_agent("svcenum/0.1")
            .build()
    }
}

#[async_trait]
impl ProtocolCheck for ElasticsearchCheck {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[9200]
    }

    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult {
        let mut result = CheckResult::new(target, port, self.name());

        if let Err(e) = net::tcp_reachable(target, port, timeouts.connect).await {
            result.record_failure(FailureKind::TcpUnreachable, &e);
            return result;
        }
        result.reachable = true;

        let client = match Self::client(timeouts) {
            Ok(client) => client,
            Err(e) => {
                result.record_failure(FailureKind::Unhandled, &e.to_string());
                return result;
            }
        };
        let base = format!("http://{}:{}", target, port);

        let response = match client.get(&base).send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = if e.is_timeout() {
                    FailureKind::ProtocolTimeout
                } else {
                    FailureKind::ProtocolError
                };
                result.record_failure(kind, &e.to_string());
                return result;
            }
        };

        let status = response.status().as_u16();
        result.set("root_status", status);
        if status != 200 {
            // Reachable HTTP endpoint that refuses anonymous access.
            result.set("unauthenticated_access", false);
            return result;
        }

        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(e) => {
                result.record_failure(
                    FailureKind::ProtocolError,
                    &format!("root response was not JSON: {}", e),
                );
                return result;
            }
        };

        let looks_like_es = body.get("cluster_name").is_some()
            || body
                .get("tagline")
                .and_then(Value::as_str)
                .is_some_and(|t| t.contains("Search"));
        result.detected = looks_like_es;
        result.set("unauthenticated_access", true);

        if let Some(version) = body.pointer("/version/number").and_then(Value::as_str) {
            result.set("version", version);
        }
        if let Some(cluster) = body.get("cluster_name").and_then(Value::as_str) {
            result.set("cluster_name", cluster);
        }
        if let Some(node) = body.get("name").and_then(Value::as_str) {
            result.set("node_name", node);
        }

        // Sub-requests degrade independently.
        match fetch_json(&client, &format!("{}/_cat/indices?format=json", base)).await {
            Ok(Value::Array(indices)) => {
                result.set("indices", sample_indices(&indices));
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!(
                    "[checks::elasticsearch] indices_failed: target={} port={} error={}",
                    target,
                    port,
                    e
                );
            }
        }
        match fetch_json(&client, &format!("{}/_snapshot", base)).await {
            Ok(Value::Object(repos)) => {
                let names: Vec<Value> = repos.keys().map(|k| Value::from(k.clone())).collect();
                result.set("snapshot_repositories", Value::Array(names));
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!(
                    "[checks::elasticsearch] snapshots_failed: target={} port={} error={}",
                    target,
                    port,
                    e
                );
            }
        }

        result
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    if response.status().as_u16() != 200 {
        return Err(format!("status {}", response.status()));
    }
    response.json::<Value>().await.map_err(|e| e.to_string())
}

fn sample_indices(indices: &[Value]) -> Value {
    let sample: Vec<Value> = indices
        .iter()
        .take(INDEX_SAMPLE_LIMIT)
        .map(|idx| {
            json!({
                "index": idx.get("index").cloned().unwrap_or(Value::Null),
                "docs": idx.get("docs.count").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    Value::Array(sample)
}
