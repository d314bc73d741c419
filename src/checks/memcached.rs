use super::ProtocolCheck;
use super::net;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const QUERY: &[u8] = b"version\r\nstats\r\nstats slabs\r\nquit\r\n";
const READ_LIMIT: usize = 262_144;

/// Line/text exchange check: memcached accepts a pipelined batch of
/// commands and the `quit` makes it close the connection for us.
pub struct MemcachedCheck;

#[async_trait]
impl ProtocolCheck for MemcachedCheck {
    fn name(&self) -> &'static str {
        "memcached"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[11211]
    }

    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult {
        let mut result = CheckResult::new(target, port, self.name());

        if let Err(e) = net::tcp_reachable(target, port, timeouts.connect).await {
            result.record_failure(FailureKind::TcpUnreachable, &e);
            return result;
        }
        result.reachable = true;

        let raw = match query(target, port, timeouts).await {
            Ok(raw) => raw,
            Err((kind, detail)) => {
                result.record_failure(kind, &detail);
                return result;
            }
        };
        let text = String::from_utf8_lossy(&raw);

        if text.contains("VERSION ") || text.contains("STAT ") {
            result.detected = true;
        }

        if let Some(version) = text
            .lines()
            .find_map(|line| line.strip_prefix("VERSION "))
        {
            result.set("version", version.trim());
        }

        let stats = parse_stat_lines(&text);
        let slabs = group_slabs(&stats);
        if !stats.is_empty() {
            result.set("stats", to_object(&stats));
        }
        if !slabs.is_empty() {
            let slabs_json: Map<String, Value> = slabs
                .iter()
                .map(|(id, kv)| (id.clone(), Value::Object(to_object(kv))))
                .collect();
            result.set("slabs", Value::Object(slabs_json));
        }

        result
    }
}

async fn query(
    target: &str,
    port: u16,
    timeouts: &Timeouts,
) -> Result<Vec<u8>, (FailureKind, String)> {
    let mut stream = net::connect(target, port, timeouts.connect)
        .await
        .map_err(|e| (FailureKind::TcpUnreachable, e))?;
    net::send(&mut stream, QUERY, timeouts.io)
        .await
        .map_err(|e| (e.kind(), e.to_string()))?;
    net::recv_until_close(&mut stream, READ_LIMIT, timeouts.io)
        .await
        .map_err(|e| (e.kind(), e.to_string()))
}

/// `STAT <key> <value...>` lines into a sorted map.
fn parse_stat_lines(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("STAT ") {
            let mut parts = rest.splitn(2, ' ');
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                out.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    out
}

/// Slab stats arrive as `STAT <id>:<key> <value>`; regroup them per slab.
fn group_slabs(stats: &BTreeMap<String, String>) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut slabs: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in stats {
        if let Some((slab_id, slab_key)) = key.split_once(':') {
            if slab_id.chars().all(|c| c.is_ascii_digit()) {
                slabs
                    .entry(slab_id.to_string())
                    .or_default()
                    .insert(slab_key.to_string(), value.clone());
            }
        }
    }
    slabs
}

fn to_object(map: &BTreeMap<String, String>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
        .collect()
}
