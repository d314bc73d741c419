use super::ProtocolCheck;
use super::net;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const FOUR_LETTER_WORDS: [&str; 3] = ["ruok", "stat", "envi"];
const RESPONSE_LIMIT: usize = 4096;
const RESPONSE_KEEP: usize = 4000;

/// Line/text exchange check: ZooKeeper answers each four-letter word on a
/// fresh connection and closes it afterwards.
pub struct ZookeeperCheck;

#[async_trait]
impl ProtocolCheck for ZookeeperCheck {
    fn name(&self) -> &'static str {
        "zookeeper"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[2181]
    }

    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult {
        let mut result = CheckResult::new(target, port, self.name());

        if let Err(e) = net::tcp_reachable(target, port, timeouts.connect).await {
            result.record_failure(FailureKind::TcpUnreachable, &e);
            return result;
        }
        result.reachable = true;

        let mut responses: Map<String, Value> = Map::new();
        let mut texts: BTreeMap<String, String> = BTreeMap::new();
        for word in FOUR_LETTER_WORDS {
            match four_letter(target, port, word, timeouts).await {
                Ok(text) => {
                    responses.insert(
                        word.to_string(),
                        json!({"ok": true, "response": text.clone(), "error": Value::Null}),
                    );
                    texts.insert(word.to_string(), text);
                }
                Err(e) => {
                    // One failed word does not end the probe.
                    log::debug!(
                        "[checks::zookeeper] word_failed: target={} port={} word={} error={}",
                        target,
                        port,
                        word,
                        e
                    );
                    responses.insert(
                        word.to_string(),
                        json!({"ok": false, "response": Value::Null, "error": e}),
                    );
                }
            }
        }
        result.set("four_letter", Value::Object(responses));

        let empty = String::new();
        let ruok = texts.get("ruok").unwrap_or(&empty);
        let stat = texts.get("stat").unwrap_or(&empty);
        let envi = texts.get("envi").unwrap_or(&empty);

        if ruok.to_lowercase().contains("imok")
            || stat.to_lowercase().contains("zookeeper")
            || envi.to_lowercase().contains("zookeeper")
        {
            result.detected = true;
        }

        let (version, mode) = extract_version_and_mode(stat, envi);
        if let Some(version) = version {
            result.set("version", version);
        }
        if let Some(mode) = mode {
            result.set("mode", mode);
        }

        result
    }
}

/// Send one four-letter word on its own connection and read the reply.
async fn four_letter(
    target: &str,
    port: u16,
    word: &str,
    timeouts: &Timeouts,
) -> Result<String, String> {
    let mut stream = net::connect(target, port, timeouts.connect)
        .await
        .map_err(|e| format!("connect failed: {}", e))?;
    net::send(&mut stream, word.as_bytes(), timeouts.io)
        .await
        .map_err(|e| e.to_string())?;
    let raw = net::recv_until_close(&mut stream, RESPONSE_LIMIT, timeouts.io)
        .await
        .map_err(|e| e.to_string())?;
    let mut text = String::from_utf8_lossy(&raw).into_owned();
    text.truncate(RESPONSE_KEEP);
    Ok(text)
}

fn extract_version_and_mode(stat: &str, envi: &str) -> (Option<String>, Option<String>) {
    let mut version = None;
    let mut mode = None;
    for line in stat.lines().chain(envi.lines()) {
        let low = line.to_lowercase();
        if low.contains("zookeeper version") && line.contains(':') {
            version = line.split_once(':').map(|(_, v)| v.trim().to_string());
        }
        if low.starts_with("mode:") {
            mode = line.split_once(':').map(|(_, v)| v.trim().to_string());
        }
    }
    (version, mode)
}
