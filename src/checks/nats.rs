use super::ProtocolCheck;
use super::net;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::BufReader;

const INITIAL_LINE_KEEP: usize = 1000;

/// Line/text exchange check: a NATS server volunteers `INFO {json}` on
/// connect and answers `PING` with `PONG`.
pub struct NatsCheck;

#[async_trait]
impl ProtocolCheck for NatsCheck {
    fn name(&self) -> &'static str {
        "nats"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[4222]
    }

    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult {
        let mut result = CheckResult::new(target, port, self.name());

        if let Err(e) = net::tcp_reachable(target, port, timeouts.connect).await {
            result.record_failure(FailureKind::TcpUnreachable, &e);
            return result;
        }
        result.reachable = true;

        let stream = match net::connect(target, port, timeouts.connect).await {
            Ok(stream) => stream,
            Err(e) => {
                result.record_failure(FailureKind::TcpUnreachable, &e);
                return result;
            }
        };
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let initial = match net::read_line(&mut reader, timeouts.io).await {
            Ok(line) => line,
            Err(e) => {
                result.record_failure(e.kind(), &e.to_string());
                return result;
            }
        };

        let mut detected = false;
        if let Some(payload) = initial.strip_prefix("INFO ") {
            detected = true;
            record_server_info(&mut result, payload);
            let mut kept = initial.clone();
            kept.truncate(INITIAL_LINE_KEEP);
            result.set("initial_line", kept);
        }

        // PING regardless; some deployments suppress INFO but still pong.
        let mut pong_received = false;
        if net::send(&mut write_half, b"PING\r\n", timeouts.io).await.is_ok() {
            if let Ok(line) = net::read_line(&mut reader, timeouts.io).await {
                pong_received = line.to_uppercase().starts_with("PONG");
            }
        }
        result.set("pong_received", pong_received);
        result.detected = detected || pong_received;

        result
    }
}

/// Pull the interesting keys out of the INFO payload; fall back to the raw
/// text when it is not valid JSON.
fn record_server_info(result: &mut CheckResult, payload: &str) {
    match serde_json::from_str::<Value>(payload) {
        Ok(info) => {
            for key in ["version", "server_name", "cluster"] {
                if let Some(value) = info.get(key) {
                    if !value.is_null() {
                        result.set(key, value.clone());
                    }
                }
            }
            for key in ["auth_required", "tls_required", "jetstream", "headers"] {
                if let Some(value) = info.get(key) {
                    if !value.is_null() {
                        result.set(key, value.clone());
                    }
                }
            }
        }
        Err(_) => {
            let mut raw = payload.to_string();
            raw.truncate(INITIAL_LINE_KEEP);
            result.set("info_raw", raw);
        }
    }
}
