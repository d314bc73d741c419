use super::net;
use super::ProtocolCheck;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;
use serde_json::Value;

const IAC: u8 = 0xff;
const NTLMSSP_MARKER: &[u8] = b"NTLMSSP";

/// Reachability-only check: connect, read whatever greeting the server
/// volunteers, and decode Telnet option negotiation out of it.
pub struct TelnetCheck;

#[async_trait]
impl ProtocolCheck for TelnetCheck {
    fn name(&self) -> &'static str {
        "telnet"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[23]
    }

    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult {
        let mut result = CheckResult::new(target, port, self.name());

        let mut stream = match net::connect(target, port, timeouts.connect).await {
            Ok(stream) => stream,
            Err(e) => {
                result.record_failure(FailureKind::TcpUnreachable, &e);
                return result;
            }
        };
        result.reachable = true;

        let raw = match net::recv(&mut stream, 1024, timeouts.io).await {
            Ok(raw) => raw,
            Err(e) => {
                result.record_failure(e.kind(), &e.to_string());
                return result;
            }
        };

        if raw.is_empty() {
            // Open but silent; nothing to classify.
            return result;
        }
        result.detected = true;

        let banner = printable_banner(&raw);
        if !banner.is_empty() {
            result.set("banner", banner);
        }

        let options = decode_iac_options(&raw);
        if !options.is_empty() {
            result.set(
                "negotiate_options",
                Value::Array(options.into_iter().map(Value::from).collect()),
            );
        }

        if raw.windows(NTLMSSP_MARKER.len()).any(|w| w == NTLMSSP_MARKER) {
            result.set("ntlm_negotiation", true);
        }

        result.set("raw_hex", net::hex_string(&raw[..raw.len().min(256)]));
        result
    }
}

/// Extract `command:option` hex pairs from IAC negotiation sequences.
fn decode_iac_options(data: &[u8]) -> Vec<String> {
    let mut options = Vec::new();
    let mut i = 0;
    while i < data.len() {
        if data[i] == IAC && i + 2 < data.len() {
            options.push(format!("{:02x}:{:02x}", data[i + 1], data[i + 2]));
            i += 3;
        } else {
            i += 1;
        }
    }
    options
}

/// The greeting with negotiation bytes and control characters stripped.
fn printable_banner(data: &[u8]) -> String {
    let mut cleaned = Vec::new();
    let mut i = 0;
    while i < data.len() {
        if data[i] == IAC {
            i += 3; // skip IAC + command + option
        } else {
            cleaned.push(data[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&cleaned)
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}
