use super::ProtocolCheck;
use super::net;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;
use serde_json::Value;

const RFB_BANNER_LEN: usize = 12;
const SECURITY_TYPE_NONE: u8 = 1;
const SECURITY_TYPE_VNC_AUTH: u8 = 2;

/// Binary-framed exchange check: RFB version handshake plus the 3.7+
/// security-type list. We echo the server's own version back, which every
/// server accepts, and stop before any authentication step.
pub struct VncCheck;

#[async_trait]
impl ProtocolCheck for VncCheck {
    fn name(&self) -> &'static str {
        "vnc"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[5800, 5801, 5900, 5901]
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

        let banner = match net::recv_exact(&mut stream, RFB_BANNER_LEN, timeouts.io).await {
            Ok(banner) => banner,
            Err(e) => {
                result.record_failure(e.kind(), &e.to_string());
                return result;
            }
        };
        if !banner.starts_with(b"RFB") {
            result.record_failure(
                FailureKind::ProtocolError,
                &format!("unexpected greeting: {}", net::hex_string(&banner)),
            );
            return result;
        }
        result.detected = true;
        result.set(
            "rfb_version",
            String::from_utf8_lossy(&banner).trim().to_string(),
        );

        // Echo the version back to advance to the security handshake.
        if let Err(e) = net::send(&mut stream, &banner, timeouts.io).await {
            result.record_failure(e.kind(), &e.to_string());
            return result;
        }
        let security = match net::recv(&mut stream, 1024, timeouts.io).await {
            Ok(security) => security,
            Err(e) => {
                result.record_failure(e.kind(), &e.to_string());
                return result;
            }
        };

        match decode_security_types(&security) {
            Some(types) => {
                result.set("no_auth", types.contains(&SECURITY_TYPE_NONE));
                result.set("vnc_auth_supported", types.contains(&SECURITY_TYPE_VNC_AUTH));
                result.set(
                    "auth_methods",
                    Value::Array(types.into_iter().map(|t| Value::from(t as u64)).collect()),
                );
            }
            None => {
                result.record_failure(FailureKind::ProtocolError, "no security types offered");
            }
        }

        result
    }
}

/// RFB 3.7+ security negotiation: a count byte followed by that many type
/// codes. A zero count means the server refused the connection.
fn decode_security_types(data: &[u8]) -> Option<Vec<u8>> {
    let count = *data.first()? as usize;
    if count == 0 {
        return None;
    }
    let end = data.len().min(1 + count);
    Some(data[1..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_decode_security_types() {
        assert_eq!(decode_security_types(&[2, 1, 2]), Some(vec![1, 2]));
        assert_eq!(decode_security_types(&[1, 16]), Some(vec![16]));
        assert_eq!(decode_security_types(&[0]), None);
        assert_eq!(decode_security_types(&[]), None);
    }

    #[test]
    fn test_decode_security_types_truncated_list() {
        // Count claims three but only two arrived; keep what we got.
        assert_eq!(decode_security_types(&[3, 1, 2]), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_probe_rfb_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"RFB 003.008\n").await.unwrap();
            let mut echo = [0u8; 12];
            sock.read_exact(&mut echo).await.unwrap();
            sock.write_all(&[2, 1, 2]).await.unwrap();
        });

        let check = VncCheck;
        let timeouts = Timeouts {
            connect: Duration::from_secs(1),
            io: Duration::from_secs(1),
        };
        let result = check.probe("127.0.0.1", port, &timeouts).await;

        assert!(result.reachable);
        assert!(result.detected);
        assert_eq!(result.fields["rfb_version"], "RFB 003.008");
        assert_eq!(result.fields["no_auth"], true);
        assert_eq!(result.fields["vnc_auth_supported"], true);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_non_rfb_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"SSH-2.0-Ope\n").await.unwrap();
        });

        let check = VncCheck;
        let timeouts = Timeouts {
            connect: Duration::from_secs(1),
            io: Duration::from_secs(1),
        };
        let result = check.probe("127.0.0.1", port, &timeouts).await;

        assert!(result.reachable);
        assert!(!result.detected);
        assert!(result.error.as_deref().unwrap().starts_with("protocol_error"));
    }
}
