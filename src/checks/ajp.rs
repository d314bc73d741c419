use super::ProtocolCheck;
use super::net;
use crate::config::Timeouts;
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;

/// AJP13 CPING: magic 0x1234, packet length 1, payload 0x0A.
const CPING: [u8; 5] = [0x12, 0x34, 0x00, 0x01, 0x0a];
/// Expected CPONG frame from the container side.
const CPONG: [u8; 5] = [0x41, 0x42, 0x00, 0x01, 0x09];

/// Binary-framed exchange check: one fixed preamble, one fixed reply.
pub struct AjpCheck;

#[async_trait]
impl ProtocolCheck for AjpCheck {
    fn name(&self) -> &'static str {
        "ajp"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[8009]
    }

    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult {
        let mut result = CheckResult::new(target, port, self.name());

        if let Err(e) = net::tcp_reachable(target, port, timeouts.connect).await {
            result.record_failure(FailureKind::TcpUnreachable, &e);
            return result;
        }
        result.reachable = true;

        let mut stream = match net::connect(target, port, timeouts.connect).await {
            Ok(stream) => stream,
            Err(e) => {
                result.record_failure(FailureKind::TcpUnreachable, &e);
                return result;
            }
        };

        if let Err(e) = net::send(&mut stream, &CPING, timeouts.io).await {
            result.record_failure(e.kind(), &e.to_string());
            return result;
        }
        let response = match net::recv(&mut stream, 64, timeouts.io).await {
            Ok(response) => response,
            Err(e) => {
                result.record_failure(e.kind(), &e.to_string());
                return result;
            }
        };

        let cpong = classify_cpong(&response);
        result.detected = cpong || has_ajp_magic(&response);
        result.set("cpong_received", cpong);
        if !response.is_empty() {
            result.set("raw_response_hex", net::hex_string(&response));
        }

        result
    }
}

fn classify_cpong(response: &[u8]) -> bool {
    response.len() >= CPONG.len() && response[..CPONG.len()] == CPONG
}

fn has_ajp_magic(response: &[u8]) -> bool {
    response.len() >= 2 && (response[..2] == [0x12, 0x34] || &response[..2] == b"AB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_classify_cpong() {
        assert!(classify_cpong(&[0x41, 0x42, 0x00, 0x01, 0x09]));
        assert!(classify_cpong(&[0x41, 0x42, 0x00, 0x01, 0x09, 0x00]));
        assert!(!classify_cpong(&[0x41, 0x42, 0x00, 0x01]));
        assert!(!classify_cpong(&[]));
    }

    #[test]
    fn test_ajp_magic_without_cpong() {
        assert!(has_ajp_magic(&[0x12, 0x34, 0x00, 0x00]));
        assert!(has_ajp_magic(b"AB\x00\x02"));
        assert!(!has_ajp_magic(b"HT"));
        assert!(!has_ajp_magic(&[0x41]));
    }

    #[tokio::test]
    async fn test_probe_cping_cpong() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, CPING);
            sock.write_all(&CPONG).await.unwrap();
        });

        let check = AjpCheck;
        let timeouts = Timeouts {
            connect: Duration::from_secs(1),
            io: Duration::from_secs(1),
        };
        let result = check.probe("127.0.0.1", port, &timeouts).await;

        assert!(result.reachable);
        assert!(result.detected);
        assert_eq!(result.fields["cpong_received"], true);
        assert_eq!(result.fields["raw_response_hex"], "4142000109");
    }

    #[tokio::test]
    async fn test_probe_non_ajp_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            let _ = sock.read_exact(&mut buf).await;
            let _ = sock.write_all(b"HTTP/1.1 400 Bad Request\r\n").await;
        });

        let check = AjpCheck;
        let timeouts = Timeouts {
            connect: Duration::from_secs(1),
            io: Duration::from_secs(1),
        };
        let result = check.probe("127.0.0.1", port, &timeouts).await;

        assert!(result.reachable);
        assert!(!result.detected);
        assert_eq!(result.fields["cpong_received"], false);
    }
}
