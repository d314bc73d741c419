use super::ProtocolCheck;
use super::net::{self, StepError};
use crate::config::{Credential, Timeouts};
use crate::report::{CheckResult, FailureKind};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};

const SAMPLE_KEY_LIMIT: usize = 10;

/// Authenticated-session check: try unauthenticated access first, then a
/// short fixed list of default passwords, and on success run a few
/// read-only introspection commands.
pub struct RedisCheck {
    credentials: Vec<Credential>,
}

impl RedisCheck {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    /// Distinct non-empty passwords; redis AUTH takes no username.
    fn passwords(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for cred in &self.credentials {
            let pass = cred.password.as_str();
            if !pass.is_empty() && !seen.contains(&pass) {
                seen.push(pass);
            }
        }
        seen
    }
}

#[async_trait]
impl ProtocolCheck for RedisCheck {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn default_ports(&self) -> &'static [u16] {
        &[6379]
    }

    async fn probe(&self, target: &str, port: u16, timeouts: &Timeouts) -> CheckResult {
        let mut result = CheckResult::new(target, port, self.name());

        let stream = match net::connect(target, port, timeouts.connect).await {
            Ok(stream) => stream,
            Err(e) => {
                result.record_failure(FailureKind::TcpUnreachable, &e);
                return result;
            }
        };
        result.reachable = true;

        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let reply = match command(&mut reader, &mut writer, "PING", timeouts).await {
            Ok(reply) => reply,
            Err(e) => {
                result.record_failure(e.kind(), &e.to_string());
                return result;
            }
        };

        match reply {
            Reply::Simple(s) if s == "PONG" => {
                result.detected = true;
                result.set("unauthenticated_access", true);
                result.set("default_credentials_worked", Value::Array(Vec::new()));
                introspect(&mut reader, &mut writer, timeouts, &mut result).await;
            }
            Reply::Error(msg) if is_auth_rejection(&msg) => {
                result.detected = true;
                result.set("unauthenticated_access", false);
                let mut worked = Vec::new();
                for pass in self.passwords() {
                    match command(&mut reader, &mut writer, &format!("AUTH {}", pass), timeouts).await {
                        Ok(Reply::Simple(ok)) if ok == "OK" => {
                            worked.push(Value::from(pass));
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            log::debug!(
                                "[checks::redis] auth_step_failed: target={} port={} error={}",
                                target,
                                port,
                                e
                            );
                            break;
                        }
                    }
                }
                let authenticated = !worked.is_empty();
                result.set("default_credentials_worked", Value::Array(worked));
                if authenticated {
                    introspect(&mut reader, &mut writer, timeouts, &mut result).await;
                } else {
                    result.record_failure(FailureKind::AuthFailed, "all default credentials rejected");
                }
            }
            other => {
                result.record_failure(
                    FailureKind::ProtocolError,
                    &format!("unexpected PING reply: {}", other.describe()),
                );
            }
        }

        result
    }
}

fn is_auth_rejection(msg: &str) -> bool {
    let low = msg.to_lowercase();
    low.starts_with("noauth") || low.contains("authentication required")
}

/// Read-only introspection once a session is established. Each command is
/// independent: a failure skips its field and moves on.
async fn introspect(
    reader: &mut (impl AsyncBufRead + Unpin + Send),
    writer: &mut (impl AsyncWrite + Unpin + Send),
    timeouts: &Timeouts,
    result: &mut CheckResult,
) {
    if let Ok(Reply::Bulk(Some(info))) = command(reader, writer, "INFO", timeouts).await {
        for line in info.lines() {
            if let Some(version) = line.strip_prefix("redis_version:") {
                result.set("version", version.trim());
            } else if let Some(role) = line.strip_prefix("role:") {
                result.set("role", role.trim());
            }
        }
    }

    if let Ok(reply) = command(reader, writer, "CONFIG GET dir", timeouts).await {
        if let Some(dir) = config_value(&reply) {
            result.set("config_dir", dir);
        }
    }
    if let Ok(reply) = command(reader, writer, "CONFIG GET requirepass", timeouts).await {
        if let Some(pass) = config_value(&reply) {
            result.set("requirepass_set", !pass.is_empty());
        }
    }

    if let Ok(Reply::Integer(n)) = command(reader, writer, "DBSIZE", timeouts).await {
        result.set("dbsize", n);
    }

    if let Ok(Reply::Array(Some(keys))) = command(reader, writer, "KEYS *", timeouts).await {
        let sample: Vec<Value> = keys
            .iter()
            .filter_map(|k| match k {
                Reply::Bulk(Some(key)) => Some(Value::from(key.clone())),
                _ => None,
            })
            .take(SAMPLE_KEY_LIMIT)
            .collect();
        result.set("sample_keys", Value::Array(sample));
    }
}

/// Second element of a `CONFIG GET <key>` reply pair.
fn config_value(reply: &Reply) -> Option<String> {
    match reply {
        Reply::Array(Some(items)) if items.len() >= 2 => match &items[1] {
            Reply::Bulk(Some(value)) => Some(value.clone()),
            Reply::Bulk(None) => Some(String::new()),
            _ => None,
        },
        _ => None,
    }
}

/// One RESP reply. Only the flat shapes our read-only commands produce.
#[derive(Debug, PartialEq)]
enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    fn describe(&self) -> String {
        match self {
            Reply::Simple(s) => format!("+{}", s),
            Reply::Error(e) => format!("-{}", e),
            Reply::Integer(n) => format!(":{}", n),
            Reply::Bulk(Some(_)) => "bulk".to_string(),
            Reply::Bulk(None) => "nil".to_string(),
            Reply::Array(_) => "array".to_string(),
        }
    }
}

async fn command(
    reader: &mut (impl AsyncBufRead + Unpin + Send),
    writer: &mut (impl AsyncWrite + Unpin + Send),
    cmd: &str,
    timeouts: &Timeouts,
) -> Result<Reply, StepError> {
    net::send(writer, format!("{}\r\n", cmd).as_bytes(), timeouts.io).await?;
    read_reply(reader, timeouts).await
}

async fn read_reply(
    reader: &mut (impl AsyncBufRead + Unpin + Send),
    timeouts: &Timeouts,
) -> Result<Reply, StepError> {
    let line = net::read_line(reader, timeouts.io).await?;
    if line.is_empty() {
        return Err(StepError::Io("connection closed".to_string()));
    }
    if let Some(rest) = line.strip_prefix('*') {
        let count: i64 = rest
            .parse()
            .map_err(|_| StepError::Io(format!("bad array header: {}", line)))?;
        if count < 0 {
            return Ok(Reply::Array(None));
        }
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(read_scalar(reader, timeouts).await?);
        }
        return Ok(Reply::Array(Some(items)));
    }
    read_scalar_line(reader, line, timeouts).await
}

/// Array elements from our commands are always scalars.
async fn read_scalar(
    reader: &mut (impl AsyncBufRead + Unpin + Send),
    timeouts: &Timeouts,
) -> Result<Reply, StepError> {
    let line = net::read_line(reader, timeouts.io).await?;
    if line.is_empty() {
        return Err(StepError::Io("connection closed".to_string()));
    }
    read_scalar_line(reader, line, timeouts).await
}

async fn read_scalar_line(
    reader: &mut (impl AsyncBufRead + Unpin + Send),
    line: String,
    timeouts: &Timeouts,
) -> Result<Reply, StepError> {
    if let Some(rest) = line.strip_prefix('+') {
        return Ok(Reply::Simple(rest.to_string()));
    }
    if let Some(rest) = line.strip_prefix('-') {
        return Ok(Reply::Error(rest.to_string()));
    }
    if let Some(rest) = line.strip_prefix(':') {
        return rest
            .parse()
            .map(Reply::Integer)
            .map_err(|_| StepError::Io(format!("bad integer reply: {}", line)));
    }
    if let Some(rest) = line.strip_prefix('$') {
        let len: i64 = rest
            .parse()
            .map_err(|_| StepError::Io(format!("bad bulk header: {}", line)))?;
        if len < 0 {
            return Ok(Reply::Bulk(None));
        }
        let raw = net::recv_exact(reader, len as usize + 2, timeouts.io).await?;
        let payload = String::from_utf8_lossy(&raw[..len as usize]).into_owned();
        return Ok(Reply::Bulk(Some(payload)));
    }
    Err(StepError::Io(format!("unparseable reply: {}", line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader};
    use tokio::net::TcpListener;

    fn timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(1),
            io: Duration::from_secs(1),
        }
    }

    async fn parse(raw: &[u8]) -> Result<Reply, StepError> {
        let mut reader = BufReader::new(raw);
        read_reply(&mut reader, &timeouts()).await
    }

    #[tokio::test]
    async fn test_read_reply_scalars() {
        assert_eq!(parse(b"+PONG\r\n").await.unwrap(), Reply::Simple("PONG".to_string()));
        assert_eq!(
            parse(b"-NOAUTH Authentication required.\r\n").await.unwrap(),
            Reply::Error("NOAUTH Authentication required.".to_string())
        );
        assert_eq!(parse(b":42\r\n").await.unwrap(), Reply::Integer(42));
        assert_eq!(
            parse(b"$6\r\nfoobar\r\n").await.unwrap(),
            Reply::Bulk(Some("foobar".to_string()))
        );
        assert_eq!(parse(b"$-1\r\n").await.unwrap(), Reply::Bulk(None));
    }

    #[tokio::test]
    async fn test_read_reply_array() {
        let reply = parse(b"*2\r\n$3\r\ndir\r\n$14\r\n/var/lib/redis\r\n").await.unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some("dir".to_string())),
                Reply::Bulk(Some("/var/lib/redis".to_string())),
            ]))
        );
        assert_eq!(config_value(&reply).as_deref(), Some("/var/lib/redis"));
    }

    #[tokio::test]
    async fn test_read_reply_garbage() {
        assert!(parse(b"HTTP/1.1 400 Bad Request\r\n").await.is_err());
    }

    #[test]
    fn test_is_auth_rejection() {
        assert!(is_auth_rejection("NOAUTH Authentication required."));
        assert!(is_auth_rejection("ERR Client sent AUTH, but authentication required"));
        assert!(!is_auth_rejection("ERR unknown command"));
    }

    #[test]
    fn test_passwords_deduped_and_nonempty() {
        let check = RedisCheck::new(vec![
            Credential::new("root", ""),
            Credential::new("root", "root"),
            Credential::new("admin", "root"),
            Credential::new("admin", "admin"),
        ]);
        assert_eq!(check.passwords(), vec!["root", "admin"]);
    }

    /// Scripted server: NOAUTH on PING, accepts the second password, then
    /// answers the introspection commands.
    async fn scripted_server(listener: TcpListener) {
        let (sock, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = sock.into_split();
        let mut reader = TokioBufReader::new(read_half);
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let reply: String = match line.trim() {
                "PING" => "-NOAUTH Authentication required.\r\n".to_string(),
                "AUTH root" => "-ERR invalid password\r\n".to_string(),
                "AUTH password" => "+OK\r\n".to_string(),
                "INFO" => {
                    let payload = "# Server\r\nredis_version:7.2.4\r\nrole:master\r\n";
                    format!("${}\r\n{}\r\n", payload.len(), payload)
                }
                "CONFIG GET dir" => "*2\r\n$3\r\ndir\r\n$14\r\n/var/lib/redis\r\n".to_string(),
                "CONFIG GET requirepass" => "*2\r\n$11\r\nrequirepass\r\n$6\r\nsecret\r\n".to_string(),
                "DBSIZE" => ":7\r\n".to_string(),
                "KEYS *" => "*2\r\n$4\r\nkey1\r\n$4\r\nkey2\r\n".to_string(),
                _ => "-ERR unknown command\r\n".to_string(),
            };
            if write_half.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_probe_default_credential_flow() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(scripted_server(listener));

        let check = RedisCheck::new(vec![
            Credential::new("root", "root"),
            Credential::new("root", "password"),
        ]);
        let result = check.probe("127.0.0.1", port, &timeouts()).await;

        assert!(result.reachable);
        assert!(result.detected);
        assert_eq!(result.fields["unauthenticated_access"], false);
        assert_eq!(result.fields["default_credentials_worked"][0], "password");
        assert_eq!(result.fields["version"], "7.2.4");
        assert_eq!(result.fields["role"], "master");
        assert_eq!(result.fields["config_dir"], "/var/lib/redis");
        assert_eq!(result.fields["requirepass_set"], true);
        assert_eq!(result.fields["dbsize"], 7);
        assert_eq!(result.fields["sample_keys"][1], "key2");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_probe_auth_exhausted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = sock.into_split();
            let mut reader = TokioBufReader::new(read_half);
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let reply = if line.trim() == "PING" {
                    "-NOAUTH Authentication required.\r\n"
                } else {
                    "-ERR invalid password\r\n"
                };
                if write_half.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let check = RedisCheck::new(vec![Credential::new("root", "root")]);
        let result = check.probe("127.0.0.1", port, &timeouts()).await;

        assert!(result.reachable);
        assert!(result.detected);
        assert_eq!(result.fields["unauthenticated_access"], false);
        assert_eq!(result.error.as_deref(), Some("auth_failed: all default credentials rejected"));
    }
}
