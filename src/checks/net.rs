//! Shared time-bounded socket steps used by the TCP-based checks.

use crate::report::FailureKind;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Failure of one read/write step after the connection was established.
#[derive(Debug)]
pub enum StepError {
    Timeout,
    Io(String),
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Timeout => FailureKind::ProtocolTimeout,
            StepError::Io(_) => FailureKind::ProtocolError,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Timeout => write!(f, "operation timed out"),
            StepError::Io(e) => write!(f, "{}", e),
        }
    }
}

pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream, String> {
    let addr = format!("{}:{}", host, port);
    match timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("connect timed out after {}ms", connect_timeout.as_millis())),
    }
}

/// Connect-and-close reachability test. The stream drops on return, which
/// closes the socket.
pub async fn tcp_reachable(host: &str, port: u16, connect_timeout: Duration) -> Result<(), String> {
    connect(host, port, connect_timeout).await.map(|_| ())
}

pub async fn send(
    stream: &mut (impl AsyncWrite + Unpin),
    data: &[u8],
    io_timeout: Duration,
) -> Result<(), StepError> {
    match timeout(io_timeout, stream.write_all(data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(StepError::Io(e.to_string())),
        Err(_) => Err(StepError::Timeout),
    }
}

/// Single bounded read of up to `max` bytes. Returns an empty buffer on a
/// clean peer close.
pub async fn recv(
    stream: &mut (impl AsyncRead + Unpin),
    max: usize,
    io_timeout: Duration,
) -> Result<Vec<u8>, StepError> {
    let mut buf = vec![0u8; max];
    match timeout(io_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) => {
            buf.truncate(n);
            Ok(buf)
        }
        Ok(Err(e)) => Err(StepError::Io(e.to_string())),
        Err(_) => Err(StepError::Timeout),
    }
}

pub async fn recv_exact(
    stream: &mut (impl AsyncRead + Unpin),
    n: usize,
    io_timeout: Duration,
) -> Result<Vec<u8>, StepError> {
    let mut buf = vec![0u8; n];
    match timeout(io_timeout, stream.read_exact(&mut buf)).await {
        Ok(Ok(_)) => Ok(buf),
        Ok(Err(e)) => Err(StepError::Io(e.to_string())),
        Err(_) => Err(StepError::Timeout),
    }
}

/// Read until the peer closes or `limit` bytes have arrived. Each
/// individual read is bounded by `io_timeout`.
pub async fn recv_until_close(
    stream: &mut (impl AsyncRead + Unpin),
    limit: usize,
    io_timeout: Duration,
) -> Result<Vec<u8>, StepError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while out.len() < limit {
        match timeout(io_timeout, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => return Err(StepError::Io(e.to_string())),
            Err(_) => return Err(StepError::Timeout),
        }
    }
    out.truncate(limit);
    Ok(out)
}

/// Read one `\n`-terminated line, trimmed of the trailing CRLF. An empty
/// string means the peer closed without sending a line.
pub async fn read_line(
    reader: &mut (impl AsyncBufRead + Unpin),
    io_timeout: Duration,
) -> Result<String, StepError> {
    let mut line = String::new();
    match timeout(io_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(_)) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
        Ok(Err(e)) => Err(StepError::Io(e.to_string())),
        Err(_) => Err(StepError::Timeout),
    }
}

pub fn hex_string(data: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
