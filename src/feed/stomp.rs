//! Minimal STOMP 1.2 subscriber.
//!
//! Covers what a read-only topic subscription needs: CONNECT with
//! credentials, a single auto-acknowledged SUBSCRIBE, heart-beating and
//! MESSAGE delivery. Transactions, receipts and client acks are not used.

use crate::feed::{FeedError, FeedSource};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const SUBSCRIPTION_ID: &str = "1";
/// Upper bound on a single header line or frame body.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First occurrence wins when a header is repeated.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> Vec<u8> {
        let escape = escapes_headers(&self.command);
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    fn error_message(&self) -> String {
        self.get_header("message")
            .map(str::to_string)
            .unwrap_or_else(|| String::from_utf8_lossy(&self.body).trim().to_string())
    }
}

// CONNECT and CONNECTED frames carry raw header values.
fn escapes_headers(command: &str) -> bool {
    !matches!(command, "CONNECT" | "CONNECTED")
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FeedError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(FeedError::Protocol(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, FeedError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| FeedError::Protocol(format!("{what} is not valid UTF-8")))
}

/// `read_until` that refuses to buffer more than [`MAX_FRAME_BYTES`].
async fn read_until_bounded<R>(
    reader: &mut R,
    delimiter: u8,
    buf: &mut Vec<u8>,
    what: &str,
) -> Result<usize, FeedError>
where
    R: AsyncBufRead + Unpin,
{
    let read = (&mut *reader)
        .take(MAX_FRAME_BYTES as u64 + 1)
        .read_until(delimiter, buf)
        .await?;
    if buf.len() > MAX_FRAME_BYTES {
        return Err(FeedError::Protocol(format!(
            "{what} exceeds {MAX_FRAME_BYTES} bytes"
        )));
    }
    Ok(read)
}

/// Read one frame, skipping heart-beat EOLs. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FeedError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let command = loop {
        line.clear();
        if read_until_bounded(reader, b'\n', &mut line, "command line").await? == 0 {
            return Ok(None);
        }
        let text = trim_eol(&line);
        if !text.is_empty() {
            break utf8(text, "command")?;
        }
    };

    let escaped = escapes_headers(&command);
    let mut headers = Vec::new();
    loop {
        line.clear();
        if read_until_bounded(reader, b'\n', &mut line, "header line").await? == 0 {
            return Err(FeedError::Protocol("stream ended inside headers".to_string()));
        }
        let text = utf8(trim_eol(&line), "header")?;
        if text.is_empty() {
            break;
        }
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| FeedError::Protocol(format!("malformed header: {text}")))?;
        if escaped {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut frame = Frame {
        command,
        headers,
        body: Vec::new(),
    };

    match frame.get_header("content-length") {
        Some(length) => {
            let length: usize = length
                .trim()
                .parse()
                .map_err(|_| FeedError::Protocol(format!("bad content-length: {length}")))?;
            if length > MAX_FRAME_BYTES {
                return Err(FeedError::Protocol(format!(
                    "content-length {length} exceeds {MAX_FRAME_BYTES} bytes"
                )));
            }
            let mut body = vec![0; length];
            reader.read_exact(&mut body).await?;
            if reader.read_u8().await? != 0 {
                return Err(FeedError::Protocol(
                    "frame body not followed by NUL".to_string(),
                ));
            }
            frame.body = body;
        }
        None => {
            let mut body = Vec::new();
            read_until_bounded(reader, 0, &mut body, "frame body").await?;
            if body.pop() != Some(0) {
                return Err(FeedError::Protocol("stream ended inside body".to_string()));
            }
            frame.body = body;
        }
    }

    Ok(Some(frame))
}

/// How often to send heart-beats given ours and the server's `heart-beat` header.
pub fn negotiate_send_interval(ours: Duration, server_header: Option<&str>) -> Option<Duration> {
    let wanted_ms = server_header
        .and_then(|value| value.split(',').nth(1))
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let ours_ms = ours.as_millis() as u64;
    if ours_ms == 0 || wanted_ms == 0 {
        return None;
    }
    Some(Duration::from_millis(ours_ms.max(wanted_ms)))
}

#[derive(Debug, Clone)]
pub struct StompSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub destination: String,
    pub heartbeat: Duration,
    pub read_timeout: Duration,
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    heartbeat: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

pub struct StompFeed {
    settings: StompSettings,
    connection: Option<Connection>,
}

impl std::fmt::Debug for StompFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompFeed")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("destination", &self.settings.destination)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl StompFeed {
    pub fn new(settings: StompSettings) -> Self {
        Self {
            settings,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn open(&self) -> Result<Connection, FeedError> {
        let settings = &self.settings;
        let stream = timeout(
            settings.read_timeout,
            TcpStream::connect((settings.host.as_str(), settings.port)),
        )
        .await
        .map_err(|_| FeedError::Timeout)??;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let heartbeat_ms = settings.heartbeat.as_millis();
        let connect = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", settings.host.as_str())
            .header("login", settings.username.as_str())
            .header("passcode", settings.password.as_str())
            .header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"));
        write_half.write_all(&connect.encode()).await?;

        let reply = timeout(settings.read_timeout, read_frame(&mut reader))
            .await
            .map_err(|_| FeedError::Timeout)??
            .ok_or_else(|| FeedError::Protocol("connection closed before CONNECTED".to_string()))?;
        match reply.command.as_str() {
            "CONNECTED" => {}
            "ERROR" => return Err(FeedError::Rejected(reply.error_message())),
            other => {
                return Err(FeedError::Protocol(format!(
                    "expected CONNECTED, got {other}"
                )));
            }
        }

        let subscribe = Frame::new("SUBSCRIBE")
            .header("destination", settings.destination.as_str())
            .header("id", SUBSCRIPTION_ID)
            .header("ack", "auto");
        write_half.write_all(&subscribe.encode()).await?;

        let send_every = negotiate_send_interval(settings.heartbeat, reply.get_header("heart-beat"));
        info!(
            host = %settings.host,
            destination = %settings.destination,
            server = reply.get_header("server").unwrap_or("unknown"),
            heartbeat_ms = send_every.map(|d| d.as_millis() as u64),
            "Subscribed to feed"
        );

        Ok(Connection {
            reader,
            heartbeat: tokio::spawn(send_heartbeats(write_half, send_every)),
        })
    }
}

/// Owns the write half for the life of the connection; dropping it would half-close the socket.
async fn send_heartbeats(mut writer: OwnedWriteHalf, every: Option<Duration>) {
    let Some(every) = every else {
        std::future::pending::<()>().await;
        return;
    };
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(err) = writer.write_all(b"\n").await {
            warn!(error = %err, "Failed to send feed heart-beat");
            return;
        }
    }
}

impl FeedSource for StompFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        self.connection = None;
        self.connection = Some(self.open().await?);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<String>, FeedError> {
        let read_timeout = self.settings.read_timeout;
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return Err(FeedError::NotConnected);
            };
            let read = timeout(read_timeout, read_frame(&mut connection.reader)).await;
            let frame = match read {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => {
                    self.connection = None;
                    return Ok(None);
                }
                Ok(Err(err)) => {
                    self.connection = None;
                    return Err(err);
                }
                Err(_) => {
                    self.connection = None;
                    return Err(FeedError::Timeout);
                }
            };

            match frame.command.as_str() {
                "MESSAGE" => match String::from_utf8(frame.body) {
                    Ok(body) => return Ok(Some(body)),
                    Err(_) => warn!("Dropping feed message with non UTF-8 body"),
                },
                "ERROR" => {
                    self.connection = None;
                    return Err(FeedError::Broker(frame.error_message()));
                }
                other => debug!(command = other, "Ignoring feed frame"),
            }
        }
    }
}
