//! Daemon socket transport
//!
//! Newline-delimited JSON over the daemon's Unix socket. The client writes
//! one request frame per connection; the daemon answers with any number of
//! `progress` frames followed by exactly one `response` or `error` frame,
//! all carrying the request's correlation id.

use crate::dispatch::{Channel, CorrelationId, Dispatcher, Method, ProgressEvent, ProgressFn, Request};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strongbox_core::{Config, Paths};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// A request as written to the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: CorrelationId,
    pub channel: Channel,
    pub method: Method,
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl RequestFrame {
    fn new(request: Request) -> Self {
        Self {
            id: request.correlation_id.unwrap_or_default(),
            channel: request.channel,
            method: request.method,
            path: request.path,
            query: request.query,
            body: request.body,
        }
    }
}

/// A line read back from the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyFrame {
    Progress { id: CorrelationId, message: String },
    Response {
        id: CorrelationId,
        #[serde(default)]
        body: Option<Value>,
    },
    Error { id: CorrelationId, message: String },
}

impl ReplyFrame {
    pub fn id(&self) -> &CorrelationId {
        match self {
            ReplyFrame::Progress { id, .. }
            | ReplyFrame::Response { id, .. }
            | ReplyFrame::Error { id, .. } => id,
        }
    }
}

/// Dispatcher that talks to the local daemon socket
#[derive(Debug, Clone)]
pub struct SocketDispatcher {
    socket: PathBuf,
    timeout: Duration,
}

impl SocketDispatcher {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config, paths: &Paths) -> Self {
        Self::new(
            config.socket_path(paths),
            Duration::from_secs(config.daemon.timeout_secs),
        )
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    async fn exchange(&self, request: Request, progress: Option<&ProgressFn>) -> Result<Option<Value>> {
        let frame = RequestFrame::new(request);
        let id = frame.id.clone();
        debug!(
            id = %id,
            method = %frame.method,
            path = %frame.path,
            channel = ?frame.channel,
            "Dispatching request"
        );

        match tokio::time::timeout(self.timeout, self.round_trip(frame, progress)).await {
            Ok(result) => result,
            Err(_) => Err(Error::transport(format!(
                "request {} timed out after {}s",
                id,
                self.timeout.as_secs()
            ))),
        }
    }

    async fn round_trip(&self, frame: RequestFrame, progress: Option<&ProgressFn>) -> Result<Option<Value>> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
            Error::transport(format!(
                "failed to connect to daemon at {}: {}",
                self.socket.display(),
                e
            ))
        })?;
        let (read, mut write) = stream.into_split();

        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        write.write_all(line.as_bytes()).await?;
        write.flush().await?;

        let mut reader = BufReader::new(read);
        let mut buf = String::new();
        loop {
            buf.clear();
            let bytes_read = reader.read_line(&mut buf).await?;
            if bytes_read == 0 {
                return Err(Error::transport(format!(
                    "daemon closed the connection before answering {}",
                    frame.id
                )));
            }

            let text = buf.trim();
            if text.is_empty() {
                continue;
            }

            let reply: ReplyFrame = serde_json::from_str(text)
                .map_err(|e| Error::transport(format!("malformed daemon reply: {}", e)))?;
            if reply.id() != &frame.id {
                warn!(expected = %frame.id, got = %reply.id(), "Ignoring reply for another request");
                continue;
            }

            match reply {
                ReplyFrame::Progress { id, message } => {
                    debug!(id = %id, "Progress: {}", message);
                    if let Some(callback) = progress {
                        callback(&ProgressEvent { id, message });
                    }
                }
                ReplyFrame::Response { body, .. } => return Ok(body),
                ReplyFrame::Error { message, .. } => return Err(Error::transport(message)),
            }
        }
    }
}

#[async_trait]
impl Dispatcher for SocketDispatcher {
    async fn call(&self, request: Request) -> Result<Option<Value>> {
        self.exchange(request, None).await
    }

    async fn call_with_progress(&self, request: Request, progress: &ProgressFn) -> Result<Option<Value>> {
        self.exchange(request, Some(progress)).await
    }
}
