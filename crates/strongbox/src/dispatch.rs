//! Request dispatch
//!
//! Every registry operation goes through a [`Dispatcher`]. A request either
//! goes straight to the registry or is proxied by the local daemon, which
//! does extra local work and streams progress keyed by a correlation id.
//! Callers only see this contract, never the transport underneath.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// HTTP-style method of a registry call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
        };
        f.write_str(name)
    }
}

/// Which side handles a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Forwarded to the registry as is
    #[default]
    Registry,
    /// Handled by the daemon before forwarding, with progress
    Daemon,
}

/// Ties progress events to the request that caused them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A progress message streamed by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: CorrelationId,
    pub message: String,
}

/// Progress callback; may fire zero or more times before the result
pub type ProgressFn = dyn Fn(&ProgressEvent) + Send + Sync;

/// Progress callback that drops every event
pub fn ignore_progress(_: &ProgressEvent) {}

/// One logical registry call
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub correlation_id: Option<CorrelationId>,
    pub channel: Channel,
}

impl Request {
    /// A direct registry call
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            correlation_id: None,
            channel: Channel::Registry,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    /// A daemon-proxied call and the correlation id its progress will carry
    pub fn daemon(
        method: Method,
        path: impl Into<String>,
        body: Option<Value>,
    ) -> (Self, CorrelationId) {
        let id = CorrelationId::new();
        let request = Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
            correlation_id: Some(id.clone()),
            channel: Channel::Daemon,
        };
        (request, id)
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// All values of a query parameter, in order
    pub fn query_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value of a query parameter
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Carries requests to the registry, directly or through the daemon
///
/// A `None` response means the endpoint returned no content. Any failure on
/// the far side, including cancellation and timeouts, is a transport error.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Fire a request and wait for its response
    async fn call(&self, request: Request) -> Result<Option<Value>>;

    /// Fire a request, reporting progress events as they arrive
    async fn call_with_progress(
        &self,
        request: Request,
        progress: &ProgressFn,
    ) -> Result<Option<Value>>;
}
