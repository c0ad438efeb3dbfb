//! The request/response seam under the session client.
//!
//! [`Transport`] is path-based: callers pass paths relative to the versioned
//! API root (`session/update`, `session/get/counter`). Bodies and responses
//! are JSON values; a response body that is not JSON comes back as a JSON
//! string, which is how the plain-text document arrives.
//!
//! ```text
//!   SessionClient ──► Transport ──► HttpTransport    (reqwest)
//!                                └► MemoryTransport  (scripted, in-process)
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::error::TransportError;

pub type Query<'a> = &'a [(&'a str, String)];

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, query: Query<'_>) -> Result<Value, TransportError>;

    async fn post(&self, path: &str, query: Query<'_>, body: &Value) -> Result<Value, TransportError>;
}

// ============================================================================
// HTTP
// ============================================================================

/// Transport over HTTP with a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpTransport {
    /// `base` is the versioned API root, e.g. `http://localhost:7315/v1/`.
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            base: base.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    async fn read(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        let body = response.text().await?;
        interpret(status, body)
    }
}

/// Turn a status and body into a payload.
///
/// A failure status passes through only when the body is an error envelope
/// (an object with an `error` field), so the session can report the remote
/// message. Anything else on a failure status is a transport error.
fn interpret(status: reqwest::StatusCode, body: String) -> Result<Value, TransportError> {
    let parsed = serde_json::from_str::<Value>(&body);
    if !status.is_success() {
        return match parsed {
            Ok(value) if value.get("error").is_some() => Ok(value),
            _ => Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }),
        };
    }
    Ok(parsed.unwrap_or(Value::String(body)))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: Query<'_>) -> Result<Value, TransportError> {
        let url = self.url(path);
        trace!(%url, "GET");
        let response = self.client.get(&url).query(query).send().await?;
        Self::read(response).await
    }

    async fn post(&self, path: &str, query: Query<'_>, body: &Value) -> Result<Value, TransportError> {
        let url = self.url(path);
        trace!(%url, "POST");
        let response = self.client.post(&url).query(query).json(body).send().await?;
        Self::read(response).await
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request seen by [`MemoryTransport`].
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Clone, Debug)]
enum Reply {
    Json(Value),
    Fail(String),
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    standing: HashMap<String, Reply>,
    log: Vec<Request>,
}

/// Scripted in-process transport.
///
/// Replies are looked up by exact path: queued replies first, in order, then
/// the standing reply for that path. Tracks how many requests overlap so
/// callers can check their concurrency discipline.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for `path`.
    pub fn push(&self, path: &str, reply: Value) -> &Self {
        self.queue(path, Reply::Json(reply))
    }

    /// Queue a one-shot transport failure for `path`.
    pub fn push_failure(&self, path: &str, message: &str) -> &Self {
        self.queue(path, Reply::Fail(message.to_string()))
    }

    /// Reply to `path` with `reply` whenever nothing is queued.
    pub fn always(&self, path: &str, reply: Value) -> &Self {
        self.script
            .lock()
            .standing
            .insert(path.to_string(), Reply::Json(reply));
        self
    }

    fn queue(&self, path: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.script.lock().log.clone()
    }

    /// Requests made to `path`.
    pub fn count(&self, path: &str) -> usize {
        self.script.lock().log.iter().filter(|r| r.path == path).count()
    }

    /// The most requests ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn exchange(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Give any concurrent caller a chance to overlap with us.
        tokio::task::yield_now().await;

        let reply = {
            let mut script = self.script.lock();
            script.log.push(Request {
                method,
                path: path.to_string(),
                query: query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                body: body.cloned(),
            });
            script
                .queued
                .get_mut(path)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.standing.get(path).cloned())
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Fail(message)) => Err(TransportError::Unavailable(message)),
            None => Err(TransportError::Unavailable(format!("no reply scripted for {path}"))),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, path: &str, query: Query<'_>) -> Result<Value, TransportError> {
        self.exchange(Method::Get, path, query, None).await
    }

    async fn post(&self, path: &str, query: Query<'_>, body: &Value) -> Result<Value, TransportError> {
        self.exchange(Method::Post, path, query, Some(body)).await
    }
}
