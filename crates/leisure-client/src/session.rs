//! Session client: one connection to a document session.
//!
//! # State Machine
//!
//! ```text
//! +--------------+  connect()   +-------------+
//! | Disconnected | -----------> |  Connected  | ◀─┐ update() / edit()
//! +--------------+              +------+------+ ──┘
//!        ▲        close()              │ drive loop error
//!        └─────────────────────────────┤
//!                                      v
//!                               +-------------+
//!                               |    Dead     |  rejects everything
//!                               +-------------+
//! ```
//!
//! Every payload is checked for an `error` field before it is decoded; an
//! error field fails the call no matter what the HTTP status said.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use leisure_types::{ChunkDiff, Edit, Snapshot, WireChunk, WireError, check_error};
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::constants::{
    SESSION_CLOSE, SESSION_CONNECT, SESSION_CREATE, SESSION_DOCUMENT, SESSION_EDIT, SESSION_GET,
    SESSION_LIST, SESSION_SET, SESSION_TAG, SESSION_UPDATE,
};
use crate::error::{ClientError, ClientResult};
use crate::transport::{HttpTransport, Transport};

/// What the session delivers on connect and after each edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Structured chunks and chunk diffs.
    Org,
    /// A bare document string and text replacements.
    Plain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected(Mode),
    Dead,
}

/// The consequence of an edit, in the session's mode.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    Diff(ChunkDiff),
    Text(Edit),
}

impl Update {
    pub fn is_empty(&self) -> bool {
        match self {
            Update::Diff(diff) => diff.is_empty(),
            Update::Text(edit) => edit.replacements.is_empty(),
        }
    }
}

#[derive(Deserialize)]
struct SetResponse {
    #[serde(default)]
    chunk: Option<WireChunk>,
}

pub struct SessionClient<T = HttpTransport> {
    transport: T,
    config: ClientConfig,
    state: Mutex<SessionState>,
    driving: AtomicBool,
}

impl SessionClient<HttpTransport> {
    /// HTTP client for the server and session named in `config`.
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let transport = HttpTransport::new(config.api_base(), config.request_timeout).map_err(
            |source| ClientError::Transport {
                doing: "creating the HTTP client".into(),
                source,
            },
        )?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(SessionState::Disconnected),
            driving: AtomicBool::new(false),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_dead(&self) -> bool {
        self.state() == SessionState::Dead
    }

    pub fn mode(&self) -> Option<Mode> {
        match self.state() {
            SessionState::Connected(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    /// End the session for good. Later calls fail with [`ClientError::Dead`].
    pub fn mark_dead(&self) {
        *self.state.lock() = SessionState::Dead;
    }

    pub(crate) fn try_begin_drive(&self) -> bool {
        self.driving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_drive(&self) {
        self.driving.store(false, Ordering::Release);
    }

    pub fn is_driving(&self) -> bool {
        self.driving.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> ClientResult<()> {
        if self.is_dead() {
            return Err(ClientError::Dead);
        }
        Ok(())
    }

    fn ensure_connected(&self) -> ClientResult<Mode> {
        match self.state() {
            SessionState::Connected(mode) => Ok(mode),
            SessionState::Dead => Err(ClientError::Dead),
            SessionState::Disconnected => Err(ClientError::NotConnected),
        }
    }

    // ========================================================================
    // Exchanges
    // ========================================================================

    async fn fetch(&self, doing: &str, path: &str, query: &[(&str, String)]) -> ClientResult<Value> {
        self.ensure_alive()?;
        let payload = self
            .transport
            .get(path, query)
            .await
            .map_err(|source| ClientError::Transport {
                doing: doing.to_string(),
                source,
            })?;
        checked(doing, payload)
    }

    async fn send(&self, doing: &str, path: &str, body: &Value) -> ClientResult<Value> {
        self.ensure_alive()?;
        let payload = self
            .transport
            .post(path, &[], body)
            .await
            .map_err(|source| ClientError::Transport {
                doing: doing.to_string(),
                source,
            })?;
        checked(doing, payload)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Open the session and fetch the full current document.
    ///
    /// On failure the client stays disconnected.
    pub async fn connect(&self) -> ClientResult<Snapshot> {
        let mut query = Vec::new();
        if let Some(doc) = &self.config.document {
            query.push(("doc", doc.clone()));
        }
        if self.config.org {
            query.push(("org", "true".to_string()));
        }
        if self.config.force {
            query.push(("force", "true".to_string()));
        }
        let path = format!("{SESSION_CONNECT}/{}", self.config.session);
        let payload = self.fetch("connecting", &path, &query).await?;
        let snapshot = Snapshot::from_payload(payload).map_err(|e| wire_error("connecting", e))?;
        let mode = match &snapshot {
            Snapshot::Chunks(chunks) => {
                info!(session = %self.config.session, chunks = chunks.len(), "connected");
                Mode::Org
            }
            Snapshot::Plain(text) => {
                info!(session = %self.config.session, bytes = text.len(), "connected (plain)");
                Mode::Plain
            }
        };
        *self.state.lock() = SessionState::Connected(mode);
        Ok(snapshot)
    }

    /// Create the session on `document` without connecting to it.
    pub async fn create(&self, document: &str) -> ClientResult<Value> {
        let path = format!("{SESSION_CREATE}/{}/{document}", self.config.session);
        let query: Vec<(&str, String)> = if self.config.org {
            vec![("org", "true".to_string())]
        } else {
            Vec::new()
        };
        self.fetch("creating session", &path, &query).await
    }

    /// Sessions known to the server.
    pub async fn list(&self) -> ClientResult<Value> {
        self.fetch("listing sessions", SESSION_LIST, &[]).await
    }

    /// Ask whether a diff is pending. Long-polls up to the configured timeout.
    pub async fn update(&self) -> ClientResult<bool> {
        self.ensure_connected()?;
        let timeout = self.config.update_timeout.as_millis().to_string();
        let payload = self
            .fetch("checking for updates", SESSION_UPDATE, &[("timeout", timeout)])
            .await?;
        decode("checking for updates", payload)
    }

    /// Submit a batch and return what the server computed from it. The
    /// server has applied the batch once this returns.
    pub async fn edit(&self, edit: &Edit) -> ClientResult<Update> {
        let mode = self.ensure_connected()?;
        let body = serde_json::to_value(edit).map_err(|source| ClientError::Decode {
            doing: "requesting edit".into(),
            source,
        })?;
        let payload = self.send("requesting edit", SESSION_EDIT, &body).await?;
        let update = match mode {
            Mode::Org => Update::Diff(decode("reading edit response", payload)?),
            Mode::Plain => Update::Text(decode("reading edit response", payload)?),
        };
        debug!(empty = update.is_empty(), "edit acknowledged");
        Ok(update)
    }

    /// Current value of the named data cell.
    pub async fn get(&self, name: &str) -> ClientResult<Value> {
        self.ensure_connected()?;
        let path = format!("{SESSION_GET}/{name}");
        self.fetch(&format!("getting {name}"), &path, &[]).await
    }

    /// Replace the whole value of the named data cell. Returns the updated
    /// chunk when the server sends it back.
    pub async fn set(&self, name: &str, value: &Value) -> ClientResult<Option<WireChunk>> {
        self.ensure_connected()?;
        let doing = format!("setting {name}");
        let path = format!("{SESSION_SET}/{name}");
        let payload = self.send(&doing, &path, value).await?;
        let response: SetResponse = decode(&doing, payload)?;
        Ok(response.chunk)
    }

    /// Chunks carrying `tag`, as the server reports them.
    pub async fn tag(&self, tag: &str) -> ClientResult<Value> {
        self.ensure_connected()?;
        let path = format!("{SESSION_TAG}/{tag}");
        self.fetch(&format!("getting tag {tag}"), &path, &[]).await
    }

    /// The full document text.
    pub async fn document(&self) -> ClientResult<String> {
        self.ensure_connected()?;
        let payload = self.fetch("getting document", SESSION_DOCUMENT, &[]).await?;
        match payload {
            Value::String(text) => Ok(text),
            other => match Snapshot::from_payload(other) {
                Ok(Snapshot::Plain(text)) => Ok(text),
                Ok(Snapshot::Chunks(chunks)) => Ok(chunks.into_iter().map(|c| c.text).collect()),
                Err(e) => Err(wire_error("getting document", e)),
            },
        }
    }

    /// Close the session on the server.
    pub async fn close(&self) -> ClientResult<()> {
        let result = self.fetch("closing session", SESSION_CLOSE, &[]).await;
        let mut state = self.state.lock();
        if *state != SessionState::Dead {
            *state = SessionState::Disconnected;
        }
        drop(state);
        if let Err(err) = &result {
            warn!(%err, "close failed");
        }
        result.map(|_| ())
    }
}

fn checked(doing: &str, payload: Value) -> ClientResult<Value> {
    check_error(payload).map_err(|e| wire_error(doing, e))
}

fn wire_error(doing: &str, err: WireError) -> ClientError {
    match err {
        WireError::Remote(message) => ClientError::Protocol {
            doing: doing.to_string(),
            message,
        },
        WireError::Malformed(source) => ClientError::Decode {
            doing: doing.to_string(),
            source,
        },
    }
}

fn decode<D: DeserializeOwned>(doing: &str, payload: Value) -> ClientResult<D> {
    serde_json::from_value(payload).map_err(|source| ClientError::Decode {
        doing: doing.to_string(),
        source,
    })
}
