//! Client error types.
//!
//! Every failure of a network exchange carries what the client was doing,
//! so messages read "error while checking for updates: ...".

use leisure_chunks::{BindingError, ChunkError};
use leisure_types::ChunkId;
use thiserror::Error;

/// Network-level failure below the session protocol.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// No scripted or reachable endpoint answered.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    /// The payload carried an `error` field.
    #[error("error while {doing}: {message}")]
    Protocol { doing: String, message: String },

    #[error("error while {doing}: {source}")]
    Transport {
        doing: String,
        #[source]
        source: TransportError,
    },

    #[error("error while {doing}: unexpected response: {source}")]
    Decode {
        doing: String,
        #[source]
        source: serde_json::Error,
    },

    /// A drive loop failed earlier; the session takes no more requests.
    #[error("session is dead")]
    Dead,

    #[error("drive loop already running")]
    AlreadyDriving,

    #[error("not connected")]
    NotConnected,

    /// The caller's handler rejected an update.
    #[error("error while applying update: {0}")]
    Apply(String),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    /// A byte range that does not fall on character boundaries of the chunk.
    #[error("span {start}..{end} is not within chunk {id}")]
    InvalidSpan { id: ChunkId, start: usize, end: usize },
}

impl ClientError {
    /// Whether the remote explicitly rejected the request.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ClientError::Protocol { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
