//! Error types for the chunk model, derivation, and bindings.

use leisure_types::{ChunkId, ChunkKind};
use thiserror::Error;

/// Errors from the chunk model and reconciliation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkError {
    /// A chunk's text does not have the shape its declared type requires.
    ///
    /// The authority is trusted, so this is a defect, not a recoverable case.
    #[error("chunk {id} does not parse as {kind}")]
    Corrupt { id: ChunkId, kind: ChunkKind },

    /// The chunk is not in the model.
    #[error("chunk not found: {0}")]
    UnknownChunk(ChunkId),
}

/// Errors from declarative bindings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    /// The path expression does not follow the binding grammar.
    #[error("malformed binding path {expr:?}: {reason}")]
    Malformed { expr: String, reason: String },

    /// The path names a chunk or global that does not exist.
    #[error("binding target not found: {0}")]
    MissingTarget(String),

    /// A field or index accessor was applied to a scalar.
    #[error("cannot apply {step} to a non-container value in {expr:?}")]
    NotAContainer { expr: String, step: String },

    /// An index accessor is past the end of an array.
    #[error("index {index} out of range (len {len}) in {expr:?}")]
    IndexOutOfRange { expr: String, index: usize, len: usize },

    /// Display bindings cannot be written.
    #[error("binding {0:?} is read-only")]
    ReadOnly(String),

    /// The node or binding slot does not exist.
    #[error("no binding {index} on node {node}")]
    NoSuchBinding { node: usize, index: usize },
}

pub type ChunkResult<T> = Result<T, ChunkError>;
pub type BindingResult<T> = Result<T, BindingError>;
