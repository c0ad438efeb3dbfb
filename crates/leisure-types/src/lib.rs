//! Wire-format types for Leisure document sessions.
//!
//! This crate is the leaf of the workspace: identifiers, chunk records, diffs,
//! and edit batches exactly as they travel between a client and the remote
//! authority. It has **no internal leisure dependencies**.
//!
//! # Key Types
//!
//! |-------------------|------------------------------------------------|
//! | Type              | Purpose                                        |
//! |-------------------|------------------------------------------------|
//! | [`ChunkId`]       | Opaque, authority-assigned chunk identifier    |
//! | [`ChunkKind`]     | Closed set of chunk types                      |
//! | [`WireChunk`]     | One chunk record as sent by the authority      |
//! | [`ChunkDiff`]     | added / changed / removed / linked / order     |
//! | [`Edit`]          | Selection plus a batch of [`Replacement`]s     |
//! | [`Snapshot`]      | Connect payload (structured or plain text)     |
//! | [`Serial`]        | Reconciliation generation counter              |
//! |-------------------|------------------------------------------------|

pub mod chunk;
pub mod diff;
pub mod edit;
pub mod ids;
pub mod response;

pub use chunk::{ChunkKind, Links, WireChunk};
pub use diff::{ChunkDiff, LinkPatch};
pub use edit::{BlockReplacement, Edit, Replacement, TextReplacement};
pub use ids::{ChunkId, Serial};
pub use response::{Snapshot, WireError, check_error};
