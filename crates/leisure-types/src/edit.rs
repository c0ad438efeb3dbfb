//! Edit batches submitted to the authority.

use serde::{Deserialize, Serialize};

use crate::ids::ChunkId;

/// Replace `length` bytes at `offset` with `text`.
///
/// An offset of `-1` addresses the whole document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextReplacement {
    pub offset: i64,
    pub length: i64,
    #[serde(default)]
    pub text: String,
}

/// Replace the entire text of one chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReplacement {
    pub block: ChunkId,
    pub text: String,
}

/// One element of an edit batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Replacement {
    Block(BlockReplacement),
    Text(TextReplacement),
}

impl Replacement {
    pub fn splice(offset: i64, length: i64, text: impl Into<String>) -> Self {
        Replacement::Text(TextReplacement {
            offset,
            length,
            text: text.into(),
        })
    }

    pub fn chunk(block: impl Into<ChunkId>, text: impl Into<String>) -> Self {
        Replacement::Block(BlockReplacement {
            block: block.into(),
            text: text.into(),
        })
    }
}

/// A selection plus the replacements to apply.
///
/// The drive loop submits batches with no replacements just to learn the
/// pending diff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub selection_offset: i64,
    pub selection_length: i64,
    #[serde(default)]
    pub replacements: Vec<Replacement>,
}

impl Edit {
    /// A batch with no replacements and an empty selection at the start.
    pub fn empty() -> Self {
        Self {
            selection_offset: 0,
            selection_length: 0,
            replacements: Vec::new(),
        }
    }

    /// A batch that carries no selection at all.
    pub fn unselected(replacements: Vec<Replacement>) -> Self {
        Self {
            selection_offset: -1,
            selection_length: -1,
            replacements,
        }
    }
}

impl Default for Edit {
    fn default() -> Self {
        Self::empty()
    }
}
