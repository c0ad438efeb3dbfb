//! Diffs computed by the authority after an edit.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunk::WireChunk;
use crate::ids::ChunkId;

/// Field updates for one chunk in a `linked` entry.
///
/// A `null` value means "remove this field".
pub type LinkPatch = IndexMap<String, Option<Value>>;

/// How the document changed since the last applied generation.
///
/// Every section is optional on the wire; an all-empty diff is valid and must
/// leave the render tree untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDiff {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<WireChunk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<WireChunk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<ChunkId>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub linked: IndexMap<ChunkId, LinkPatch>,
    /// Advisory re-render sequence; never written into `prev` links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<ChunkId>>,
}

impl ChunkDiff {
    /// A diff that introduces every chunk of a snapshot.
    pub fn from_snapshot(chunks: Vec<WireChunk>) -> Self {
        Self {
            added: chunks,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.linked.is_empty()
            && self.order.as_ref().is_none_or(|o| o.is_empty())
    }

    /// Find a chunk introduced or changed by this diff.
    pub fn chunk(&self, id: &ChunkId) -> Option<&WireChunk> {
        self.added
            .iter()
            .chain(self.changed.iter())
            .find(|c| &c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_sections_decode_as_empty() {
        let diff: ChunkDiff = serde_json::from_value(json!({})).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn linked_null_means_removal() {
        let diff: ChunkDiff = serde_json::from_value(json!({
            "linked": { "t1": { "prev": null, "parent": "h2" } }
        }))
        .unwrap();
        let patch = &diff.linked[&ChunkId::new("t1")];
        assert_eq!(patch["prev"], None);
        assert_eq!(patch["parent"], Some(json!("h2")));
        assert!(!diff.is_empty());
    }
}
