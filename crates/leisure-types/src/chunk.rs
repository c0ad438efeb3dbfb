//! Chunk records as the authority sends them.
//!
//! A chunk owns an exact substring of the document. Only `type`, `text`, and the
//! link fields are authoritative; everything a renderer needs beyond that is
//! derived client-side from `text`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{EnumCount, EnumIter, EnumString};

use crate::ids::ChunkId;

/// The closed set of chunk types.
///
/// A record may arrive under an existing id with a different kind; the client
/// then replaces the entity and retypes its render node in place.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, EnumCount, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum ChunkKind {
    /// `* Heading` lines; the only kind that contains other chunks.
    Headline,
    /// Plain paragraph text.
    Text,
    /// `#+begin_X ... #+end_X` blocks other than source.
    Block,
    /// `#+begin_src LANG ... #+end_src`, optionally named.
    Source,
    /// `:NAME: ... :END:` drawers, including the properties drawer.
    Drawer,
    /// `#+KEY: value` lines.
    Keyword,
    /// `| a | b |` tables.
    Table,
}

impl ChunkKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Headline => "headline",
            ChunkKind::Text => "text",
            ChunkKind::Block => "block",
            ChunkKind::Source => "source",
            ChunkKind::Drawer => "drawer",
            ChunkKind::Keyword => "keyword",
            ChunkKind::Table => "table",
        }
    }

    /// Dense index for per-kind lookup tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether chunks of this kind hold nested chunks in a content region.
    pub fn is_container(&self) -> bool {
        matches!(self, ChunkKind::Headline)
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sibling and nesting links of a chunk.
///
/// `prev` and `parent` are authoritative. A first child has `prev == parent`.
/// `next` and `children` are carried when the authority sends them but are
/// never relied on for placement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<ChunkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<ChunkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ChunkId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChunkId>,
}

impl Links {
    /// True when this chunk is the first child of its parent.
    pub fn is_first_child(&self) -> bool {
        self.parent.is_some() && self.prev == self.parent
    }
}

/// One chunk record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireChunk {
    pub id: ChunkId,
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub links: Links,
    /// Structured payload of a named source chunk, when the authority has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Any other fields; kept so `linked` patches can target them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WireChunk {
    pub fn new(id: impl Into<ChunkId>, kind: ChunkKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            links: Links::default(),
            value: None,
            extra: Map::new(),
        }
    }

    pub fn with_prev(mut self, prev: impl Into<ChunkId>) -> Self {
        self.links.prev = Some(prev.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<ChunkId>) -> Self {
        self.links.parent = Some(parent.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Overwrite one field from a `linked` diff entry. `None` removes it.
    ///
    /// Link fields are typed; a value of the wrong shape is rejected and the
    /// field left untouched. Unknown fields land in `extra`.
    pub fn patch_field(&mut self, field: &str, value: Option<&Value>) -> Result<(), serde_json::Error> {
        match field {
            "prev" => self.links.prev = decode_opt(value)?,
            "next" => self.links.next = decode_opt(value)?,
            "parent" => self.links.parent = decode_opt(value)?,
            "children" => self.links.children = decode_opt(value)?.unwrap_or_default(),
            "value" => self.value = value.cloned(),
            // id, type, and text are never patched through links
            "id" | "type" | "text" => {}
            other => match value {
                Some(v) => {
                    self.extra.insert(other.to_string(), v.clone());
                }
                None => {
                    self.extra.remove(other);
                }
            },
        }
        Ok(())
    }
}

fn decode_opt<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Result<Option<T>, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone()).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn kind_roundtrips_through_names() {
        for kind in ChunkKind::iter() {
            assert_eq!(ChunkKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ChunkKind::from_str("HEADLINE"), Some(ChunkKind::Headline));
        assert_eq!(ChunkKind::from_str("paragraph"), None);
    }

    #[test]
    fn wire_chunk_decodes_links_and_extra() {
        let raw = json!({
            "type": "text",
            "id": "t1",
            "text": "hello\n",
            "prev": "h1",
            "parent": "h1",
            "weird": 3
        });
        let chunk: WireChunk = serde_json::from_value(raw).unwrap();
        assert_eq!(chunk.kind, ChunkKind::Text);
        assert!(chunk.links.is_first_child());
        assert_eq!(chunk.extra.get("weird"), Some(&json!(3)));
        assert!(chunk.value.is_none());
    }

    #[test]
    fn patch_field_removes_on_absence() {
        let mut chunk = WireChunk::new("t1", ChunkKind::Text, "x").with_prev("h1");
        chunk.patch_field("prev", None).unwrap();
        assert_eq!(chunk.links.prev, None);
        chunk.patch_field("parent", Some(&json!("h2"))).unwrap();
        assert_eq!(chunk.links.parent, Some(ChunkId::new("h2")));
        chunk.patch_field("collapsed", Some(&json!(true))).unwrap();
        assert_eq!(chunk.extra.get("collapsed"), Some(&json!(true)));
    }

    #[test]
    fn patch_field_rejects_wrong_shape() {
        let mut chunk = WireChunk::new("t1", ChunkKind::Text, "x").with_prev("h1");
        assert!(chunk.patch_field("prev", Some(&json!(42))).is_err());
        assert_eq!(chunk.links.prev, Some(ChunkId::new("h1")));
    }
}
