//! Typed chunk entities.
//!
//! A [`Chunk`] is the wire record plus what the client derives from its text.
//! The derived half lives in [`ChunkData`], a closed union with one variant per
//! [`ChunkKind`].

use indexmap::IndexMap;
use leisure_types::{ChunkId, ChunkKind, Links, Serial, WireChunk};
use serde_json::Value;

/// A byte range inside a chunk's text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The covered substring. Out-of-range spans yield `""`.
    pub fn slice<'t>(&self, text: &'t str) -> &'t str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

impl From<regex::Match<'_>> for Span {
    fn from(m: regex::Match<'_>) -> Self {
        Span::new(m.start(), m.end())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Headline {
    pub level: usize,
    pub stars: Span,
    pub gap: Span,
    pub title: Span,
    /// Anything after the headline line (normally just the newline).
    pub rest: Span,
    pub title_str: String,
    /// Display class bucket: `leisure-hl-1` … `leisure-hl-4`, then `leisure-hl-deep`.
    pub hl_class: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Text {
    pub body: Span,
}

/// A `#+begin_X` / `#+end_X` block.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Lowercased `X` of `#+begin_X`.
    pub block_type: String,
    /// The begin line without its newline.
    pub label: Span,
    pub content: Span,
    pub end_marker: Span,
    pub trailer: Span,
    pub content_str: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub name: Option<String>,
    /// Span of the name value inside `#+name:`, when present.
    pub name_span: Option<Span>,
    /// Start of the `#+begin_src` line.
    pub src_start: usize,
    pub language: String,
    pub options: Vec<String>,
    /// The begin line without its newline.
    pub label: Span,
    pub content: Span,
    pub end_marker: Span,
    pub results: Option<Span>,
    pub content_str: String,
    pub value: Option<Value>,
    pub tags: Vec<String>,
    pub executor: Option<String>,
}

impl Block {
    pub fn label_end(&self) -> usize {
        self.label.end
    }
}

impl Source {
    /// Start of the `#+name:` value; zero when unnamed.
    pub fn name_start(&self) -> usize {
        self.name_span.map_or(0, |s| s.start)
    }

    pub fn name_end(&self) -> usize {
        self.name_span.map_or(0, |s| s.end)
    }

    pub fn label_end(&self) -> usize {
        self.label.end
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Drawer {
    pub name: String,
    pub label: Span,
    pub content: Span,
    pub end_marker: Span,
    /// Populated only for the properties drawer; keys are lowercased.
    pub properties: IndexMap<String, String>,
}

impl Drawer {
    pub fn is_properties(&self) -> bool {
        self.name.eq_ignore_ascii_case("properties")
    }

    /// Whether the reserved `hidden` property hides the owning headline.
    pub fn hides_parent(&self) -> bool {
        self.is_properties()
            && self.properties.get("hidden").is_some_and(|v| {
                !matches!(v.to_ascii_lowercase().as_str(), "" | "nil" | "false" | "no" | "0")
            })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    /// Lowercased keyword name, e.g. `title`.
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub name: Option<String>,
    /// Offsets of the preceding `#+name:` value; zero when there is no name.
    pub name_start: usize,
    pub name_end: usize,
    pub tbl_start: usize,
    pub tbl_end: usize,
    pub cells: Vec<Vec<String>>,
    pub values: Vec<Vec<Value>>,
}

/// Fields derived from a chunk's text, one variant per kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ChunkData {
    Headline(Headline),
    Text(Text),
    Block(Block),
    Source(Source),
    Drawer(Drawer),
    Keyword(Keyword),
    Table(Table),
}

impl ChunkData {
    pub fn kind(&self) -> ChunkKind {
        match self {
            ChunkData::Headline(_) => ChunkKind::Headline,
            ChunkData::Text(_) => ChunkKind::Text,
            ChunkData::Block(_) => ChunkKind::Block,
            ChunkData::Source(_) => ChunkKind::Source,
            ChunkData::Drawer(_) => ChunkKind::Drawer,
            ChunkData::Keyword(_) => ChunkKind::Keyword,
            ChunkData::Table(_) => ChunkKind::Table,
        }
    }

    /// The named sub-spans of the text.
    pub fn raw(&self) -> Vec<(&'static str, Span)> {
        match self {
            ChunkData::Headline(h) => vec![
                ("stars", h.stars),
                ("gap", h.gap),
                ("title", h.title),
                ("rest", h.rest),
            ],
            ChunkData::Text(t) => vec![("body", t.body)],
            ChunkData::Block(b) => vec![
                ("label", b.label),
                ("content", b.content),
                ("end", b.end_marker),
                ("trailer", b.trailer),
            ],
            ChunkData::Source(s) => {
                let mut raw = Vec::with_capacity(5);
                if let Some(name) = s.name_span {
                    raw.push(("name", name));
                }
                raw.push(("label", s.label));
                raw.push(("content", s.content));
                raw.push(("end", s.end_marker));
                if let Some(results) = s.results {
                    raw.push(("results", results));
                }
                raw
            }
            ChunkData::Drawer(d) => vec![
                ("label", d.label),
                ("content", d.content),
                ("end", d.end_marker),
            ],
            ChunkData::Keyword(_) => Vec::new(),
            ChunkData::Table(t) => {
                let mut raw = Vec::with_capacity(2);
                if t.name_end > t.name_start {
                    raw.push(("name", Span::new(t.name_start, t.name_end)));
                }
                raw.push(("table", Span::new(t.tbl_start, t.tbl_end)));
                raw
            }
        }
    }
}

/// The index-relevant facts of a chunk: what the reference and tag indices
/// must hold for it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexFacets {
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub executor: Option<String>,
}

/// A chunk in the model.
///
/// `id` and `kind` never change for an entity; a kind change produces a new
/// entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    record: WireChunk,
    serial: Serial,
    data: Option<ChunkData>,
}

impl Chunk {
    pub(crate) fn from_record(record: WireChunk) -> Self {
        Self {
            record,
            serial: Serial::ZERO,
            data: None,
        }
    }

    pub fn id(&self) -> &ChunkId {
        &self.record.id
    }

    pub fn kind(&self) -> ChunkKind {
        self.record.kind
    }

    pub fn text(&self) -> &str {
        &self.record.text
    }

    pub fn links(&self) -> &Links {
        &self.record.links
    }

    pub fn record(&self) -> &WireChunk {
        &self.record
    }

    /// Generation in which the derived fields were last computed.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Derived fields; `None` until the chunk has been populated once.
    pub fn data(&self) -> Option<&ChunkData> {
        self.data.as_ref()
    }

    pub fn headline(&self) -> Option<&Headline> {
        match &self.data {
            Some(ChunkData::Headline(h)) => Some(h),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<&Source> {
        match &self.data {
            Some(ChunkData::Source(s)) => Some(s),
            _ => None,
        }
    }

    pub fn drawer(&self) -> Option<&Drawer> {
        match &self.data {
            Some(ChunkData::Drawer(d)) => Some(d),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match &self.data {
            Some(ChunkData::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn keyword(&self) -> Option<&Keyword> {
        match &self.data {
            Some(ChunkData::Keyword(k)) => Some(k),
            _ => None,
        }
    }

    /// Data-cell name of a named source chunk.
    pub fn name(&self) -> Option<&str> {
        self.source().and_then(|s| s.name.as_deref())
    }

    /// Stored value of a named source chunk.
    pub fn value(&self) -> Option<&Value> {
        self.source().and_then(|s| s.value.as_ref())
    }

    pub fn facets(&self) -> IndexFacets {
        match &self.data {
            Some(ChunkData::Source(s)) => IndexFacets {
                name: s.name.clone(),
                tags: s.tags.clone(),
                executor: s.executor.clone(),
            },
            _ => IndexFacets::default(),
        }
    }

    pub(crate) fn record_mut(&mut self) -> &mut WireChunk {
        &mut self.record
    }

    pub(crate) fn set_serial(&mut self, serial: Serial) {
        self.serial = serial;
    }

    /// Drop derived fields so the next derive recomputes them. The serial is
    /// kept; it only ever moves forward.
    pub(crate) fn invalidate(&mut self) {
        self.data = None;
    }

    pub(crate) fn set_data(&mut self, data: ChunkData, serial: Serial) {
        self.data = Some(data);
        self.serial = serial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_requires_a_truthy_value() {
        let mut drawer = Drawer {
            name: "PROPERTIES".into(),
            label: Span::default(),
            content: Span::default(),
            end_marker: Span::default(),
            properties: IndexMap::new(),
        };
        assert!(!drawer.hides_parent());
        drawer.properties.insert("hidden".into(), "nil".into());
        assert!(!drawer.hides_parent());
        drawer.properties.insert("hidden".into(), "t".into());
        assert!(drawer.hides_parent());
        drawer.name = "LOGBOOK".into();
        assert!(!drawer.hides_parent());
    }

    #[test]
    fn span_slice_is_forgiving() {
        let span = Span::new(2, 5);
        assert_eq!(span.slice("abcdef"), "cde");
        assert_eq!(span.slice("ab"), "");
        assert_eq!(span.len(), 3);
    }
}
